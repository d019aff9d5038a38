use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::DeviceSession;

use super::authenticate;
use super::validate::IdentityPayload;

/// Metadata about the session blocking a start, surfaced so the caller
/// can offer the user a takeover ("another device is using this license").
#[derive(Debug, Serialize)]
pub struct ConflictInfo {
    pub device_fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub last_heartbeat_at: i64,
    pub started_at: i64,
}

impl ConflictInfo {
    pub(crate) fn from_session(session: &DeviceSession) -> Self {
        ConflictInfo {
            device_fingerprint: session.device_fingerprint.clone(),
            device_name: session.device_name.clone(),
            last_heartbeat_at: session.last_heartbeat_at,
            started_at: session.started_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionBlock {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictInfo>,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub identity: IdentityPayload,
    #[serde(default)]
    pub device_name: Option<String>,
}

/// Start a session for a device. A conflict is a 200 response with
/// `allowed: false` — it is a user decision point, not a failure.
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<SessionBlock>> {
    let mut conn = state.db.get()?;
    let subscription = authenticate(&conn, &req.identity)?;

    let subscription = queries::apply_time_transitions(&conn, &subscription, queries::now())?;
    if !subscription.status.is_entitled() {
        return Err(AppError::Subscription(format!(
            "Subscription is {}",
            subscription.status
        )));
    }

    let outcome = queries::start_session(
        &mut conn,
        &subscription.id,
        &req.identity.device_fingerprint,
        req.device_name.as_deref(),
        state.liveness_window_secs(),
    )?;

    Ok(Json(SessionBlock::from_outcome(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Heartbeat for a live session. `ok: false, reason: "expired"` means the
/// session was superseded, ended, or missed too many heartbeats; the
/// device must re-validate and start a new session.
pub async fn heartbeat_session(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>> {
    let conn = state.db.get()?;

    match queries::heartbeat_session(&conn, &req.session_id, state.liveness_window_secs())? {
        queries::HeartbeatOutcome::Alive(session) => Ok(Json(HeartbeatResponse {
            ok: true,
            last_heartbeat_at: Some(session.last_heartbeat_at),
            reason: None,
        })),
        queries::HeartbeatOutcome::Expired => Ok(Json(HeartbeatResponse {
            ok: false,
            last_heartbeat_at: None,
            reason: Some("expired"),
        })),
    }
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub ended: bool,
}

pub async fn end_session(
    State(state): State<AppState>,
    Json(req): Json<EndSessionRequest>,
) -> Result<Json<EndSessionResponse>> {
    let conn = state.db.get()?;
    let ended = queries::end_session(&conn, &req.session_id)?;
    Ok(Json(EndSessionResponse { ended }))
}

#[derive(Debug, Deserialize)]
pub struct TakeoverRequest {
    pub identity: IdentityPayload,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TakeoverResponse {
    pub session_id: String,
    pub started_at: i64,
}

/// User-confirmed takeover: supersedes whatever session is live and
/// hands the license to the requesting device.
pub async fn takeover_session(
    State(state): State<AppState>,
    Json(req): Json<TakeoverRequest>,
) -> Result<Json<TakeoverResponse>> {
    let mut conn = state.db.get()?;
    let subscription = authenticate(&conn, &req.identity)?;

    let subscription = queries::apply_time_transitions(&conn, &subscription, queries::now())?;
    if !subscription.status.is_entitled() {
        return Err(AppError::Subscription(format!(
            "Subscription is {}",
            subscription.status
        )));
    }

    let session = queries::takeover_session(
        &mut conn,
        &subscription.id,
        &req.identity.device_fingerprint,
        req.device_name.as_deref(),
    )?;

    tracing::info!(
        subscription_id = %subscription.id,
        "Session takeover by device {}",
        session.device_fingerprint
    );

    Ok(Json(TakeoverResponse {
        session_id: session.id,
        started_at: session.started_at,
    }))
}
