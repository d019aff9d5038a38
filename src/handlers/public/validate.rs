use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::caching::{self, CacheStrategy};
use crate::crypto;
use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::SubscriptionStatus;
use crate::rate_limit;
use crate::util::redact_email;

use super::session::{ConflictInfo, SessionBlock};
use super::authenticate;

/// One installation attempting validation. Immutable per request.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityPayload {
    pub email: String,
    pub installation_token: String,
    pub device_fingerprint: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateOptions {
    /// Client-side hint; the server does not serve cached answers, but the
    /// flag is accepted so the request shape matches the SDK's.
    #[serde(default)]
    pub allow_cache: bool,
    /// Skip session coordination and answer entitlement only
    #[serde(default)]
    pub performance_mode: bool,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub identity: IdentityPayload,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub options: Option<ValidateOptions>,
}

#[derive(Debug, Serialize)]
pub struct ValidationBlock {
    pub valid: bool,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionBlock {
    pub status: SubscriptionStatus,
    pub current_period_end: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_until: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CachingBlock {
    pub strategy: CacheStrategy,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct PerformanceBlock {
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub validation: ValidationBlock,
    pub subscription: SubscriptionBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionBlock>,
    pub caching: CachingBlock,
    pub performance: PerformanceBlock,
}

/// Online validation: authenticates the identity, applies time-based
/// subscription transitions, coordinates the device session, and returns
/// entitlement plus cache advice.
///
/// Denials are 200 responses with `valid: false` — only auth, rate-limit,
/// and malformed-request failures use the error taxonomy.
pub async fn validate_license(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    let started = std::time::Instant::now();
    let mut conn = state.db.get()?;
    let ts = queries::now();

    let identity_hash = crypto::identity_hash(
        &req.identity.email,
        &req.identity.installation_token,
        &req.identity.device_fingerprint,
    );
    rate_limit::check_validation_rate(
        &conn,
        &identity_hash,
        state.validate_rate_limit_per_minute,
        ts,
    )?;

    let subscription = authenticate(&conn, &req.identity)?;
    let subscription = queries::apply_time_transitions(&conn, &subscription, ts)?;

    // Deadlines are folded into status by the transition walk above
    let valid = subscription.status.is_entitled();

    let options = req.options.unwrap_or_default();
    let session = if valid && !options.performance_mode {
        let outcome = queries::start_session(
            &mut conn,
            &subscription.id,
            &req.identity.device_fingerprint,
            req.device_name.as_deref(),
            state.liveness_window_secs(),
        )?;
        Some(SessionBlock::from_outcome(outcome))
    } else {
        None
    };

    // Advice is computed from the pre-increment count so a first-ever
    // validation is advised `immediate` (never served from cache).
    let strategy = caching::advise(&subscription, valid, ts);
    if valid {
        queries::record_validation(&conn, &subscription.id, ts)?;
    } else {
        tracing::info!(
            "Validation denied for {} (status={})",
            redact_email(&req.identity.email),
            subscription.status
        );
    }

    Ok(Json(ValidateResponse {
        success: true,
        validation: ValidationBlock {
            valid,
            status: subscription.status,
        },
        subscription: SubscriptionBlock {
            status: subscription.status,
            current_period_end: subscription.current_period_end,
            grace_period_until: subscription.grace_period_until,
        },
        session,
        caching: CachingBlock {
            strategy,
            ttl_seconds: strategy.ttl_seconds(),
        },
        performance: PerformanceBlock {
            response_time_ms: started.elapsed().as_millis() as u64,
        },
    }))
}

impl SessionBlock {
    pub(crate) fn from_outcome(outcome: queries::SessionStart) -> Self {
        match outcome {
            queries::SessionStart::Started(s) | queries::SessionStart::Resumed(s) => SessionBlock {
                allowed: true,
                session_id: Some(s.id),
                conflict: None,
            },
            queries::SessionStart::Conflict(existing) => SessionBlock {
                allowed: false,
                session_id: None,
                conflict: Some(ConflictInfo::from_session(&existing)),
            },
        }
    }
}
