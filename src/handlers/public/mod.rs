mod session;
mod validate;

pub use session::*;
pub use validate::*;

use axum::{routing::{get, post}, Json, Router};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::models::Subscription;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/validate", post(validate_license))
        .route("/session/start", post(start_session))
        .route("/session/heartbeat", post(heartbeat_session))
        .route("/session/end", post(end_session))
        .route("/session/takeover", post(takeover_session))
}

/// Resolve a validating identity to its subscription or fail with an
/// auth error. The message stays generic to avoid email enumeration.
pub(crate) fn authenticate(
    conn: &Connection,
    identity: &IdentityPayload,
) -> Result<Subscription> {
    crate::db::queries::get_subscription_by_identity(
        conn,
        &identity.email,
        &identity.installation_token,
    )?
    .ok_or_else(|| AppError::Auth("Unknown email or installation token".into()))
}
