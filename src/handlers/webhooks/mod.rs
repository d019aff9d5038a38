mod billing;

pub use billing::*;

use axum::{routing::post, Router};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/billing", post(billing_webhook))
}
