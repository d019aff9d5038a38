pub mod public;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// Full application router: public validation/session API plus the
/// billing webhook endpoint.
pub fn router() -> Router<AppState> {
    public::router().merge(webhooks::router())
}
