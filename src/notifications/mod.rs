use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod repo;
pub mod templates;
pub mod worker;

pub fn router() -> Router<AppState> {
    handlers::notification_routes()
}
