use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;
use slot_calendar_cell::router::slot_calendar_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "AptCarePet slot calendar API is running!" }))
        .nest("/facilities", slot_calendar_routes(state))
}
