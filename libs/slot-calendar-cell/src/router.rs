use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::SlotSchedulingService;

pub struct CalendarState {
    pub service: Arc<SlotSchedulingService>,
}

pub fn slot_calendar_routes(config: Arc<AppConfig>) -> Router {
    let service = Arc::new(SlotSchedulingService::new(&config));
    slot_calendar_routes_with_service(config, service)
}

pub fn slot_calendar_routes_with_service(
    config: Arc<AppConfig>,
    service: Arc<SlotSchedulingService>,
) -> Router {
    let state = Arc::new(CalendarState { service });

    Router::new()
        // Weekly pattern editor
        .route("/{facility_id}/slots/conflict-check", post(handlers::check_conflict))
        .route("/{facility_id}/slots", post(handlers::create_slot))
        .route(
            "/{facility_id}/slots/{slot_id}",
            get(handlers::get_slot).put(handlers::replace_slot),
        )
        // Calendar screen
        .route("/{facility_id}/calendar", get(handlers::get_calendar))
        .route("/{facility_id}/calendar/remote", get(handlers::get_remote_calendar))
        .route("/{facility_id}/days/{date}", get(handlers::get_day))
        // Date-scoped overrides
        .route(
            "/{facility_id}/slots/{slot_id}/adjustments/{date}",
            put(handlers::put_adjustment).delete(handlers::delete_adjustment),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
