use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route(
            "/providers/{provider_id}/availability",
            get(handlers::list_availability),
        )
        .route(
            "/providers/{provider_id}/open-slots",
            get(handlers::get_open_slots),
        );

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route(
            "/providers/{provider_id}/availability",
            put(handlers::replace_availability),
        )
        .route(
            "/appointments",
            get(handlers::search_appointments).post(handlers::create_appointment),
        )
        .route(
            "/appointments/{appointment_id}",
            get(handlers::get_appointment)
                .patch(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route(
            "/appointments/{appointment_id}/status",
            patch(handlers::set_appointment_status),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
