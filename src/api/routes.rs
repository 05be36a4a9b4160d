//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{detect, health, ready};
use crate::api::middleware::{cors_layer, request_id, request_logging};
use crate::api::state::AppState;
use crate::domain::ports::{Detector, Storage};

/// Create the API router.
pub fn create_router<D, S>(state: AppState<D, S>) -> Router
where
    D: Detector + 'static,
    S: Storage + 'static,
{
    let api_routes = Router::<AppState<D, S>>::new().route("/detect", post(detect::<D, S>));

    let health_routes = Router::<AppState<D, S>>::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<D, S>));

    let max_body_bytes = state.server.max_body_bytes;
    let cors = cors_layer(&state.server.cors_origins);

    Router::new()
        .nest("/api", api_routes)
        .route("/detect", post(detect::<D, S>))
        .merge(health_routes)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}
