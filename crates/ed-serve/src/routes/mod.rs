pub mod emergencies;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod workers;

use crate::middleware::correlation::correlation_middleware;
use crate::{AppState, openapi};
use axum::Router;
use axum::middleware;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(emergencies::router(state.clone()))
        .merge(workers::router(state.clone()))
        .merge(rate_limit::router(state.clone()))
        .merge(events::router(state))
        .merge(openapi::router())
        .route_layer(middleware::from_fn(correlation_middleware));

    Router::new().nest("/api", api)
}
