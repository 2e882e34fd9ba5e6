//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{routing::get, Router};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::store::Store;

pub use routes::{create_router, AppState};

/// Build the application router
///
/// Layer order, outermost first: timeout -> trace -> logging -> (auth) -> handler
pub fn build_router<S: Store>(state: AppState<S>, request_timeout: Duration) -> Router {
    Router::new()
        // Health check (no auth)
        .route("/health", get(routes::health_check::<S>))
        .nest("/api/user", create_router(state.clone()))
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
