//! API layer -- axum routes, handlers, and middleware.

mod dashboard;
pub mod error;
mod routes;
pub mod state;
pub mod watchdog;

pub use self::error::ApiError;
pub use self::state::{AppState, ClientTracker};

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(dashboard::dashboard_routes())
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
