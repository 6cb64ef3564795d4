//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router.
///
/// Credentials travel as the final path segment. Every route is GET-only;
/// other methods get 405 from axum.
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/signup", get(handlers::signup))
        .route("/signup/", get(handlers::signup))
        .route("/login/:token", get(handlers::login))
        .route("/info/:token", get(handlers::info))
        .route("/cancel/:token", get(handlers::cancel))
        .route("/submit/:token", get(handlers::submit))
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
