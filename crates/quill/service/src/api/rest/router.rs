//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Poems
        .route("/poems", post(handlers::create_poem))
        .route("/poems/explore", get(handlers::explore_poems))
        .route("/poems/user/:user_id", get(handlers::list_user_poems))
        .route(
            "/poems/:id",
            get(handlers::get_poem)
                .put(handlers::update_poem)
                .delete(handlers::delete_poem),
        )
        // Pull requests
        .route(
            "/pull-requests",
            get(handlers::list_pull_requests).post(handlers::create_pull_request),
        )
        .route(
            "/pull-requests/poem/:poem_id",
            get(handlers::list_poem_pull_requests),
        )
        .route("/pull-requests/:id", get(handlers::get_pull_request))
        .route(
            "/pull-requests/:id/approve",
            post(handlers::approve_pull_request),
        )
        .route(
            "/pull-requests/:id/reject",
            post(handlers::reject_pull_request),
        )
        // Statistics
        .route("/stats/poems/:user_id", get(handlers::get_user_poem_stats));

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/generate-image", post(handlers::generate_image))
        .nest("/api", api_routes)
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
