use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Users
        .route("/users", get(handlers::get_users).post(handlers::create_user))
        // Wines
        .route("/wines", get(handlers::get_wines).post(handlers::create_wine))
        .route("/wines/popular", get(handlers::get_popular_wines))
        // Reviews
        .route("/reviews", post(handlers::upsert_review))
        // Recommendations
        .route("/recommendations/:user_id", get(handlers::get_recommendations))
        .route(
            "/recommendations/internal/:internal_id",
            get(handlers::get_recommendations_by_internal_id),
        )
        // Operations
        .route("/admin/matrix", get(handlers::dump_matrix))
        .route("/admin/bootstrap", post(handlers::bootstrap))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
