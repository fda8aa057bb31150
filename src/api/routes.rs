use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Recommendations
        .route("/recommendations", get(handlers::get_recommendations))
        .route(
            "/recommendations/explain",
            get(handlers::explain_recommendation),
        )
        // Interaction feed
        .route("/interactions", post(handlers::create_interaction))
        // Feedback tracking
        .route("/analytics/track/click", post(handlers::track_click))
        .route("/analytics/track/rating", post(handlers::track_rating))
        .route("/analytics/track/thumbs-up", post(handlers::track_thumbs_up))
        .route(
            "/analytics/track/thumbs-down",
            post(handlers::track_thumbs_down),
        )
        // Strategy comparison & model management
        .route("/analytics/performance", get(handlers::get_performance))
        .route(
            "/analytics/recommendations/stats",
            get(handlers::get_recommendation_stats),
        )
        .route(
            "/analytics/model/force-update",
            post(handlers::force_model_update),
        )
        .route("/analytics/model/updates", get(handlers::get_model_updates))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
