use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{Explanation, RecommendOptions};
use crate::error::{AppError, AppResult};
use crate::middleware::request_id::RequestId;
use crate::models::{
    Interaction, ItemId, ModelUpdateLog, OutcomeType, ScoredItem, SignalType, StrategyTag, UserId,
};

use super::AppState;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    pub user_id: UserId,
    pub limit: Option<usize>,
    pub use_context: Option<bool>,
    pub use_embeddings: Option<bool>,
    pub use_graph: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainParams {
    pub user_id: UserId,
    pub item_id: ItemId,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub signal: SignalType,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TrackOutcomeRequest {
    pub user_id: UserId,
    pub item_id: ItemId,
}

#[derive(Debug, Deserialize)]
pub struct TrackRatingRequest {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: f64,
}

#[derive(Debug, Deserialize)]
pub struct PerformanceParams {
    pub strategy: Option<StrategyTag>,
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatesParams {
    pub limit: Option<usize>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Personalized recommendations for a user
///
/// Always answers with a list — the engine degrades through its fallback
/// chain internally. Each returned item is logged as an exposure in the
/// background.
pub async fn get_recommendations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<RecommendationParams>,
) -> Json<Vec<ScoredItem>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let options = RecommendOptions {
        use_context: params.use_context.unwrap_or(true),
        use_embeddings: params.use_embeddings.unwrap_or(false),
        use_graph: params.use_graph.unwrap_or(false),
    };

    let items = state
        .recommender
        .recommend(params.user_id, limit, options, Utc::now())
        .await;

    tracing::info!(
        request_id = %request_id,
        user_id = params.user_id,
        returned = items.len(),
        limit,
        "Recommendations served"
    );

    state.tracker.record_list(params.user_id, &items);

    Json(items)
}

/// Why a particular item scores the way it does for a user
pub async fn explain_recommendation(
    State(state): State<AppState>,
    Query(params): Query<ExplainParams>,
) -> AppResult<Json<Explanation>> {
    let explanation = state
        .recommender
        .explain(params.user_id, params.item_id)
        .await?;
    Ok(Json(explanation))
}

/// Records a new interaction and feeds the model-refresh counter
pub async fn create_interaction(
    State(state): State<AppState>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let value = match request.signal {
        SignalType::Rating => {
            let value = request.value.ok_or_else(|| {
                AppError::InvalidInput("Rating interactions require a value".to_string())
            })?;
            if !(0.5..=5.0).contains(&value) {
                return Err(AppError::InvalidInput(format!(
                    "Rating {} outside 0.5-5.0",
                    value
                )));
            }
            value
        }
        _ => 0.0,
    };

    let interaction = Interaction {
        user_id: request.user_id,
        item_id: request.item_id,
        signal: request.signal,
        value,
        timestamp: Utc::now(),
    };

    state.store.record_interaction(interaction).await?;
    state.trigger.notify_interaction();

    Ok((StatusCode::CREATED, Json(json!({ "status": "recorded" }))))
}

/// Tracks a click on a recommended item
pub async fn track_click(
    State(state): State<AppState>,
    Json(request): Json<TrackOutcomeRequest>,
) -> Json<Value> {
    state
        .tracker
        .record_outcome(request.user_id, request.item_id, OutcomeType::Click, None);
    Json(json!({ "status": "tracked", "action": "click" }))
}

/// Tracks a rating given to a recommended item
pub async fn track_rating(
    State(state): State<AppState>,
    Json(request): Json<TrackRatingRequest>,
) -> AppResult<Json<Value>> {
    if !(0.5..=5.0).contains(&request.rating) {
        return Err(AppError::InvalidInput(format!(
            "Rating {} outside 0.5-5.0",
            request.rating
        )));
    }
    state.tracker.record_outcome(
        request.user_id,
        request.item_id,
        OutcomeType::Rating,
        Some(request.rating),
    );
    Ok(Json(json!({ "status": "tracked", "action": "rating" })))
}

/// Toggles thumbs-up on the most recent exposure of the pair
pub async fn track_thumbs_up(
    State(state): State<AppState>,
    Json(request): Json<TrackOutcomeRequest>,
) -> Json<Value> {
    state.tracker.record_outcome(
        request.user_id,
        request.item_id,
        OutcomeType::ThumbsUp,
        None,
    );
    Json(json!({ "status": "tracked", "action": "thumbs_up" }))
}

/// Toggles thumbs-down on the most recent exposure of the pair
pub async fn track_thumbs_down(
    State(state): State<AppState>,
    Json(request): Json<TrackOutcomeRequest>,
) -> Json<Value> {
    state.tracker.record_outcome(
        request.user_id,
        request.item_id,
        OutcomeType::ThumbsDown,
        None,
    );
    Json(json!({ "status": "tracked", "action": "thumbs_down" }))
}

/// Per-strategy performance metrics for algorithm comparison
pub async fn get_performance(
    State(state): State<AppState>,
    Query(params): Query<PerformanceParams>,
) -> Json<Value> {
    let days = params.days.unwrap_or(30).clamp(1, 365);
    let strategies = state.tracker.performance(params.strategy, days).await;

    Json(json!({
        "period_days": days,
        "strategies": strategies,
    }))
}

/// Overall recommendation statistics
pub async fn get_recommendation_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Json<Value> {
    let days = params.days.unwrap_or(7).clamp(1, 90);
    let stats = state.tracker.stats(days).await;
    Json(json!(stats))
}

/// Forces a model rebuild regardless of the interaction counter
pub async fn force_model_update(State(state): State<AppState>) -> Json<ModelUpdateLog> {
    let entry = state.trigger.force_rebuild().await;
    Json(entry)
}

/// Recent model update history, newest first
pub async fn get_model_updates(
    State(state): State<AppState>,
    Query(params): Query<UpdatesParams>,
) -> Json<Vec<ModelUpdateLog>> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    Json(state.trigger.update_history(limit).await)
}
