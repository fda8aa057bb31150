use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;

use marquee_api::api::{create_router, AppState};
use marquee_api::engine::{ModelCache, Recommender, UpdateTrigger};
use marquee_api::models::ItemMetadata;
use marquee_api::store::{InteractionStore, MemoryInteractionStore};
use marquee_api::tracker::{EventTracker, EventWriterHandle};

const TEST_REBUILD_THRESHOLD: u64 = 5;
const TEST_CORPUS_MIN: usize = 10;

struct TestContext {
    server: TestServer,
    store: Arc<MemoryInteractionStore>,
    // Keeps the tracker's background writer alive for the test's duration
    _writer: EventWriterHandle,
}

async fn create_test_server() -> TestContext {
    let store = Arc::new(MemoryInteractionStore::new());
    seed_catalog(&store).await;

    let model_cache = Arc::new(ModelCache::new());
    let trigger = UpdateTrigger::new(
        Arc::clone(&store) as Arc<dyn InteractionStore>,
        Arc::clone(&model_cache),
        TEST_REBUILD_THRESHOLD,
        TEST_CORPUS_MIN,
        4,
    );

    let recommender = Arc::new(Recommender::new(
        Arc::clone(&store) as Arc<dyn InteractionStore>,
        model_cache,
        None,
        None,
        Duration::from_millis(100),
        TEST_CORPUS_MIN,
        100,
    ));

    let (tracker, writer) = EventTracker::new();

    let state = AppState {
        store: Arc::clone(&store) as Arc<dyn InteractionStore>,
        recommender,
        trigger,
        tracker,
    };

    TestContext {
        server: TestServer::new(create_router(state)).unwrap(),
        store,
        _writer: writer,
    }
}

async fn seed_catalog(store: &MemoryInteractionStore) {
    let items = [
        (10, vec!["Sci-Fi", "Action"], 500, 8.5),
        (11, vec!["Sci-Fi"], 400, 8.0),
        (12, vec!["Action"], 300, 7.5),
        (13, vec!["Sci-Fi", "Action"], 600, 7.8),
        (20, vec!["Romance"], 450, 7.2),
        (21, vec!["Romance", "Drama"], 350, 6.9),
        (30, vec!["Horror"], 800, 6.5),
        (40, vec!["Drama"], 900, 8.2),
        (41, vec!["Drama"], 700, 7.9),
        (42, vec!["Comedy"], 650, 7.4),
    ];
    for (item_id, genres, vote_count, vote_average) in items {
        store
            .add_item(ItemMetadata {
                item_id,
                title: format!("Movie {}", item_id),
                genres: genres.into_iter().map(String::from).collect(),
                vote_count,
                vote_average,
                popularity: 1.0,
            })
            .await;
    }
}

#[tokio::test]
async fn test_health_check() {
    let ctx = create_test_server().await;
    let response = ctx.server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_recommendations_for_new_user_are_popularity() {
    let ctx = create_test_server().await;

    let response = ctx
        .server
        .get("/recommendations")
        .add_query_param("user_id", 99)
        .add_query_param("limit", 5)
        .add_query_param("use_context", false)
        .await;
    response.assert_status_ok();

    let items: Vec<serde_json::Value> = response.json();
    assert_eq!(items.len(), 5);
    for item in &items {
        assert_eq!(item["strategy"], "popularity");
        assert!(item["item_id"].is_i64());
        assert!(item["score"].is_f64() || item["score"].is_i64());
    }
    // Popularity fallback is sorted by rating descending
    assert_eq!(items[0]["item_id"], 10);
    assert_eq!(items[1]["item_id"], 40);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let ctx = create_test_server().await;
    let response = ctx.server.get("/health").await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_record_interaction_validation() {
    let ctx = create_test_server().await;

    // Out-of-range rating
    let response = ctx
        .server
        .post("/interactions")
        .json(&json!({
            "user_id": 1,
            "item_id": 10,
            "signal": "rating",
            "value": 6.0
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    // Rating without a value
    let response = ctx
        .server
        .post("/interactions")
        .json(&json!({
            "user_id": 1,
            "item_id": 10,
            "signal": "rating"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    // Implicit signals carry no value
    let response = ctx
        .server
        .post("/interactions")
        .json(&json!({
            "user_id": 1,
            "item_id": 10,
            "signal": "favorite"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
}

#[tokio::test]
async fn test_interactions_shape_recommendations() {
    let ctx = create_test_server().await;

    // Two strong Sci-Fi ratings put the user in the cold-start content path
    for item_id in [10, 11] {
        let response = ctx
            .server
            .post("/interactions")
            .json(&json!({
                "user_id": 1,
                "item_id": item_id,
                "signal": "rating",
                "value": 5.0
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
    }

    let response = ctx
        .server
        .get("/recommendations")
        .add_query_param("user_id", 1)
        .add_query_param("limit", 4)
        .add_query_param("use_context", false)
        .await;
    response.assert_status_ok();

    let items: Vec<serde_json::Value> = response.json();
    assert_eq!(items.len(), 4);
    // Rated items never come back
    for item in &items {
        let id = item["item_id"].as_i64().unwrap();
        assert!(id != 10 && id != 11);
    }
    // The taste profile drives the head of the list to Sci-Fi/Action titles
    assert_eq!(items[0]["strategy"], "content");
    assert_eq!(items[0]["item_id"], 13);
}

#[tokio::test]
async fn test_rebuild_threshold_logs_exactly_one_update() {
    let ctx = create_test_server().await;

    // One short of the threshold: no rebuild yet
    for i in 0..(TEST_REBUILD_THRESHOLD - 1) {
        ctx.server
            .post("/interactions")
            .json(&json!({
                "user_id": 1,
                "item_id": 10 + i,
                "signal": "rating",
                "value": 4.0
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }
    let updates: Vec<serde_json::Value> =
        ctx.server.get("/analytics/model/updates").await.json();
    assert_eq!(updates.len(), 0);

    // The threshold-th interaction schedules exactly one rebuild
    ctx.server
        .post("/interactions")
        .json(&json!({
            "user_id": 2,
            "item_id": 10,
            "signal": "rating",
            "value": 4.0
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let mut updates: Vec<serde_json::Value> = Vec::new();
    for _ in 0..100 {
        updates = ctx.server.get("/analytics/model/updates").await.json();
        if !updates.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["update_type"], "threshold");
}

#[tokio::test]
async fn test_force_update_returns_log_entry() {
    let ctx = create_test_server().await;

    // Build a corpus big enough for a successful factorization
    for user in [1, 2] {
        for item in [10, 11, 12] {
            ctx.server
                .post("/interactions")
                .json(&json!({
                    "user_id": user,
                    "item_id": item,
                    "signal": "rating",
                    "value": 5.0
                }))
                .await
                .assert_status(axum::http::StatusCode::CREATED);
        }
    }
    for user in [3, 4] {
        for item in [20, 21, 40] {
            ctx.server
                .post("/interactions")
                .json(&json!({
                    "user_id": user,
                    "item_id": item,
                    "signal": "rating",
                    "value": 2.0
                }))
                .await
                .assert_status(axum::http::StatusCode::CREATED);
        }
    }
    assert_eq!(ctx.store.interaction_count().await, 12);

    let response = ctx.server.post("/analytics/model/force-update").await;
    response.assert_status_ok();
    let entry: serde_json::Value = response.json();
    assert_eq!(entry["success"], true);
    assert_eq!(entry["update_type"], "forced");
    assert_eq!(entry["interactions_processed"], 12);
    assert!(entry["explained_variance"].is_f64());
}

#[tokio::test]
async fn test_track_click_feeds_performance_metrics() {
    let ctx = create_test_server().await;

    let response = ctx
        .server
        .get("/recommendations")
        .add_query_param("user_id", 50)
        .add_query_param("limit", 5)
        .add_query_param("use_context", false)
        .await;
    let items: Vec<serde_json::Value> = response.json();
    let clicked = items[0]["item_id"].as_i64().unwrap();

    ctx.server
        .post("/analytics/track/click")
        .json(&json!({ "user_id": 50, "item_id": clicked }))
        .await
        .assert_status_ok();

    // Exposure and outcome writes drain on the background task
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = ctx.server.get("/analytics/performance").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["period_days"], 30);

    let popularity = &body["strategies"]["popularity"];
    assert_eq!(popularity["exposures"], 5);
    assert_eq!(popularity["click_rate"].as_f64().unwrap(), 0.2);
}

#[tokio::test]
async fn test_thumbs_toggle_over_http() {
    let ctx = create_test_server().await;

    let response = ctx
        .server
        .get("/recommendations")
        .add_query_param("user_id", 60)
        .add_query_param("limit", 3)
        .add_query_param("use_context", false)
        .await;
    let items: Vec<serde_json::Value> = response.json();
    let item_id = items[0]["item_id"].as_i64().unwrap();

    // Up then down: only the down survives
    for path in ["/analytics/track/thumbs-up", "/analytics/track/thumbs-down"] {
        ctx.server
            .post(path)
            .json(&json!({ "user_id": 60, "item_id": item_id }))
            .await
            .assert_status_ok();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body: serde_json::Value = ctx.server.get("/analytics/performance").await.json();
    let popularity = &body["strategies"]["popularity"];
    assert_eq!(popularity["thumbs_up_rate"], 0.0);
    assert!(popularity["thumbs_down_rate"].as_f64().unwrap() > 0.0);

    // A second down clears both
    ctx.server
        .post("/analytics/track/thumbs-down")
        .json(&json!({ "user_id": 60, "item_id": item_id }))
        .await
        .assert_status_ok();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body: serde_json::Value = ctx.server.get("/analytics/performance").await.json();
    let popularity = &body["strategies"]["popularity"];
    assert_eq!(popularity["thumbs_up_rate"], 0.0);
    assert_eq!(popularity["thumbs_down_rate"], 0.0);
}

#[tokio::test]
async fn test_recommendation_stats_window() {
    let ctx = create_test_server().await;

    ctx.server
        .get("/recommendations")
        .add_query_param("user_id", 70)
        .add_query_param("limit", 4)
        .add_query_param("use_context", false)
        .await
        .assert_status_ok();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = ctx
        .server
        .get("/analytics/recommendations/stats")
        .add_query_param("days", 7)
        .await;
    response.assert_status_ok();
    let stats: serde_json::Value = response.json();
    assert_eq!(stats["period_days"], 7);
    assert_eq!(stats["total_recommendations"], 4);
    assert_eq!(stats["total_clicks"], 0);
}

#[tokio::test]
async fn test_explain_unknown_item_is_404() {
    let ctx = create_test_server().await;

    let response = ctx
        .server
        .get("/recommendations/explain")
        .add_query_param("user_id", 1)
        .add_query_param("item_id", 999)
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}
