use std::sync::Arc;
use std::time::Duration;

use marquee_api::api::{create_router, AppState};
use marquee_api::config::Config;
use marquee_api::engine::providers::{HttpSimilarityProvider, SimilarityProvider};
use marquee_api::engine::{ModelCache, Recommender, UpdateTrigger};
use marquee_api::store::{postgres, InteractionStore, MemoryInteractionStore, SqlInteractionStore};
use marquee_api::tracker::EventTracker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn InteractionStore> = match &config.database_url {
        Some(url) => {
            let pool = postgres::create_pool(url).await?;
            Arc::new(SqlInteractionStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, falling back to in-memory interaction store");
            Arc::new(MemoryInteractionStore::new())
        }
    };

    let model_cache = Arc::new(ModelCache::new());
    let trigger = UpdateTrigger::new(
        Arc::clone(&store),
        Arc::clone(&model_cache),
        config.rebuild_threshold,
        config.corpus_min,
        config.latent_rank,
    );

    // Warm the model cache off the startup path; on an empty store this logs
    // a failed attempt and the engine serves fallbacks until data arrives
    let warmup = Arc::clone(&trigger);
    tokio::spawn(async move {
        warmup.force_rebuild().await;
    });

    let embedding_provider = config.embedding_provider_url.clone().map(|url| {
        Arc::new(HttpSimilarityProvider::new(url, "embedding")) as Arc<dyn SimilarityProvider>
    });
    let graph_provider = config.graph_provider_url.clone().map(|url| {
        Arc::new(HttpSimilarityProvider::new(url, "graph")) as Arc<dyn SimilarityProvider>
    });

    let recommender = Arc::new(Recommender::new(
        Arc::clone(&store),
        Arc::clone(&model_cache),
        embedding_provider,
        graph_provider,
        Duration::from_millis(config.provider_timeout_ms),
        config.corpus_min,
        config.popularity_floor,
    ));

    let (tracker, _event_writer) = EventTracker::new();

    let state = AppState {
        store,
        recommender,
        trigger,
        tracker,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "marquee-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
