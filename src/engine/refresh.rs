use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    models::{ModelUpdateLog, UpdateType},
    store::InteractionStore,
};

use super::latent::LatentFactorModel;

/// Shared cache holding the active latent factor model snapshot
///
/// The model itself is immutable; the only mutation is replacing the `Arc`
/// under a narrow write lock. Readers clone the pointer and work off a
/// consistent snapshot for the rest of their request — they never observe a
/// half-built model.
#[derive(Default)]
pub struct ModelCache {
    current: RwLock<Option<Arc<LatentFactorModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active snapshot, if one has been built
    pub async fn snapshot(&self) -> Option<Arc<LatentFactorModel>> {
        self.current.read().await.clone()
    }

    /// Atomically replaces the active snapshot
    pub async fn swap(&self, model: Arc<LatentFactorModel>) {
        let mut current = self.current.write().await;
        *current = Some(model);
    }
}

/// Counts new interactions and rebuilds the model when the threshold is hit
///
/// Rebuilds run on a background task so `recommend()` never blocks on one;
/// an in-flight guard keeps concurrent threshold crossings from stacking
/// rebuilds. Every attempt — successful or not — appends a `ModelUpdateLog`
/// entry.
pub struct UpdateTrigger {
    store: Arc<dyn InteractionStore>,
    cache: Arc<ModelCache>,
    history: RwLock<Vec<ModelUpdateLog>>,
    since_build: AtomicU64,
    rebuild_threshold: u64,
    corpus_min: usize,
    latent_rank: usize,
    in_flight: AtomicBool,
}

impl UpdateTrigger {
    pub fn new(
        store: Arc<dyn InteractionStore>,
        cache: Arc<ModelCache>,
        rebuild_threshold: u64,
        corpus_min: usize,
        latent_rank: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache,
            history: RwLock::new(Vec::new()),
            since_build: AtomicU64::new(0),
            rebuild_threshold,
            corpus_min,
            latent_rank,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Interactions accumulated since the last build
    pub fn pending(&self) -> u64 {
        self.since_build.load(Ordering::SeqCst)
    }

    /// Registers one new interaction, kicking off a background rebuild once
    /// the counter reaches the threshold
    pub fn notify_interaction(self: &Arc<Self>) {
        let count = self.since_build.fetch_add(1, Ordering::SeqCst) + 1;
        if count < self.rebuild_threshold {
            return;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A rebuild is already running; the counter keeps accumulating
            return;
        }

        self.since_build.store(0, Ordering::SeqCst);
        tracing::info!(count, "Rebuild threshold reached, scheduling model rebuild");

        let trigger = Arc::clone(self);
        tokio::spawn(async move {
            trigger.run_rebuild(UpdateType::Threshold).await;
            trigger.in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Rebuilds immediately regardless of the counter, returning the log entry
    pub async fn force_rebuild(&self) -> ModelUpdateLog {
        self.since_build.store(0, Ordering::SeqCst);
        self.run_rebuild(UpdateType::Forced).await
    }

    /// Most recent update log entries, newest first
    pub async fn update_history(&self, limit: usize) -> Vec<ModelUpdateLog> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }

    async fn run_rebuild(&self, update_type: UpdateType) -> ModelUpdateLog {
        let start = Instant::now();

        let entry = match self.store.get_all_interactions().await {
            Ok(interactions) => {
                let processed = interactions.len();
                let rank = self.latent_rank;
                let corpus_min = self.corpus_min;

                // The factorization is CPU-bound; keep it off the async workers
                let built = tokio::task::spawn_blocking(move || {
                    LatentFactorModel::build(&interactions, rank, corpus_min)
                })
                .await
                .unwrap_or(None);

                match built {
                    Some(model) => {
                        let explained_variance = model.explained_variance;
                        self.cache.swap(Arc::new(model)).await;
                        ModelUpdateLog {
                            update_type,
                            interactions_processed: processed,
                            explained_variance: Some(explained_variance),
                            duration_ms: start.elapsed().as_millis() as u64,
                            success: true,
                            error: None,
                            timestamp: Utc::now(),
                        }
                    }
                    None => ModelUpdateLog {
                        update_type,
                        interactions_processed: processed,
                        explained_variance: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                        success: false,
                        error: Some("corpus below minimum or matrix degenerate".to_string()),
                        timestamp: Utc::now(),
                    },
                }
            }
            Err(e) => ModelUpdateLog {
                update_type,
                interactions_processed: 0,
                explained_variance: None,
                duration_ms: start.elapsed().as_millis() as u64,
                success: false,
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        };

        if entry.success {
            tracing::info!(
                update_type = ?entry.update_type,
                interactions = entry.interactions_processed,
                explained_variance = entry.explained_variance,
                duration_ms = entry.duration_ms,
                "Model rebuild completed"
            );
        } else {
            tracing::warn!(
                update_type = ?entry.update_type,
                error = entry.error.as_deref().unwrap_or("unknown"),
                "Model rebuild failed"
            );
        }

        let mut history = self.history.write().await;
        history.push(entry.clone());
        entry
    }
}
