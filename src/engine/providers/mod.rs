use std::time::Duration;

/// Similarity provider abstraction
///
/// Embedding and graph similarity are produced by external systems and
/// consumed here as opaque ranked lists — just another candidate-scoring
/// strategy. Every call through this seam is time-bounded: a slow provider
/// costs the request one strategy, never the whole response.
use crate::{
    error::{AppError, AppResult},
    models::{ItemId, UserId},
};

pub mod http;

pub use http::HttpSimilarityProvider;

/// Trait for external similarity providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SimilarityProvider: Send + Sync {
    /// Ranks the candidate items for a user, best first
    ///
    /// Scores are provider-defined and only compared within the returned
    /// list, never across providers.
    async fn rank(&self, user_id: UserId, candidate_ids: &[ItemId])
        -> AppResult<Vec<(ItemId, f64)>>;

    /// Provider name for logging and strategy skipping
    fn name(&self) -> &'static str;
}

/// Calls a provider under a deadline
///
/// On timeout the strategy is reported as `StrategyTimeout` so the
/// orchestrator can skip it; the underlying future is dropped.
pub async fn rank_with_timeout(
    provider: &dyn SimilarityProvider,
    user_id: UserId,
    candidate_ids: &[ItemId],
    budget: Duration,
) -> AppResult<Vec<(ItemId, f64)>> {
    match tokio::time::timeout(budget, provider.rank(user_id, candidate_ids)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                provider = provider.name(),
                budget_ms = budget.as_millis() as u64,
                "Similarity provider timed out"
            );
            Err(AppError::StrategyTimeout(provider.name()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait::async_trait]
    impl SimilarityProvider for SlowProvider {
        async fn rank(
            &self,
            _user_id: UserId,
            candidate_ids: &[ItemId],
        ) -> AppResult<Vec<(ItemId, f64)>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(candidate_ids.iter().map(|&id| (id, 0.5)).collect())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_rank_with_timeout_expires() {
        let provider = SlowProvider;
        let result =
            rank_with_timeout(&provider, 1, &[10, 20], Duration::from_millis(10)).await;
        assert!(matches!(result, Err(AppError::StrategyTimeout("slow"))));
    }

    #[tokio::test]
    async fn test_rank_with_timeout_passes_through() {
        let provider = SlowProvider;
        let result =
            rank_with_timeout(&provider, 1, &[10, 20], Duration::from_millis(500)).await;
        assert_eq!(result.unwrap(), vec![(10, 0.5), (20, 0.5)]);
    }
}
