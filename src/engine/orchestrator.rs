use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{
        DeclaredPreferences, Interaction, ItemId, ItemMetadata, ScoredItem, StrategyTag, UserId,
    },
    store::InteractionStore,
};

use super::{
    content::{self, TasteProfile},
    neighborhood::{self, NeighborhoodModel},
    providers::{rank_with_timeout, SimilarityProvider},
    refresh::ModelCache,
    rerank,
};

/// Interaction count below which a user is in the cold-start tier
const COLD_START_CEILING: usize = 3;

/// Per-request options for `recommend`
#[derive(Debug, Clone, Copy)]
pub struct RecommendOptions {
    pub use_context: bool,
    pub use_embeddings: bool,
    pub use_graph: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            use_context: true,
            use_embeddings: false,
            use_graph: false,
        }
    }
}

/// Why one item was recommended to one user
#[derive(Debug, Serialize)]
pub struct Explanation {
    pub score: f64,
    pub contributing_strategy: StrategyTag,
    /// The user's own items most similar to the explained one
    pub nearest_neighbors: Vec<NeighborEntry>,
}

#[derive(Debug, Serialize)]
pub struct NeighborEntry {
    pub item_id: ItemId,
    pub similarity: f64,
}

/// Data-sufficiency tier a request is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    ColdStart,
    Light,
    Regular,
}

/// Hybrid recommendation engine: strategy selection, blending, fallback
///
/// Stateless per request — every call re-derives the user's tier and taste
/// from current store contents plus the cached model snapshot. `recommend`
/// upholds the public contract of always returning a list: any internal
/// failure degrades to the next strategy down the chain, ending at the
/// global-popularity fallback.
pub struct Recommender {
    store: Arc<dyn InteractionStore>,
    model_cache: Arc<ModelCache>,
    embedding_provider: Option<Arc<dyn SimilarityProvider>>,
    graph_provider: Option<Arc<dyn SimilarityProvider>>,
    provider_timeout: Duration,
    corpus_min: usize,
    popularity_floor: u32,
}

impl Recommender {
    pub fn new(
        store: Arc<dyn InteractionStore>,
        model_cache: Arc<ModelCache>,
        embedding_provider: Option<Arc<dyn SimilarityProvider>>,
        graph_provider: Option<Arc<dyn SimilarityProvider>>,
        provider_timeout: Duration,
        corpus_min: usize,
        popularity_floor: u32,
    ) -> Self {
        Self {
            store,
            model_cache,
            embedding_provider,
            graph_provider,
            provider_timeout,
            corpus_min,
            popularity_floor,
        }
    }

    /// Produces an ordered recommendation list for a user
    ///
    /// Never errors and never blocks on a model rebuild. An empty list means
    /// the catalog held nothing eligible, which the caller surfaces as-is.
    pub async fn recommend(
        &self,
        user_id: UserId,
        limit: usize,
        options: RecommendOptions,
        now: DateTime<Utc>,
    ) -> Vec<ScoredItem> {
        if limit == 0 {
            return Vec::new();
        }

        // Request-scoped context; a store failure here degrades to an empty
        // list rather than an error, per the recommend contract
        let context = match self.load_context(user_id).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load recommendation context");
                return Vec::new();
            }
        };

        let tier = self.tier(&context).await;
        tracing::debug!(
            user_id,
            ?tier,
            interactions = context.interactions.len(),
            "Serving recommendation request"
        );

        let mut items = match tier {
            Tier::ColdStart => self.cold_start(&context, limit),
            Tier::Light => self.light(&context, limit),
            Tier::Regular => self.regular(&context, limit, options).await,
        };

        if items.is_empty() {
            items = self.popularity(&context, limit);
        }
        items.truncate(limit);

        if options.use_context {
            items = rerank::rerank(items, &context.interactions, &context.catalog_by_id, now);
        }

        items
    }

    /// Explains the engine's affinity between a user and an item
    pub async fn explain(&self, user_id: UserId, item_id: ItemId) -> AppResult<Explanation> {
        let metadata = self.store.get_item_metadata(item_id).await?;
        if metadata.is_none() {
            return Err(AppError::NotFound(format!("Item {} not in catalog", item_id)));
        }

        let context = self.load_context(user_id).await?;
        let seed_ids: Vec<ItemId> = context.seeds.iter().map(|(id, _)| *id).collect();

        let all = self.store.get_all_interactions().await?;
        let neighborhood_model = NeighborhoodModel::build(&all);
        let nearest_neighbors = neighborhood_model
            .nearest_neighbors(item_id, &seed_ids, 5)
            .into_iter()
            .map(|(item_id, similarity)| NeighborEntry {
                item_id,
                similarity,
            })
            .collect();

        // Prefer the latent model's view when it knows both sides
        if let Some(model) = self.model_cache.snapshot().await {
            if let Some(score) = model.predict(user_id, item_id) {
                return Ok(Explanation {
                    score,
                    contributing_strategy: StrategyTag::Latent,
                    nearest_neighbors,
                });
            }
        }

        if !context.seeds.is_empty() {
            let seen = HashSet::new();
            let ranked = neighborhood_model.rank(&context.seeds, &[item_id], &seen);
            if let Some(&(_, score)) = ranked.first() {
                return Ok(Explanation {
                    score,
                    contributing_strategy: StrategyTag::Neighborhood,
                    nearest_neighbors,
                });
            }
        }

        // Content-based floor: genre overlap against the taste profile
        let scored = content::score_candidates(
            &context.profile,
            &context.catalog,
            &HashSet::new(),
            &context.disliked,
        );
        let score = scored
            .iter()
            .find(|(id, _)| *id == item_id)
            .map(|(_, score)| *score)
            .unwrap_or(0.0);

        Ok(Explanation {
            score,
            contributing_strategy: StrategyTag::Content,
            nearest_neighbors,
        })
    }

    async fn tier(&self, context: &RequestContext) -> Tier {
        let count = context.interactions.len();
        if count < COLD_START_CEILING {
            return Tier::ColdStart;
        }

        if count >= self.corpus_min {
            if let Some(model) = self.model_cache.snapshot().await {
                if model.contains_user(context.user_id) {
                    return Tier::Regular;
                }
                tracing::debug!(user_id = context.user_id, "User absent from cached model");
            }
        }
        Tier::Light
    }

    /// Cold start: declared preferences, then taste profile, then popularity
    fn cold_start(&self, context: &RequestContext, limit: usize) -> Vec<ScoredItem> {
        let mut items = if !context.declared.liked_genres.is_empty() {
            let profile = TasteProfile::from_declared(&context.declared.liked_genres);
            tag_all(
                content::score_candidates(&profile, &context.catalog, &context.seen, &context.disliked),
                StrategyTag::Onboarding,
                limit,
            )
        } else if !context.profile.is_empty() {
            tag_all(
                content::score_candidates(
                    &context.profile,
                    &context.catalog,
                    &context.seen,
                    &context.disliked,
                ),
                StrategyTag::Content,
                limit,
            )
        } else {
            Vec::new()
        };

        // Top up with popular items so brand-new users still get a full list
        if items.len() < limit {
            let chosen: HashSet<ItemId> = items.iter().map(|i| i.item_id).collect();
            for entry in self.popularity(context, limit) {
                if items.len() >= limit {
                    break;
                }
                if !chosen.contains(&entry.item_id) {
                    items.push(entry);
                }
            }
        }
        items
    }

    /// Light tier: neighborhood primary, content profile fills the remainder
    fn light(&self, context: &RequestContext, limit: usize) -> Vec<ScoredItem> {
        let neighborhood_model = NeighborhoodModel::build(&context.all_interactions);
        let mut items = tag_all(
            filter_disliked(
                neighborhood_model.rank(&context.seeds, &context.candidate_ids, &context.seen),
                context,
            ),
            StrategyTag::Neighborhood,
            limit,
        );

        if items.len() < limit {
            let chosen: HashSet<ItemId> = items.iter().map(|i| i.item_id).collect();
            let content_items = content::score_candidates(
                &context.profile,
                &context.catalog,
                &context.seen,
                &context.disliked,
            );
            for (item_id, score) in content_items {
                if items.len() >= limit {
                    break;
                }
                if !chosen.contains(&item_id) {
                    items.push(ScoredItem {
                        item_id,
                        score,
                        strategy: StrategyTag::Content,
                    });
                }
            }
        }
        items
    }

    /// Regular tier: weighted blend across every active strategy
    async fn regular(
        &self,
        context: &RequestContext,
        limit: usize,
        options: RecommendOptions,
    ) -> Vec<ScoredItem> {
        let embeddings = options.use_embeddings && self.embedding_provider.is_some();
        let graph = options.use_graph && self.graph_provider.is_some();
        let weights = blend_weights(embeddings, graph);

        let mut blended: Vec<ScoredItem> = Vec::new();
        let mut taken: HashSet<ItemId> = HashSet::new();

        for (strategy, weight) in weights {
            let quota = (weight * limit as f64).ceil() as usize;
            let ranked = match self.run_strategy(strategy, context, quota).await {
                Ok(ranked) => ranked,
                Err(e) => {
                    tracing::warn!(strategy = %strategy, error = %e, "Strategy skipped");
                    continue;
                }
            };
            if ranked.is_empty() {
                tracing::debug!(strategy = %strategy, "Strategy returned no candidates");
                continue;
            }

            // First occurrence wins: earlier strategies hold priority
            for (item_id, score) in ranked {
                if taken.insert(item_id) {
                    blended.push(ScoredItem {
                        item_id,
                        score,
                        strategy,
                    });
                }
            }
        }

        blended.truncate(limit);
        blended
    }

    /// Runs one strategy, returning at most `quota` eligible candidates
    async fn run_strategy(
        &self,
        strategy: StrategyTag,
        context: &RequestContext,
        quota: usize,
    ) -> AppResult<Vec<(ItemId, f64)>> {
        let ranked = match strategy {
            StrategyTag::Latent => {
                let model = self
                    .model_cache
                    .snapshot()
                    .await
                    .ok_or_else(|| AppError::ModelUnavailable("no snapshot".to_string()))?;
                if !model.contains_user(context.user_id) {
                    return Err(AppError::UserUnknown(context.user_id));
                }
                model.rank(context.user_id, &context.candidate_ids, &context.seen)
            }
            StrategyTag::Neighborhood => {
                if context.all_interactions.len() < COLD_START_CEILING {
                    return Err(AppError::CorpusTooSmall(context.all_interactions.len()));
                }
                let model = NeighborhoodModel::build(&context.all_interactions);
                model.rank(&context.seeds, &context.candidate_ids, &context.seen)
            }
            StrategyTag::Content => content::score_candidates(
                &context.profile,
                &context.catalog,
                &context.seen,
                &context.disliked,
            ),
            StrategyTag::Embedding => {
                let provider = self
                    .embedding_provider
                    .as_ref()
                    .ok_or_else(|| AppError::ModelUnavailable("no embedding provider".into()))?;
                rank_with_timeout(
                    provider.as_ref(),
                    context.user_id,
                    &context.candidate_ids,
                    self.provider_timeout,
                )
                .await?
            }
            StrategyTag::Graph => {
                let provider = self
                    .graph_provider
                    .as_ref()
                    .ok_or_else(|| AppError::ModelUnavailable("no graph provider".into()))?;
                rank_with_timeout(
                    provider.as_ref(),
                    context.user_id,
                    &context.candidate_ids,
                    self.provider_timeout,
                )
                .await?
            }
            StrategyTag::Popularity | StrategyTag::Onboarding => Vec::new(),
        };

        // Quota bounds what the strategy is asked for; the exclusion
        // invariants are then enforced uniformly, since providers know
        // nothing about seen items or genre dislikes
        let mut eligible = ranked;
        eligible.truncate(quota);
        eligible.retain(|(item_id, _)| !context.seen.contains(item_id));
        eligible = filter_disliked(eligible, context);
        Ok(eligible)
    }

    fn popularity(&self, context: &RequestContext, limit: usize) -> Vec<ScoredItem> {
        tag_all(
            content::popular_fallback(
                &context.catalog,
                self.popularity_floor,
                &context.seen,
                &context.disliked,
            ),
            StrategyTag::Popularity,
            limit,
        )
    }

    /// Loads everything a single request needs from the store
    async fn load_context(&self, user_id: UserId) -> AppResult<RequestContext> {
        let interactions = self.store.get_interactions(user_id).await?;
        let declared = self.store.get_declared_preferences(user_id).await?;
        let catalog = self.store.all_items().await?;
        let all_interactions = self.store.get_all_interactions().await?;

        let catalog_by_id: HashMap<ItemId, ItemMetadata> = catalog
            .iter()
            .map(|item| (item.item_id, item.clone()))
            .collect();

        let seen: HashSet<ItemId> = interactions.iter().map(|i| i.item_id).collect();
        let profile = TasteProfile::from_interactions(&interactions, &catalog_by_id);

        let mut disliked: HashSet<String> = declared.disliked_genres.iter().cloned().collect();
        disliked.extend(profile.excluded_genres.iter().cloned());

        let candidate_ids: Vec<ItemId> = catalog.iter().map(|item| item.item_id).collect();
        let seeds = neighborhood::positive_seeds(&interactions);

        Ok(RequestContext {
            user_id,
            interactions,
            all_interactions,
            declared,
            catalog,
            catalog_by_id,
            candidate_ids,
            seen,
            disliked,
            profile,
            seeds,
        })
    }
}

/// Everything derived once per request and shared across strategies
struct RequestContext {
    user_id: UserId,
    interactions: Vec<Interaction>,
    all_interactions: Vec<Interaction>,
    declared: DeclaredPreferences,
    catalog: Vec<ItemMetadata>,
    catalog_by_id: HashMap<ItemId, ItemMetadata>,
    candidate_ids: Vec<ItemId>,
    seen: HashSet<ItemId>,
    disliked: HashSet<String>,
    profile: TasteProfile,
    seeds: Vec<(ItemId, f64)>,
}

/// Blend weights per active provider combination; always sums to 1.0
fn blend_weights(embeddings: bool, graph: bool) -> Vec<(StrategyTag, f64)> {
    match (embeddings, graph) {
        (false, false) => vec![
            (StrategyTag::Latent, 0.60),
            (StrategyTag::Neighborhood, 0.25),
            (StrategyTag::Content, 0.15),
        ],
        (true, false) => vec![
            (StrategyTag::Latent, 0.40),
            (StrategyTag::Neighborhood, 0.30),
            (StrategyTag::Content, 0.20),
            (StrategyTag::Embedding, 0.10),
        ],
        (false, true) => vec![
            (StrategyTag::Latent, 0.40),
            (StrategyTag::Neighborhood, 0.30),
            (StrategyTag::Content, 0.20),
            (StrategyTag::Graph, 0.10),
        ],
        (true, true) => vec![
            (StrategyTag::Latent, 0.30),
            (StrategyTag::Neighborhood, 0.30),
            (StrategyTag::Content, 0.20),
            (StrategyTag::Embedding, 0.10),
            (StrategyTag::Graph, 0.10),
        ],
    }
}

fn filter_disliked(
    ranked: Vec<(ItemId, f64)>,
    context: &RequestContext,
) -> Vec<(ItemId, f64)> {
    ranked
        .into_iter()
        .filter(|(item_id, _)| {
            context
                .catalog_by_id
                .get(item_id)
                .map(|meta| !content::only_disliked_genres(&meta.genres, &context.disliked))
                .unwrap_or(false)
        })
        .collect()
}

fn tag_all(ranked: Vec<(ItemId, f64)>, strategy: StrategyTag, limit: usize) -> Vec<ScoredItem> {
    ranked
        .into_iter()
        .take(limit)
        .map(|(item_id, score)| ScoredItem {
            item_id,
            score,
            strategy,
        })
        .collect()
}
