use std::collections::{HashMap, HashSet};

use crate::models::{Interaction, ItemId, UserId};

/// Item-item similarity model over co-interaction patterns
///
/// Each item is represented by the sparse vector of user feedback it has
/// received; similarity is the cosine between those vectors. Serves as the
/// collaborative strategy whenever the latent factor model is unavailable or
/// does not know the user.
pub struct NeighborhoodModel {
    item_vectors: HashMap<ItemId, HashMap<UserId, f64>>,
    norms: HashMap<ItemId, f64>,
}

impl NeighborhoodModel {
    /// Builds the co-interaction vectors from the full corpus
    pub fn build(interactions: &[Interaction]) -> Self {
        let mut item_vectors: HashMap<ItemId, HashMap<UserId, f64>> = HashMap::new();

        for interaction in interactions {
            let value = interaction.matrix_value();
            let vector = item_vectors.entry(interaction.item_id).or_default();
            let entry = vector.entry(interaction.user_id).or_insert(value);
            if value > *entry {
                *entry = value;
            }
        }

        let norms = item_vectors
            .iter()
            .map(|(item_id, vector)| {
                let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
                (*item_id, norm)
            })
            .collect();

        Self {
            item_vectors,
            norms,
        }
    }

    /// Cosine similarity between two items' co-interaction vectors
    pub fn similarity(&self, a: ItemId, b: ItemId) -> f64 {
        let (Some(vec_a), Some(vec_b)) = (self.item_vectors.get(&a), self.item_vectors.get(&b))
        else {
            return 0.0;
        };
        let norm_a = self.norms.get(&a).copied().unwrap_or(0.0);
        let norm_b = self.norms.get(&b).copied().unwrap_or(0.0);
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        // Iterate the smaller vector
        let (small, large) = if vec_a.len() <= vec_b.len() {
            (vec_a, vec_b)
        } else {
            (vec_b, vec_a)
        };
        let dot: f64 = small
            .iter()
            .filter_map(|(user_id, v)| large.get(user_id).map(|w| v * w))
            .sum();

        dot / (norm_a * norm_b)
    }

    /// Ranks candidates by seed-weighted aggregated similarity
    ///
    /// `seeds` are the user's positively-signaled items with their signal
    /// strengths; each candidate accumulates `similarity x strength` over all
    /// seeds. Seen items and zero-affinity candidates are dropped; ties break
    /// by ascending item id.
    pub fn rank(
        &self,
        seeds: &[(ItemId, f64)],
        candidates: &[ItemId],
        seen: &HashSet<ItemId>,
    ) -> Vec<(ItemId, f64)> {
        if seeds.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(ItemId, f64)> = candidates
            .iter()
            .filter(|item_id| !seen.contains(item_id))
            .map(|&item_id| {
                let score: f64 = seeds
                    .iter()
                    .map(|&(seed, strength)| self.similarity(seed, item_id) * strength)
                    .sum();
                (item_id, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }

    /// The `n` most similar items to `item_id` among `among`
    ///
    /// Used by `explain` to surface which of the user's own items pulled a
    /// recommendation in.
    pub fn nearest_neighbors(
        &self,
        item_id: ItemId,
        among: &[ItemId],
        n: usize,
    ) -> Vec<(ItemId, f64)> {
        let mut neighbors: Vec<(ItemId, f64)> = among
            .iter()
            .filter(|&&other| other != item_id)
            .map(|&other| (other, self.similarity(item_id, other)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();

        neighbors.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        neighbors.truncate(n);
        neighbors
    }
}

/// Extracts a user's positively-signaled items with normalized strengths
pub fn positive_seeds(interactions: &[Interaction]) -> Vec<(ItemId, f64)> {
    let mut strengths: HashMap<ItemId, f64> = HashMap::new();
    for interaction in interactions {
        if !interaction.is_positive() {
            continue;
        }
        let strength = interaction.matrix_value() / 5.0;
        let entry = strengths.entry(interaction.item_id).or_insert(strength);
        if strength > *entry {
            *entry = strength;
        }
    }

    let mut seeds: Vec<(ItemId, f64)> = strengths.into_iter().collect();
    seeds.sort_by_key(|(item_id, _)| *item_id);
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalType;
    use chrono::Utc;

    fn rating(user_id: UserId, item_id: ItemId, value: f64) -> Interaction {
        Interaction {
            user_id,
            item_id,
            signal: SignalType::Rating,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Items 10 and 11 are co-liked by users 1-3; item 20 only by user 9.
    fn corpus() -> Vec<Interaction> {
        vec![
            rating(1, 10, 5.0),
            rating(1, 11, 4.5),
            rating(2, 10, 4.0),
            rating(2, 11, 5.0),
            rating(3, 10, 4.5),
            rating(3, 11, 4.0),
            rating(9, 20, 5.0),
        ]
    }

    #[test]
    fn test_similarity_co_interacted_items() {
        let model = NeighborhoodModel::build(&corpus());
        assert!(model.similarity(10, 11) > 0.9);
        assert_eq!(model.similarity(10, 20), 0.0);
        assert_eq!(model.similarity(10, 999), 0.0);
    }

    #[test]
    fn test_rank_prefers_co_interacted_candidate() {
        let model = NeighborhoodModel::build(&corpus());

        // A new user who loved item 10
        let seeds = vec![(10, 1.0)];
        let seen: HashSet<ItemId> = [10].into_iter().collect();
        let ranked = model.rank(&seeds, &[10, 11, 20], &seen);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, 11);
        assert!(ranked[0].1 > 0.0);
    }

    #[test]
    fn test_rank_no_seeds_is_empty() {
        let model = NeighborhoodModel::build(&corpus());
        assert!(model.rank(&[], &[10, 11], &HashSet::new()).is_empty());
    }

    #[test]
    fn test_positive_seeds_filters_and_normalizes() {
        let interactions = vec![
            rating(1, 10, 5.0),
            rating(1, 20, 1.5), // low rating: not a seed
            Interaction {
                user_id: 1,
                item_id: 30,
                signal: SignalType::Favorite,
                value: 0.0,
                timestamp: Utc::now(),
            },
        ];

        let seeds = positive_seeds(&interactions);
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0], (10, 1.0));
        assert_eq!(seeds[1], (30, 0.9)); // favorite weight 4.5 / 5.0
    }

    #[test]
    fn test_nearest_neighbors_sorted_and_truncated() {
        let model = NeighborhoodModel::build(&corpus());
        let neighbors = model.nearest_neighbors(10, &[11, 20], 5);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].0, 11);
    }
}
