use std::collections::{HashMap, HashSet};

use crate::models::{Interaction, ItemId, ItemMetadata, SignalType};

/// How many top genres form the taste profile
const PROFILE_GENRES: usize = 3;

/// Ephemeral genre-weighted taste vector, derived per request
///
/// High ratings weigh 1.0, favorites 0.8, watchlist 0.5; low ratings push a
/// genre negative, and net-negative genres are excluded outright. Never
/// persisted.
#[derive(Debug, Default)]
pub struct TasteProfile {
    pub genre_weights: HashMap<String, f64>,
    pub top_genres: Vec<String>,
    pub excluded_genres: HashSet<String>,
}

impl TasteProfile {
    /// Builds a profile from a user's interactions and the catalog
    pub fn from_interactions(
        interactions: &[Interaction],
        catalog: &HashMap<ItemId, ItemMetadata>,
    ) -> Self {
        let mut genre_weights: HashMap<String, f64> = HashMap::new();

        for interaction in interactions {
            let weight = match interaction.signal {
                SignalType::Rating if interaction.value >= 4.0 => 1.0,
                SignalType::Rating if interaction.value <= 2.0 => -1.0,
                SignalType::Rating => 0.0,
                SignalType::Favorite => 0.8,
                SignalType::Watchlist => 0.5,
                SignalType::ThumbsUp => 0.8,
                SignalType::ThumbsDown => -1.0,
            };
            if weight == 0.0 {
                continue;
            }

            if let Some(item) = catalog.get(&interaction.item_id) {
                for genre in &item.genres {
                    *genre_weights.entry(genre.clone()).or_insert(0.0) += weight;
                }
            }
        }

        Self::from_weights(genre_weights)
    }

    /// Builds a profile straight from declared onboarding genres
    pub fn from_declared(liked_genres: &[String]) -> Self {
        let genre_weights = liked_genres
            .iter()
            .map(|genre| (genre.clone(), 1.0))
            .collect();
        Self::from_weights(genre_weights)
    }

    fn from_weights(genre_weights: HashMap<String, f64>) -> Self {
        let mut positive: Vec<(&String, &f64)> = genre_weights
            .iter()
            .filter(|(_, weight)| **weight > 0.0)
            .collect();
        // Weight desc, name asc so the profile is stable
        positive.sort_by(|a, b| {
            b.1.partial_cmp(a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(b.0))
        });

        let top_genres = positive
            .into_iter()
            .take(PROFILE_GENRES)
            .map(|(genre, _)| genre.clone())
            .collect();

        let excluded_genres = genre_weights
            .iter()
            .filter(|(_, weight)| **weight < 0.0)
            .map(|(genre, _)| genre.clone())
            .collect();

        Self {
            genre_weights,
            top_genres,
            excluded_genres,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top_genres.is_empty()
    }
}

/// Whether every genre of an item falls in the disliked set
///
/// Items without genre data are never excluded on this basis.
pub fn only_disliked_genres(genres: &[String], disliked: &HashSet<String>) -> bool {
    !genres.is_empty() && genres.iter().all(|genre| disliked.contains(genre))
}

/// Scores catalog candidates against a taste profile
///
/// Score = 2 x genre overlap + vote_average / 2. The scale is a relative
/// ranking key only — it is not a probability and is left unbounded on
/// purpose. Candidates with zero overlap are dropped; ties break by
/// ascending item id.
pub fn score_candidates(
    profile: &TasteProfile,
    catalog: &[ItemMetadata],
    seen: &HashSet<ItemId>,
    disliked: &HashSet<String>,
) -> Vec<(ItemId, f64)> {
    if profile.is_empty() {
        return Vec::new();
    }
    let profile_genres: HashSet<&String> = profile.top_genres.iter().collect();

    let mut scored: Vec<(ItemId, f64)> = catalog
        .iter()
        .filter(|item| !seen.contains(&item.item_id))
        .filter(|item| !only_disliked_genres(&item.genres, disliked))
        .filter_map(|item| {
            let overlap = item
                .genres
                .iter()
                .filter(|genre| profile_genres.contains(genre))
                .count();
            if overlap == 0 {
                return None;
            }
            let score = overlap as f64 * 2.0 + item.vote_average / 2.0;
            Some((item.item_id, score))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored
}

/// Global-popularity fallback: well-voted items by rating, descending
///
/// The floor keeps obscure items with a handful of perfect votes out of
/// cold-start lists.
pub fn popular_fallback(
    catalog: &[ItemMetadata],
    vote_floor: u32,
    seen: &HashSet<ItemId>,
    disliked: &HashSet<String>,
) -> Vec<(ItemId, f64)> {
    let mut popular: Vec<(ItemId, f64)> = catalog
        .iter()
        .filter(|item| item.vote_count >= vote_floor)
        .filter(|item| !seen.contains(&item.item_id))
        .filter(|item| !only_disliked_genres(&item.genres, disliked))
        .map(|item| (item.item_id, item.vote_average))
        .collect();

    popular.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    popular
}
