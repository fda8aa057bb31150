use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::models::{Interaction, ItemId, ItemMetadata, ScoredItem};

/// How much of the recent history the diversity pass looks at
const RECENT_WINDOW: usize = 10;

/// Below this many recent interactions the diversity pass is a no-op
const MIN_RECENT_FOR_DIVERSITY: usize = 3;

/// New-genre reward in the diversity score
const NEW_GENRE_BOOST: f64 = 1.3;

/// Saturation penalty in the diversity score
const SATURATION_PENALTY: f64 = 0.5;

/// Coarse time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeBucket::Morning,
            12..=16 => TimeBucket::Afternoon,
            17..=21 => TimeBucket::Evening,
            _ => TimeBucket::Night,
        }
    }
}

/// Genres that tend to land well in each time bucket
fn preferred_genres(bucket: TimeBucket, weekend: bool) -> HashSet<&'static str> {
    let mut genres: HashSet<&'static str> = match bucket {
        TimeBucket::Morning => ["Animation", "Family", "Comedy", "Adventure"].into(),
        TimeBucket::Afternoon => ["Action", "Adventure", "Comedy", "Science Fiction"].into(),
        TimeBucket::Evening => ["Drama", "Thriller", "Mystery", "Crime"].into(),
        TimeBucket::Night => ["Horror", "Thriller", "Mystery", "Science Fiction"].into(),
    };
    // Weekends skew toward longer blockbuster viewing in every bucket
    if weekend {
        genres.insert("Action");
        genres.insert("Adventure");
    }
    genres
}

/// Context-aware reranking: temporal filtering then diversity boosting
///
/// Both passes are pure reorderings — the list that comes out contains
/// exactly the items that went in, in a (possibly) different order.
pub fn rerank(
    items: Vec<ScoredItem>,
    user_interactions: &[Interaction],
    catalog: &HashMap<ItemId, ItemMetadata>,
    now: DateTime<Utc>,
) -> Vec<ScoredItem> {
    let items = temporal_pass(items, catalog, now);
    diversity_pass(items, user_interactions, catalog)
}

/// Pass 1: stable-sorts genre matches for the current context to the front
pub fn temporal_pass(
    mut items: Vec<ScoredItem>,
    catalog: &HashMap<ItemId, ItemMetadata>,
    now: DateTime<Utc>,
) -> Vec<ScoredItem> {
    let bucket = TimeBucket::from_hour(now.hour());
    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    let preferred = preferred_genres(bucket, weekend);

    tracing::debug!(?bucket, weekend, "Temporal rerank pass");

    // Stable: equal keys keep their blended order
    items.sort_by_key(|item| {
        let matches = catalog
            .get(&item.item_id)
            .map(|meta| meta.genres.iter().any(|g| preferred.contains(g.as_str())))
            .unwrap_or(false);
        if matches {
            0
        } else {
            1
        }
    });
    items
}

/// Pass 2: demotes candidates whose genres saturate the recent history
///
/// Saturation is the share of the user's last ten interactions carrying a
/// genre; candidates are re-sorted by
/// `1.0 + 1.3 x new_genre_count - 0.5 x max_saturation`. Users with fewer
/// than three recent interactions pass through untouched.
pub fn diversity_pass(
    mut items: Vec<ScoredItem>,
    user_interactions: &[Interaction],
    catalog: &HashMap<ItemId, ItemMetadata>,
) -> Vec<ScoredItem> {
    let mut recent: Vec<&Interaction> = user_interactions.iter().collect();
    recent.sort_by_key(|i| std::cmp::Reverse(i.timestamp));
    recent.truncate(RECENT_WINDOW);

    if recent.len() < MIN_RECENT_FOR_DIVERSITY {
        return items;
    }

    let mut genre_counts: HashMap<&str, usize> = HashMap::new();
    for interaction in &recent {
        if let Some(meta) = catalog.get(&interaction.item_id) {
            for genre in &meta.genres {
                *genre_counts.entry(genre.as_str()).or_insert(0) += 1;
            }
        }
    }
    let window = recent.len() as f64;
    let saturation: HashMap<&str, f64> = genre_counts
        .into_iter()
        .map(|(genre, count)| (genre, count as f64 / window))
        .collect();

    let diversity_score = |item: &ScoredItem| -> f64 {
        let Some(meta) = catalog.get(&item.item_id) else {
            return 1.0;
        };
        let new_genres = meta
            .genres
            .iter()
            .filter(|g| !saturation.contains_key(g.as_str()))
            .count() as f64;
        let max_saturation = meta
            .genres
            .iter()
            .filter_map(|g| saturation.get(g.as_str()))
            .fold(0.0_f64, |acc, s| acc.max(*s));
        1.0 + NEW_GENRE_BOOST * new_genres - SATURATION_PENALTY * max_saturation
    };

    // Stable sort, descending diversity score
    let mut keyed: Vec<(f64, ScoredItem)> = items
        .drain(..)
        .map(|item| (diversity_score(&item), item))
        .collect();
    keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    keyed.into_iter().map(|(_, item)| item).collect()
}
