use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Identifier for a user in the interaction store
pub type UserId = i64;

/// Identifier for a catalog item (movie)
pub type ItemId = i64;

/// Kind of feedback signal a user left on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Rating,
    Favorite,
    Watchlist,
    ThumbsUp,
    ThumbsDown,
}

impl SignalType {
    /// Implicit star-equivalent used when building the interaction matrix.
    ///
    /// Explicit ratings carry their own value; the other signals map onto the
    /// same 0.5-5.0 scale so they can share one matrix.
    pub fn implicit_value(&self) -> f64 {
        match self {
            SignalType::Rating => 0.0, // ratings carry their own value
            SignalType::Favorite => 4.5,
            SignalType::Watchlist => 3.5,
            SignalType::ThumbsUp => 4.0,
            SignalType::ThumbsDown => 1.0,
        }
    }
}

/// A single user-item feedback record, append-only from the engine's side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub signal: SignalType,
    /// Rating value for `SignalType::Rating`; ignored for implicit signals
    #[serde(default)]
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    /// Value this interaction contributes to the user x item matrix
    pub fn matrix_value(&self) -> f64 {
        match self.signal {
            SignalType::Rating => self.value,
            other => other.implicit_value(),
        }
    }

    /// Whether this interaction counts as a positive taste signal
    pub fn is_positive(&self) -> bool {
        match self.signal {
            SignalType::Rating => self.value >= 3.5,
            SignalType::Favorite | SignalType::Watchlist | SignalType::ThumbsUp => true,
            SignalType::ThumbsDown => false,
        }
    }
}

/// Catalog metadata for one item
///
/// `genres` is always a normalized list of strings; the store adapter cleans
/// up whatever representation the backing source uses before anything
/// reaches the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item_id: ItemId,
    pub title: String,
    pub genres: Vec<String>,
    #[serde(default)]
    pub vote_count: u32,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub popularity: f64,
}

/// Preferences a user declared during onboarding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaredPreferences {
    #[serde(default)]
    pub liked_genres: Vec<String>,
    #[serde(default)]
    pub disliked_genres: Vec<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub location: Option<String>,
}

impl DeclaredPreferences {
    pub fn is_empty(&self) -> bool {
        self.liked_genres.is_empty() && self.disliked_genres.is_empty()
    }
}

// ============================================================================
// Recommendation output
// ============================================================================

/// Which scoring sub-model produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    Latent,
    Neighborhood,
    Content,
    Embedding,
    Graph,
    Popularity,
    Onboarding,
}

impl StrategyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyTag::Latent => "latent",
            StrategyTag::Neighborhood => "neighborhood",
            StrategyTag::Content => "content",
            StrategyTag::Embedding => "embedding",
            StrategyTag::Graph => "graph",
            StrategyTag::Popularity => "popularity",
            StrategyTag::Onboarding => "onboarding",
        }
    }
}

impl Display for StrategyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a recommendation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f64,
    pub strategy: StrategyTag,
}

// ============================================================================
// Feedback loop records
// ============================================================================

/// A logged instance of one item shown to one user at one rank
///
/// Created at exposure time; outcome fields are filled in place as the user
/// acts on the recommendation. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub strategy: StrategyTag,
    pub position: usize,
    pub score: f64,
    pub exposed_at: DateTime<Utc>,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rating_value: Option<f64>,
    #[serde(default)]
    pub thumbs_up: bool,
    #[serde(default)]
    pub thumbs_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbs_down: bool,
    #[serde(default)]
    pub thumbs_down_at: Option<DateTime<Utc>>,
}

impl RecommendationEvent {
    pub fn new(
        user_id: UserId,
        item_id: ItemId,
        strategy: StrategyTag,
        position: usize,
        score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id,
            strategy,
            position,
            score,
            exposed_at: Utc::now(),
            clicked_at: None,
            rated_at: None,
            rating_value: None,
            thumbs_up: false,
            thumbs_up_at: None,
            thumbs_down: false,
            thumbs_down_at: None,
        }
    }
}

/// User action recorded against an earlier exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    Click,
    Rating,
    ThumbsUp,
    ThumbsDown,
}

/// Aggregated per-strategy feedback metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub exposures: u64,
    pub click_rate: f64,
    pub thumbs_up_rate: f64,
    pub thumbs_down_rate: f64,
    pub avg_rating_given: Option<f64>,
}

/// What kind of model refresh produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Threshold,
    Forced,
}

/// Audit record appended for every model rebuild attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUpdateLog {
    pub update_type: UpdateType,
    pub interactions_processed: usize,
    pub explained_variance: Option<f64>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_value_rating_uses_value() {
        let interaction = Interaction {
            user_id: 1,
            item_id: 10,
            signal: SignalType::Rating,
            value: 4.5,
            timestamp: Utc::now(),
        };
        assert_eq!(interaction.matrix_value(), 4.5);
    }

    #[test]
    fn test_matrix_value_implicit_signals() {
        let favorite = Interaction {
            user_id: 1,
            item_id: 10,
            signal: SignalType::Favorite,
            value: 0.0,
            timestamp: Utc::now(),
        };
        assert_eq!(favorite.matrix_value(), 4.5);

        let watchlist = Interaction {
            signal: SignalType::Watchlist,
            ..favorite.clone()
        };
        assert_eq!(watchlist.matrix_value(), 3.5);
    }

    #[test]
    fn test_is_positive_threshold() {
        let mut interaction = Interaction {
            user_id: 1,
            item_id: 10,
            signal: SignalType::Rating,
            value: 3.5,
            timestamp: Utc::now(),
        };
        assert!(interaction.is_positive());

        interaction.value = 2.0;
        assert!(!interaction.is_positive());

        interaction.signal = SignalType::ThumbsDown;
        assert!(!interaction.is_positive());
    }

    #[test]
    fn test_strategy_tag_display() {
        assert_eq!(StrategyTag::Latent.to_string(), "latent");
        assert_eq!(StrategyTag::Neighborhood.to_string(), "neighborhood");
        assert_eq!(StrategyTag::Onboarding.to_string(), "onboarding");
    }

    #[test]
    fn test_strategy_tag_serde() {
        let json = serde_json::to_string(&StrategyTag::Embedding).unwrap();
        assert_eq!(json, r#""embedding""#);

        let parsed: StrategyTag = serde_json::from_str(r#""neighborhood""#).unwrap();
        assert_eq!(parsed, StrategyTag::Neighborhood);
    }

    #[test]
    fn test_signal_type_serde() {
        let json = serde_json::to_string(&SignalType::ThumbsUp).unwrap();
        assert_eq!(json, r#""thumbs_up""#);
    }

    #[test]
    fn test_new_event_has_no_outcomes() {
        let event = RecommendationEvent::new(1, 10, StrategyTag::Content, 1, 7.2);
        assert!(event.clicked_at.is_none());
        assert!(!event.thumbs_up);
        assert!(!event.thumbs_down);
        assert_eq!(event.position, 1);
    }
}
