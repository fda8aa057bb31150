use crate::{
    error::AppResult,
    models::{DeclaredPreferences, Interaction, ItemId, ItemMetadata, UserId},
};

/// Read/append access to interaction history and catalog metadata
///
/// This is the boundary between the engine and whatever owns the data. All
/// metadata crossing it is normalized — in particular `genres` is always a
/// plain list of strings, regardless of how the backing source encodes it —
/// so the core never special-cases representation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    /// All interactions for one user, oldest first
    async fn get_interactions(&self, user_id: UserId) -> AppResult<Vec<Interaction>>;

    /// The full interaction corpus, used for model builds
    async fn get_all_interactions(&self) -> AppResult<Vec<Interaction>>;

    /// Metadata for a single item, if the catalog knows it
    async fn get_item_metadata(&self, item_id: ItemId) -> AppResult<Option<ItemMetadata>>;

    /// The full catalog, used for candidate generation
    async fn all_items(&self) -> AppResult<Vec<ItemMetadata>>;

    /// Preferences the user declared during onboarding; empty if none
    async fn get_declared_preferences(&self, user_id: UserId) -> AppResult<DeclaredPreferences>;

    /// Append a new interaction to the history
    async fn record_interaction(&self, interaction: Interaction) -> AppResult<()>;
}

/// Normalizes a raw genre field into a list of strings
///
/// Source catalogs are inconsistent: genres arrive as a JSON array, as a
/// string containing a JSON array, or as a comma-separated string. Everything
/// funnels through here before reaching the engine.
pub fn normalize_genres(raw: &serde_json::Value) -> Vec<String> {
    match raw {
        serde_json::Value::Array(values) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        serde_json::Value::String(s) => {
            // A string may itself hold an encoded JSON array
            if let Ok(inner) = serde_json::from_str::<serde_json::Value>(s) {
                if inner.is_array() {
                    return normalize_genres(&inner);
                }
            }
            s.split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        }
        _ => Vec::new(),
    }
}
