use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{DeclaredPreferences, Interaction, ItemId, ItemMetadata, UserId},
};

use super::InteractionStore;

/// In-memory interaction store
///
/// Backs tests and DATABASE_URL-less deployments. Interactions are held as an
/// append-only list; catalog and preferences as plain maps.
#[derive(Default)]
pub struct MemoryInteractionStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    interactions: Vec<Interaction>,
    items: HashMap<ItemId, ItemMetadata>,
    preferences: HashMap<UserId, DeclaredPreferences>,
}

impl MemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalog item
    pub async fn add_item(&self, item: ItemMetadata) {
        let mut inner = self.inner.write().await;
        inner.items.insert(item.item_id, item);
    }

    /// Sets a user's declared onboarding preferences
    pub async fn set_declared_preferences(&self, user_id: UserId, prefs: DeclaredPreferences) {
        let mut inner = self.inner.write().await;
        inner.preferences.insert(user_id, prefs);
    }

    /// Total number of stored interactions
    pub async fn interaction_count(&self) -> usize {
        self.inner.read().await.interactions.len()
    }
}

#[async_trait::async_trait]
impl InteractionStore for MemoryInteractionStore {
    async fn get_interactions(&self, user_id: UserId) -> AppResult<Vec<Interaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_all_interactions(&self) -> AppResult<Vec<Interaction>> {
        Ok(self.inner.read().await.interactions.clone())
    }

    async fn get_item_metadata(&self, item_id: ItemId) -> AppResult<Option<ItemMetadata>> {
        Ok(self.inner.read().await.items.get(&item_id).cloned())
    }

    async fn all_items(&self) -> AppResult<Vec<ItemMetadata>> {
        let inner = self.inner.read().await;
        let mut items: Vec<ItemMetadata> = inner.items.values().cloned().collect();
        // Deterministic order regardless of map iteration
        items.sort_by_key(|item| item.item_id);
        Ok(items)
    }

    async fn get_declared_preferences(&self, user_id: UserId) -> AppResult<DeclaredPreferences> {
        let inner = self.inner.read().await;
        Ok(inner.preferences.get(&user_id).cloned().unwrap_or_default())
    }

    async fn record_interaction(&self, interaction: Interaction) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.interactions.push(interaction);
        Ok(())
    }
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

    #[tokio::test]
    async fn test_record_and_get_interactions() {
        let store = MemoryInteractionStore::new();
        store.record_interaction(rating(1, 10, 4.0)).await.unwrap();
        store.record_interaction(rating(2, 11, 3.0)).await.unwrap();
        store.record_interaction(rating(1, 12, 5.0)).await.unwrap();

        let user_interactions = store.get_interactions(1).await.unwrap();
        assert_eq!(user_interactions.len(), 2);

        let all = store.get_all_interactions().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_all_items_sorted_by_id() {
        let store = MemoryInteractionStore::new();
        for item_id in [30, 10, 20] {
            store
                .add_item(ItemMetadata {
                    item_id,
                    title: format!("Movie {}", item_id),
                    genres: vec!["Drama".to_string()],
                    vote_count: 100,
                    vote_average: 7.0,
                    popularity: 1.0,
                })
                .await;
        }

        let items = store.all_items().await.unwrap();
        let ids: Vec<ItemId> = items.iter().map(|i| i.item_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_missing_preferences_default_empty() {
        let store = MemoryInteractionStore::new();
        let prefs = store.get_declared_preferences(99).await.unwrap();
        assert!(prefs.is_empty());
    }
}
