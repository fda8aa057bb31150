/// HTTP similarity provider
///
/// Speaks a small JSON contract shared by the embedding and graph services:
/// POST {base_url}/similarity with the user and candidate ids, receive a
/// ranked list back. The provider does not know or care how the vectors were
/// produced.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{ItemId, UserId},
};

use super::SimilarityProvider;

pub struct HttpSimilarityProvider {
    http_client: HttpClient,
    base_url: String,
    name: &'static str,
}

#[derive(Serialize)]
struct SimilarityRequest<'a> {
    user_id: UserId,
    candidate_ids: &'a [ItemId],
}

#[derive(Deserialize)]
struct RankedCandidate {
    item_id: ItemId,
    score: f64,
}

impl HttpSimilarityProvider {
    pub fn new(base_url: String, name: &'static str) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url,
            name,
        }
    }
}

#[async_trait::async_trait]
impl SimilarityProvider for HttpSimilarityProvider {
    async fn rank(
        &self,
        user_id: UserId,
        candidate_ids: &[ItemId],
    ) -> AppResult<Vec<(ItemId, f64)>> {
        let url = format!("{}/similarity", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&SimilarityRequest {
                user_id,
                candidate_ids,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalProvider(format!(
                "{} provider returned status {}: {}",
                self.name, status, body
            )));
        }

        let ranked: Vec<RankedCandidate> = response.json().await?;

        tracing::debug!(
            provider = self.name,
            returned = ranked.len(),
            "Similarity provider responded"
        );

        Ok(ranked.into_iter().map(|c| (c.item_id, c.score)).collect())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
