use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::{DeclaredPreferences, Interaction, ItemId, ItemMetadata, SignalType, UserId},
};

use super::{adapter::normalize_genres, InteractionStore};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// PostgreSQL-backed interaction store
///
/// Queries are bound at runtime so the crate builds without a live database.
/// The `genres` column is stored however the ingestion pipeline left it
/// (JSON array or delimited string) and normalized here, at the adapter
/// boundary.
pub struct SqlInteractionStore {
    pool: PgPool,
}

impl SqlInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    user_id: i64,
    item_id: i64,
    signal: String,
    value: f64,
    created_at: DateTime<Utc>,
}

impl InteractionRow {
    fn into_interaction(self) -> AppResult<Interaction> {
        let signal = parse_signal(&self.signal).ok_or_else(|| {
            AppError::Internal(format!("Unknown signal type in store: {}", self.signal))
        })?;
        Ok(Interaction {
            user_id: self.user_id,
            item_id: self.item_id,
            signal,
            value: self.value,
            timestamp: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    title: String,
    genres: Option<serde_json::Value>,
    vote_count: Option<i32>,
    vote_average: Option<f64>,
    popularity: Option<f64>,
}

impl From<ItemRow> for ItemMetadata {
    fn from(row: ItemRow) -> Self {
        ItemMetadata {
            item_id: row.id,
            title: row.title,
            genres: row
                .genres
                .as_ref()
                .map(normalize_genres)
                .unwrap_or_default(),
            vote_count: row.vote_count.unwrap_or(0).max(0) as u32,
            vote_average: row.vote_average.unwrap_or(0.0),
            popularity: row.popularity.unwrap_or(0.0),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    liked_genres: Option<serde_json::Value>,
    disliked_genres: Option<serde_json::Value>,
    age: Option<i32>,
    location: Option<String>,
}

fn parse_signal(raw: &str) -> Option<SignalType> {
    match raw {
        "rating" => Some(SignalType::Rating),
        "favorite" => Some(SignalType::Favorite),
        "watchlist" => Some(SignalType::Watchlist),
        "thumbs_up" => Some(SignalType::ThumbsUp),
        "thumbs_down" => Some(SignalType::ThumbsDown),
        _ => None,
    }
}

fn signal_str(signal: SignalType) -> &'static str {
    match signal {
        SignalType::Rating => "rating",
        SignalType::Favorite => "favorite",
        SignalType::Watchlist => "watchlist",
        SignalType::ThumbsUp => "thumbs_up",
        SignalType::ThumbsDown => "thumbs_down",
    }
}

#[async_trait::async_trait]
impl InteractionStore for SqlInteractionStore {
    async fn get_interactions(&self, user_id: UserId) -> AppResult<Vec<Interaction>> {
        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT user_id, item_id, signal, value, created_at
            FROM interactions
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InteractionRow::into_interaction).collect()
    }

    async fn get_all_interactions(&self) -> AppResult<Vec<Interaction>> {
        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT user_id, item_id, signal, value, created_at
            FROM interactions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InteractionRow::into_interaction).collect()
    }

    async fn get_item_metadata(&self, item_id: ItemId) -> AppResult<Option<ItemMetadata>> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, title, genres, vote_count, vote_average, popularity
            FROM movies
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ItemMetadata::from))
    }

    async fn all_items(&self) -> AppResult<Vec<ItemMetadata>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, title, genres, vote_count, vote_average, popularity
            FROM movies
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ItemMetadata::from).collect())
    }

    async fn get_declared_preferences(&self, user_id: UserId) -> AppResult<DeclaredPreferences> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            SELECT liked_genres, disliked_genres, age, location
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| DeclaredPreferences {
                liked_genres: r
                    .liked_genres
                    .as_ref()
                    .map(normalize_genres)
                    .unwrap_or_default(),
                disliked_genres: r
                    .disliked_genres
                    .as_ref()
                    .map(normalize_genres)
                    .unwrap_or_default(),
                age: r.age.and_then(|a| u8::try_from(a).ok()),
                location: r.location,
            })
            .unwrap_or_default())
    }

    async fn record_interaction(&self, interaction: Interaction) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interactions (user_id, item_id, signal, value, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(interaction.user_id)
        .bind(interaction.item_id)
        .bind(signal_str(interaction.signal))
        .bind(interaction.value)
        .bind(interaction.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
