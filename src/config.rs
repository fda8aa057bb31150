use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL database connection URL; when unset the service runs on the
    /// in-memory interaction store
    #[serde(default)]
    pub database_url: Option<String>,

    /// Base URL of the embedding similarity provider
    #[serde(default)]
    pub embedding_provider_url: Option<String>,

    /// Base URL of the graph similarity provider
    #[serde(default)]
    pub graph_provider_url: Option<String>,

    /// Per-call budget for optional similarity providers, in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// New interactions since the last build that trigger a model rebuild
    #[serde(default = "default_rebuild_threshold")]
    pub rebuild_threshold: u64,

    /// Minimum total interaction count for a numerically stable build
    #[serde(default = "default_corpus_min")]
    pub corpus_min: usize,

    /// Rank of the latent factorization
    #[serde(default = "default_latent_rank")]
    pub latent_rank: usize,

    /// Minimum vote count for the global-popularity fallback
    #[serde(default = "default_popularity_floor")]
    pub popularity_floor: u32,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_provider_timeout_ms() -> u64 {
    400
}

fn default_rebuild_threshold() -> u64 {
    50
}

fn default_corpus_min() -> usize {
    10
}

fn default_latent_rank() -> usize {
    20
}

fn default_popularity_floor() -> u32 {
    100
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            embedding_provider_url: None,
            graph_provider_url: None,
            provider_timeout_ms: default_provider_timeout_ms(),
            rebuild_threshold: default_rebuild_threshold(),
            corpus_min: default_corpus_min(),
            latent_rank: default_latent_rank(),
            popularity_floor: default_popularity_floor(),
            host: default_host(),
            port: default_port(),
        }
    }
}
