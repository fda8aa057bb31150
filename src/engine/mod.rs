pub mod content;
pub mod latent;
pub mod neighborhood;
pub mod orchestrator;
pub mod providers;
pub mod refresh;
pub mod rerank;

pub use latent::LatentFactorModel;
pub use orchestrator::{Explanation, RecommendOptions, Recommender};
pub use refresh::{ModelCache, UpdateTrigger};
