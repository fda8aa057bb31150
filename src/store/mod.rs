pub mod adapter;
pub mod memory;
pub mod postgres;

pub use adapter::{normalize_genres, InteractionStore};
pub use memory::MemoryInteractionStore;
pub use postgres::SqlInteractionStore;
