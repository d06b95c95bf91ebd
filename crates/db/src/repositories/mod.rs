use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use cutplan_core::domain::cutting_list::CuttingList;
use cutplan_core::suggestions::Pattern;

pub mod history;
pub mod memory;
pub mod pattern;

pub use history::SqlHistoryRepository;
pub use memory::{InMemoryHistoryRepository, InMemoryPatternRepository};
pub use pattern::SqlPatternRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Read-modify-write closure handed to [`PatternRepository::upsert`].
/// Receives the stored pattern (or `None` for a first observation) and
/// returns the record to persist.
pub type MergeFn = Box<dyn FnOnce(Option<Pattern>) -> Pattern + Send + 'static>;

/// Durable store for learned patterns. `pattern_key` is the only merge key;
/// implementations must make `upsert` linearizable per key.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Atomic read-modify-write for one pattern key.
    async fn upsert(&self, pattern_key: &str, merge: MergeFn) -> Result<Pattern, RepositoryError>;

    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, RepositoryError>;

    /// Every pattern sharing one exact `PRODUCT|SIZE` context.
    async fn get_by_context(&self, context_key: &str) -> Result<Vec<Pattern>, RepositoryError>;

    /// Every pattern whose key starts with the given prefix. Pattern keys
    /// begin with the context key, so a `PRODUCT|` prefix scans all sizes of
    /// a product.
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Pattern>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError>;

    /// All-or-nothing write of one batch. A failed batch leaves previously
    /// committed batches in place.
    async fn save_batch(&self, patterns: &[Pattern]) -> Result<(), RepositoryError>;

    async fn delete_all(&self) -> Result<u64, RepositoryError>;

    /// Delete every pattern whose `last_used` is strictly older than the
    /// cutoff; returns the number deleted (zero matches is not an error).
    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    async fn max_frequency(&self) -> Result<u64, RepositoryError>;
}

/// Source of historical cutting lists for batch extraction, and the sink
/// for freshly recorded ones.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn load_history(&self) -> Result<Vec<CuttingList>, RepositoryError>;

    async fn save_list(&self, list: &CuttingList) -> Result<(), RepositoryError>;
}
