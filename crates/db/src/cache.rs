//! Read-through cache for context-scoped pattern lookups.
//!
//! Entries are tagged by context key, so a write to one context only evicts
//! that context's entry; bulk writes and deletes evict everything. The cache
//! is an accelerant only — the engine is wired either with or without this
//! wrapper and behaves identically apart from latency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tracing::debug;

use cutplan_core::suggestions::Pattern;

use crate::repositories::{MergeFn, PatternRepository, RepositoryError};

const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

pub struct CachedPatternRepository {
    inner: Arc<dyn PatternRepository>,
    by_context: Cache<String, Arc<Vec<Pattern>>>,
}

impl CachedPatternRepository {
    pub fn new(inner: Arc<dyn PatternRepository>, ttl: Duration) -> Self {
        let by_context = Cache::builder()
            .max_capacity(DEFAULT_CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { inner, by_context }
    }

    fn invalidate_context(&self, context_key: &str) {
        self.by_context.invalidate(context_key);
    }

    fn invalidate_everything(&self) {
        self.by_context.invalidate_all();
    }
}

#[async_trait]
impl PatternRepository for CachedPatternRepository {
    async fn upsert(&self, pattern_key: &str, merge: MergeFn) -> Result<Pattern, RepositoryError> {
        let merged = self.inner.upsert(pattern_key, merge).await?;
        self.invalidate_context(&merged.context_key);
        Ok(merged)
    }

    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, RepositoryError> {
        self.inner.get(pattern_key).await
    }

    async fn get_by_context(&self, context_key: &str) -> Result<Vec<Pattern>, RepositoryError> {
        if let Some(hit) = self.by_context.get(context_key) {
            debug!(
                event_name = "suggestions.cache.hit",
                context_key = %context_key,
                "pattern context served from cache"
            );
            return Ok(hit.as_ref().clone());
        }

        let patterns = self.inner.get_by_context(context_key).await?;
        self.by_context.insert(context_key.to_string(), Arc::new(patterns.clone()));
        Ok(patterns)
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Pattern>, RepositoryError> {
        // Prefix scans cross context boundaries; serve them straight from
        // the store rather than inventing a second tag scheme.
        self.inner.get_by_prefix(prefix).await
    }

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError> {
        self.inner.list_all().await
    }

    async fn save_batch(&self, patterns: &[Pattern]) -> Result<(), RepositoryError> {
        self.inner.save_batch(patterns).await?;
        self.invalidate_everything();
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let deleted = self.inner.delete_all().await?;
        self.invalidate_everything();
        Ok(deleted)
    }

    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let deleted = self.inner.delete_unused_before(cutoff).await?;
        self.invalidate_everything();
        Ok(deleted)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.inner.count().await
    }

    async fn max_frequency(&self) -> Result<u64, RepositoryError> {
        self.inner.max_frequency().await
    }
}
