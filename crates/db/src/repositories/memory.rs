use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use cutplan_core::domain::cutting_list::CuttingList;
use cutplan_core::suggestions::Pattern;

use super::{HistoryRepository, MergeFn, PatternRepository, RepositoryError};

/// In-memory pattern store for tests and cache-free wiring. The single
/// write lock makes every upsert linearizable.
#[derive(Default)]
pub struct InMemoryPatternRepository {
    patterns: RwLock<HashMap<String, Pattern>>,
}

#[async_trait::async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn upsert(&self, pattern_key: &str, merge: MergeFn) -> Result<Pattern, RepositoryError> {
        let mut patterns = self.patterns.write().await;
        let merged = merge(patterns.get(pattern_key).cloned());
        patterns.insert(pattern_key.to_string(), merged.clone());
        Ok(merged)
    }

    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, RepositoryError> {
        let patterns = self.patterns.read().await;
        Ok(patterns.get(pattern_key).cloned())
    }

    async fn get_by_context(&self, context_key: &str) -> Result<Vec<Pattern>, RepositoryError> {
        let patterns = self.patterns.read().await;
        Ok(patterns.values().filter(|p| p.context_key == context_key).cloned().collect())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Pattern>, RepositoryError> {
        let patterns = self.patterns.read().await;
        Ok(patterns.values().filter(|p| p.pattern_key.starts_with(prefix)).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError> {
        let patterns = self.patterns.read().await;
        Ok(patterns.values().cloned().collect())
    }

    async fn save_batch(&self, batch: &[Pattern]) -> Result<(), RepositoryError> {
        let mut patterns = self.patterns.write().await;
        for pattern in batch {
            patterns.insert(pattern.pattern_key.clone(), pattern.clone());
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let mut patterns = self.patterns.write().await;
        let removed = patterns.len() as u64;
        patterns.clear();
        Ok(removed)
    }

    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut patterns = self.patterns.write().await;
        let before = patterns.len();
        patterns.retain(|_, pattern| pattern.last_used >= cutoff);
        Ok((before - patterns.len()) as u64)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let patterns = self.patterns.read().await;
        Ok(patterns.len() as u64)
    }

    async fn max_frequency(&self) -> Result<u64, RepositoryError> {
        let patterns = self.patterns.read().await;
        Ok(patterns.values().map(|pattern| pattern.frequency).max().unwrap_or(0))
    }
}

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    lists: RwLock<Vec<CuttingList>>,
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn load_history(&self) -> Result<Vec<CuttingList>, RepositoryError> {
        let lists = self.lists.read().await;
        Ok(lists.clone())
    }

    async fn save_list(&self, list: &CuttingList) -> Result<(), RepositoryError> {
        let mut lists = self.lists.write().await;
        if let Some(existing) = lists.iter_mut().find(|candidate| candidate.id == list.id) {
            *existing = list.clone();
        } else {
            lists.push(list.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use cutplan_core::suggestions::{Pattern, ProfileObservation};

    use super::InMemoryPatternRepository;
    use crate::repositories::PatternRepository;

    fn observation() -> ProfileObservation {
        ProfileObservation {
            product_name: "Frame".to_string(),
            size: "200mm".to_string(),
            profile: Some("A".to_string()),
            measurement: "10mm".to_string(),
            quantity: 4,
            order_quantity: 2,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_upsert_round_trip() {
        let repo = InMemoryPatternRepository::default();
        let observation = observation();
        let key = observation.pattern_key().expect("key");

        let stored = repo
            .upsert(
                &key,
                Box::new(move |existing| {
                    let mut pattern =
                        existing.unwrap_or_else(|| Pattern::seed(&observation).expect("seed"));
                    pattern.observe(&observation);
                    pattern
                }),
            )
            .await
            .expect("upsert");

        assert_eq!(stored.frequency, 1);
        let found = repo.get(&key).await.expect("get");
        assert_eq!(found, Some(stored));
    }

    #[tokio::test]
    async fn concurrent_upserts_for_one_key_never_lose_updates() {
        use std::sync::Arc;

        let repo = Arc::new(InMemoryPatternRepository::default());
        let key = observation().pattern_key().expect("key");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let observation = observation();
                repo.upsert(
                    &key,
                    Box::new(move |existing| {
                        let mut pattern = existing
                            .unwrap_or_else(|| Pattern::seed(&observation).expect("seed"));
                        pattern.observe(&observation);
                        pattern
                    }),
                )
                .await
                .expect("upsert");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        let stored = repo.get(&key).await.expect("get").expect("pattern");
        assert_eq!(stored.frequency, 16);
        assert_eq!(stored.ratio_history.len(), 16);
    }
}
