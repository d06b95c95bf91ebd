//! Incremental learning from freshly recorded line items.
//!
//! Each profile entry becomes one per-key upsert: merge into the stored
//! pattern (or a fresh seed), rescore against the corpus max, persist. The
//! learning path is best-effort by contract — recording a cutting list must
//! never fail because learning did.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tracing::{debug, warn};

use cutplan_core::errors::ApplicationError;
use cutplan_core::suggestions::scoring;
use cutplan_core::suggestions::{LineItemObservation, Pattern};
use cutplan_db::repositories::PatternRepository;

use crate::corpus::CorpusStats;
use crate::persistence;

pub struct OnlineLearner {
    patterns: Arc<dyn PatternRepository>,
    corpus: Arc<CorpusStats>,
    upsert_timeout: Duration,
}

impl OnlineLearner {
    pub fn new(
        patterns: Arc<dyn PatternRepository>,
        corpus: Arc<CorpusStats>,
        upsert_timeout: Duration,
    ) -> Self {
        Self { patterns, corpus, upsert_timeout }
    }

    /// Fold one line item into the store, entry by entry. Invalid entries
    /// are skipped with a warning; their valid siblings still learn. Store
    /// failures and timeouts abort the remainder of the item.
    pub async fn learn(&self, item: LineItemObservation) -> Result<(), ApplicationError> {
        for observation in item.into_profile_observations() {
            if let Err(error) = observation.validate() {
                warn!(
                    event_name = "suggestions.learn.invalid_entry",
                    error = %error,
                    "skipping invalid profile entry"
                );
                continue;
            }

            let key = observation.pattern_key()?;
            let seeded = Pattern::seed(&observation)?;
            let corpus_snapshot = self.corpus.snapshot();
            let now = Utc::now();

            let merge = {
                let observation = observation.clone();
                Box::new(move |existing: Option<Pattern>| {
                    let mut pattern = existing.unwrap_or(seeded);
                    pattern.observe(&observation);
                    // The stored snapshot may lag behind this very pattern.
                    let corpus_max = corpus_snapshot.max(pattern.frequency);
                    scoring::rescore(&mut pattern, corpus_max, now);
                    pattern
                })
            };

            match timeout(self.upsert_timeout, self.patterns.upsert(&key, merge)).await {
                Ok(Ok(merged)) => {
                    self.corpus.raise(merged.frequency);
                    debug!(
                        event_name = "suggestions.learn.merged",
                        pattern_key = %merged.pattern_key,
                        frequency = merged.frequency,
                        confidence = merged.confidence,
                        "observation folded into pattern"
                    );
                }
                Ok(Err(error)) => return Err(persistence(error)),
                Err(_) => {
                    return Err(ApplicationError::Persistence(format!(
                        "pattern upsert for `{key}` timed out after {}s",
                        self.upsert_timeout.as_secs()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Cheap, cloneable submission side of the learning queue.
#[derive(Clone)]
pub struct LearnerHandle {
    tx: mpsc::Sender<LineItemObservation>,
}

impl LearnerHandle {
    /// Fire-and-forget enqueue. A full queue drops the observation with a
    /// warning; the caller's write path is never blocked.
    pub fn submit(&self, item: LineItemObservation) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    event_name = "suggestions.learn.queue_full",
                    "learning queue full, observation dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    event_name = "suggestions.learn.queue_closed",
                    "learning worker gone, observation dropped"
                );
            }
        }
    }
}

/// Start the learning worker and return its submission handle. Failures are
/// logged and swallowed inside the worker so one bad item never stalls the
/// queue.
pub fn spawn_learner(learner: OnlineLearner, queue_capacity: usize) -> LearnerHandle {
    let (tx, mut rx) = mpsc::channel::<LineItemObservation>(queue_capacity);
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if let Err(error) = learner.learn(item).await {
                warn!(
                    event_name = "suggestions.learn.failed",
                    error = %error,
                    "discarding observation after learning failure"
                );
            }
        }
    });
    LearnerHandle { tx }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use cutplan_core::domain::cutting_list::CuttingListItem;
    use cutplan_core::suggestions::LineItemObservation;
    use cutplan_db::repositories::{InMemoryPatternRepository, PatternRepository};

    use super::{spawn_learner, OnlineLearner};
    use crate::corpus::CorpusStats;

    fn line_item(order_quantity: i64, quantity: i64) -> LineItemObservation {
        LineItemObservation {
            product_name: "Frame".to_string(),
            size: "200mm".to_string(),
            order_quantity,
            observed_at: Utc::now(),
            entries: vec![CuttingListItem {
                profile: Some("A".to_string()),
                measurement: "10mm".to_string(),
                quantity,
            }],
        }
    }

    fn learner(
        patterns: Arc<InMemoryPatternRepository>,
        corpus: Arc<CorpusStats>,
    ) -> OnlineLearner {
        OnlineLearner::new(patterns, corpus, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn learning_is_additive_across_observations() {
        let patterns = Arc::new(InMemoryPatternRepository::default());
        let corpus = Arc::new(CorpusStats::default());
        let learner = learner(patterns.clone(), corpus.clone());

        learner.learn(line_item(10, 5)).await.expect("first");
        learner.learn(line_item(20, 8)).await.expect("second");

        let stored =
            patterns.get("FRAME|200MM|A|10mm").await.expect("get").expect("pattern exists");
        assert_eq!(stored.frequency, 2);
        assert_eq!(stored.total_quantity, 13);
        assert_eq!(stored.total_order_quantity, 30);
        assert_eq!(stored.ratio_history.len(), 2);
        assert!((stored.average_ratio() - 13.0 / 30.0).abs() < 1e-9);
        assert!(stored.confidence > 0.0);
        assert_eq!(corpus.snapshot(), 2);
    }

    #[tokio::test]
    async fn invalid_entries_do_not_block_valid_siblings() {
        let patterns = Arc::new(InMemoryPatternRepository::default());
        let learner = learner(patterns.clone(), Arc::new(CorpusStats::default()));

        let mut item = line_item(2, 4);
        item.entries.push(CuttingListItem {
            profile: Some("B".to_string()),
            measurement: "  ".to_string(),
            quantity: 3,
        });
        item.entries.push(CuttingListItem {
            profile: Some("C".to_string()),
            measurement: "40mm".to_string(),
            quantity: 2,
        });

        learner.learn(item).await.expect("learn");
        assert_eq!(patterns.count().await.expect("count"), 2);
        assert!(patterns.get("FRAME|200MM|C|40mm").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn confidence_uses_the_raised_corpus_max() {
        let patterns = Arc::new(InMemoryPatternRepository::default());
        let corpus = Arc::new(CorpusStats::new(4));
        let learner = learner(patterns.clone(), corpus.clone());

        learner.learn(line_item(2, 4)).await.expect("learn");

        let stored =
            patterns.get("FRAME|200MM|A|10mm").await.expect("get").expect("pattern exists");
        // frequency 1 of corpus max 4 -> 10, fresh recency -> ~30, one
        // context -> 10.
        assert!((stored.confidence - 50.0).abs() < 0.5);
        assert_eq!(corpus.snapshot(), 4);
    }

    #[tokio::test]
    async fn worker_drains_submitted_items() {
        let patterns = Arc::new(InMemoryPatternRepository::default());
        let handle =
            spawn_learner(learner(patterns.clone(), Arc::new(CorpusStats::default())), 8);

        handle.submit(line_item(2, 4));

        for _ in 0..100 {
            if patterns.count().await.expect("count") == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("learning worker never processed the submitted item");
    }
}
