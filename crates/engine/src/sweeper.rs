//! Retention sweep for stale patterns.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use cutplan_core::errors::{ApplicationError, DomainError};
use cutplan_db::repositories::PatternRepository;

use crate::corpus::CorpusStats;
use crate::persistence;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub deleted: u64,
    pub remaining: u64,
    pub retention_days: u32,
}

/// Deletes patterns whose `last_used` fell behind the retention window, then
/// recounts the corpus max so confidence denominators shrink with the corpus.
pub struct RetentionSweeper {
    patterns: Arc<dyn PatternRepository>,
    corpus: Arc<CorpusStats>,
    default_retention_days: u32,
}

impl RetentionSweeper {
    pub fn new(
        patterns: Arc<dyn PatternRepository>,
        corpus: Arc<CorpusStats>,
        default_retention_days: u32,
    ) -> Self {
        Self { patterns, corpus, default_retention_days }
    }

    /// Sweep with an optional per-call window; `None` uses the configured
    /// default. Zero matches is a normal outcome.
    pub async fn cleanup(&self, days: Option<u32>) -> Result<SweepReport, ApplicationError> {
        let retention_days = days.unwrap_or(self.default_retention_days);
        if retention_days == 0 {
            return Err(DomainError::InvariantViolation(
                "retention window must be at least one day".to_string(),
            )
            .into());
        }

        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let deleted = self.patterns.delete_unused_before(cutoff).await.map_err(persistence)?;
        let remaining = self.patterns.count().await.map_err(persistence)?;
        let max_frequency = self.patterns.max_frequency().await.map_err(persistence)?;
        self.corpus.set(max_frequency);

        info!(
            event_name = "suggestions.sweep.completed",
            deleted,
            remaining,
            retention_days,
            corpus_max_frequency = max_frequency,
            "retention sweep finished"
        );
        Ok(SweepReport { deleted, remaining, retention_days })
    }
}
