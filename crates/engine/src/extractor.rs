//! Full rebuild of the pattern store from cutting-list history.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use cutplan_core::errors::ApplicationError;
use cutplan_core::suggestions::extract::{fold_history, score_folded};
use cutplan_core::suggestions::BATCH_WRITE_SIZE;
use cutplan_db::repositories::{HistoryRepository, PatternRepository};

use crate::corpus::CorpusStats;
use crate::persistence;

/// Outcome of one reseed run, for operator-facing reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub list_count: u64,
    pub pattern_count: u64,
    pub skipped_items: u64,
    pub corpus_max_frequency: u64,
}

/// Rebuilds the pattern store from scratch: fold the full history, score the
/// corpus once against its own max frequency, then clear and rewrite the
/// store in batches.
pub struct BatchExtractor {
    history: Arc<dyn HistoryRepository>,
    patterns: Arc<dyn PatternRepository>,
    corpus: Arc<CorpusStats>,
}

impl BatchExtractor {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        patterns: Arc<dyn PatternRepository>,
        corpus: Arc<CorpusStats>,
    ) -> Self {
        Self { history, patterns, corpus }
    }

    /// Clear-and-rewrite reseed. The store is verified after the rewrite: a
    /// count mismatch fails the run rather than leaving a silently short
    /// corpus behind.
    pub async fn reseed(&self) -> Result<ExtractionReport, ApplicationError> {
        let lists = self.history.load_history().await.map_err(persistence)?;
        let folded = fold_history(&lists);
        if folded.skipped_items > 0 {
            warn!(
                event_name = "suggestions.extract.skipped_items",
                skipped = folded.skipped_items,
                "historical line items failed validation and were skipped"
            );
        }
        let corpus = score_folded(folded, Utc::now());

        self.patterns.delete_all().await.map_err(persistence)?;
        for chunk in corpus.patterns.chunks(BATCH_WRITE_SIZE) {
            self.patterns.save_batch(chunk).await.map_err(persistence)?;
        }

        let expected = corpus.patterns.len() as u64;
        let actual = self.patterns.count().await.map_err(persistence)?;
        if actual != expected {
            return Err(ApplicationError::Consistency { expected, actual });
        }

        self.corpus.set(corpus.max_frequency);

        let report = ExtractionReport {
            list_count: lists.len() as u64,
            pattern_count: expected,
            skipped_items: corpus.skipped_items,
            corpus_max_frequency: corpus.max_frequency,
        };
        info!(
            event_name = "suggestions.extract.completed",
            list_count = report.list_count,
            pattern_count = report.pattern_count,
            skipped_items = report.skipped_items,
            corpus_max_frequency = report.corpus_max_frequency,
            "pattern store reseeded from history"
        );
        Ok(report)
    }
}
