use std::sync::Arc;

use crate::commands::CommandResult;
use cutplan_core::config::{AppConfig, LoadOptions};
use cutplan_db::repositories::{
    HistoryRepository, PatternRepository, SqlHistoryRepository, SqlPatternRepository,
};
use cutplan_db::{connect, migrations};
use cutplan_engine::{BatchExtractor, CorpusStats};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "reseed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "reseed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let history: Arc<dyn HistoryRepository> =
            Arc::new(SqlHistoryRepository::new(pool.clone()));
        let patterns: Arc<dyn PatternRepository> =
            Arc::new(SqlPatternRepository::new(pool.clone()));
        let extractor = BatchExtractor::new(history, patterns, Arc::new(CorpusStats::default()));

        let report =
            extractor.reseed().await.map_err(|error| ("extraction", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success(
            "reseed",
            format!(
                "reseeded {} patterns from {} cutting lists ({} items skipped, max frequency {})",
                report.pattern_count,
                report.list_count,
                report.skipped_items,
                report.corpus_max_frequency
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("reseed", error_class, message, exit_code)
        }
    }
}
