use std::sync::Arc;

use crate::commands::CommandResult;
use cutplan_core::config::{AppConfig, LoadOptions};
use cutplan_db::repositories::{PatternRepository, SqlPatternRepository};
use cutplan_db::{connect, migrations};
use cutplan_engine::{CorpusStats, RetentionSweeper};

pub fn run(days: Option<u32>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "cleanup",
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
                "cleanup",
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

        let patterns: Arc<dyn PatternRepository> =
            Arc::new(SqlPatternRepository::new(pool.clone()));
        let sweeper = RetentionSweeper::new(
            patterns,
            Arc::new(CorpusStats::default()),
            config.engine.retention_days,
        );

        let report =
            sweeper.cleanup(days).await.map_err(|error| ("sweep", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success(
            "cleanup",
            format!(
                "deleted {} patterns older than {} days ({} remaining)",
                report.deleted, report.retention_days, report.remaining
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("cleanup", error_class, message, exit_code)
        }
    }
}
