use std::sync::Arc;
use std::time::Duration;

use crate::commands::CommandResult;
use cutplan_core::config::{AppConfig, LoadOptions};
use cutplan_db::repositories::{PatternRepository, SqlPatternRepository};
use cutplan_db::{connect, migrations};
use cutplan_engine::SuggestionService;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "stats",
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
                "stats",
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
        let service = SuggestionService::new(
            patterns,
            Duration::from_secs(config.engine.query_timeout_secs),
        );

        let stats =
            service.statistics().await.map_err(|error| ("query", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(stats)
    });

    match result {
        Ok(stats) => CommandResult::success(
            "stats",
            format!(
                "{} patterns, average confidence {:.2}, {} products, {} contexts, max frequency {}",
                stats.pattern_count,
                stats.average_confidence,
                stats.distinct_products,
                stats.distinct_contexts,
                stats.max_frequency
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("stats", error_class, message, exit_code)
        }
    }
}
