use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use cutplan_core::config::{AppConfig, ConfigError, LoadOptions};
use cutplan_db::repositories::{
    HistoryRepository, PatternRepository, RepositoryError, SqlHistoryRepository,
    SqlPatternRepository,
};
use cutplan_db::{connect, migrations, CachedPatternRepository, DbPool};
use cutplan_engine::{
    spawn_learner, BatchExtractor, CorpusStats, LearnerHandle, OnlineLearner, RetentionSweeper,
    SuggestionService,
};

/// Everything the request handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<dyn HistoryRepository>,
    pub suggestions: Arc<SuggestionService>,
    pub extractor: Arc<BatchExtractor>,
    pub sweeper: Arc<RetentionSweeper>,
    pub learner: LearnerHandle,
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("pattern store read failed: {0}")]
    Store(#[source] RepositoryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let state = build_state(&config, &db_pool).await?;

    Ok(Application { config, db_pool, state })
}

async fn build_state(config: &AppConfig, db_pool: &DbPool) -> Result<AppState, BootstrapError> {
    let sql_patterns: Arc<dyn PatternRepository> =
        Arc::new(SqlPatternRepository::new(db_pool.clone()));
    let patterns: Arc<dyn PatternRepository> = Arc::new(CachedPatternRepository::new(
        sql_patterns,
        Duration::from_secs(config.engine.cache_ttl_secs),
    ));
    let history: Arc<dyn HistoryRepository> =
        Arc::new(SqlHistoryRepository::new(db_pool.clone()));

    // Prime the corpus max from whatever survived the last run.
    let corpus = Arc::new(CorpusStats::default());
    corpus.set(patterns.max_frequency().await.map_err(BootstrapError::Store)?);

    let learner = spawn_learner(
        OnlineLearner::new(
            patterns.clone(),
            corpus.clone(),
            Duration::from_secs(config.engine.learner_timeout_secs),
        ),
        config.engine.learner_queue_capacity,
    );

    Ok(AppState {
        history: history.clone(),
        suggestions: Arc::new(SuggestionService::new(
            patterns.clone(),
            Duration::from_secs(config.engine.query_timeout_secs),
        )),
        extractor: Arc::new(BatchExtractor::new(history, patterns.clone(), corpus.clone())),
        sweeper: Arc::new(RetentionSweeper::new(patterns, corpus, config.engine.retention_days)),
        learner,
    })
}

#[cfg(test)]
mod tests {
    use cutplan_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_engine() {
        let app = bootstrap(overrides("sqlite:file:bootstrap_smoke?mode=memory&cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('cutting_lists', 'cutting_list_items', 'suggestion_patterns')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 3);

        let stats = app.state.suggestions.statistics().await.expect("statistics");
        assert_eq!(stats.pattern_count, 0);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_on_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                retention_days: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;
        assert!(result.is_err());
    }
}
