use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use cutplan_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens a pool with the pragmas the engine relies on: foreign keys for the
/// cutting-list item cascade, WAL so suggestion reads do not block learner
/// writes, and the configured busy timeout for writer contention.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = config.busy_timeout_ms;
    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}

/// Test-oriented shorthand; everything not passed explicitly comes from the
/// `DatabaseConfig` defaults.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    connect(&DatabaseConfig {
        url: database_url.to_string(),
        max_connections,
        timeout_secs,
        ..DatabaseConfig::default()
    })
    .await
}

#[cfg(test)]
mod tests {
    use cutplan_core::config::DatabaseConfig;

    use super::connect;

    #[tokio::test]
    async fn configured_busy_timeout_reaches_the_connection() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
            busy_timeout_ms: 250,
        };
        let pool = connect(&config).await.expect("connect");

        let timeout: i64 =
            sqlx::query_scalar("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(timeout, 250);
    }
}
