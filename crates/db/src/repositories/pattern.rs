use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexSet;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::sync::Mutex;

use cutplan_core::suggestions::{Pattern, RatioObservation};

use super::{MergeFn, PatternRepository, RepositoryError};
use crate::DbPool;

/// SQLite-backed pattern store.
///
/// SQLite serializes writers, but the read half of an upsert would otherwise
/// race a concurrent writer for the same key. A per-key async mutex makes
/// the whole read-modify-write linearizable per `pattern_key` without
/// cross-key contention.
pub struct SqlPatternRepository {
    pool: DbPool,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SqlPatternRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, key_locks: Mutex::new(HashMap::new()) }
    }

    async fn key_lock(&self, pattern_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(pattern_key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drops the map entry once no other upsert holds a handle to it, so the
    /// lock map tracks in-flight keys rather than every key ever written.
    async fn release_key_lock(&self, pattern_key: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // Two handles left means the map entry plus ours; clones only happen
        // under the map lock, so the check cannot race a new waiter.
        if Arc::strong_count(lock) == 2 {
            locks.remove(pattern_key);
        }
    }

    #[cfg(test)]
    async fn key_lock_count(&self) -> usize {
        self.key_locks.lock().await.len()
    }

    async fn write(&self, pattern: &Pattern) -> Result<(), RepositoryError> {
        sqlx::query(UPSERT_SQL)
            .bind(&pattern.pattern_key)
            .bind(&pattern.context_key)
            .bind(&pattern.product_name)
            .bind(&pattern.size)
            .bind(&pattern.profile)
            .bind(&pattern.measurement)
            .bind(pattern.quantity)
            .bind(pattern.order_quantity)
            .bind(pattern.ratio)
            .bind(pattern.frequency as i64)
            .bind(pattern.total_quantity)
            .bind(pattern.total_order_quantity)
            .bind(encode_json(&pattern.contexts)?)
            .bind(encode_json(&pattern.variations)?)
            .bind(encode_json(&pattern.ratio_history)?)
            .bind(encode_timestamp(pattern.last_used))
            .bind(pattern.confidence)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO suggestion_patterns (
        pattern_key, context_key, product_name, size, profile, measurement,
        quantity, order_quantity, ratio, frequency,
        total_quantity, total_order_quantity,
        contexts_json, variations_json, ratio_history_json,
        last_used, confidence
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(pattern_key) DO UPDATE SET
        context_key = excluded.context_key,
        product_name = excluded.product_name,
        size = excluded.size,
        profile = excluded.profile,
        measurement = excluded.measurement,
        quantity = excluded.quantity,
        order_quantity = excluded.order_quantity,
        ratio = excluded.ratio,
        frequency = excluded.frequency,
        total_quantity = excluded.total_quantity,
        total_order_quantity = excluded.total_order_quantity,
        contexts_json = excluded.contexts_json,
        variations_json = excluded.variations_json,
        ratio_history_json = excluded.ratio_history_json,
        last_used = excluded.last_used,
        confidence = excluded.confidence
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT
        pattern_key, context_key, product_name, size, profile, measurement,
        quantity, order_quantity, ratio, frequency,
        total_quantity, total_order_quantity,
        contexts_json, variations_json, ratio_history_json,
        last_used, confidence
    FROM suggestion_patterns
"#;

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

fn pattern_from_row(row: &SqliteRow) -> Result<Pattern, RepositoryError> {
    let contexts_json: String = row.get("contexts_json");
    let variations_json: String = row.get("variations_json");
    let ratio_history_json: String = row.get("ratio_history_json");
    let last_used: String = row.get("last_used");
    let frequency: i64 = row.get("frequency");

    let contexts: IndexSet<String> = serde_json::from_str(&contexts_json)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let variations: IndexSet<String> = serde_json::from_str(&variations_json)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let ratio_history: Vec<RatioObservation> = serde_json::from_str(&ratio_history_json)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Pattern {
        pattern_key: row.get("pattern_key"),
        context_key: row.get("context_key"),
        product_name: row.get("product_name"),
        size: row.get("size"),
        profile: row.get("profile"),
        measurement: row.get("measurement"),
        quantity: row.get("quantity"),
        order_quantity: row.get("order_quantity"),
        ratio: row.get("ratio"),
        frequency: frequency.max(0) as u64,
        total_quantity: row.get("total_quantity"),
        total_order_quantity: row.get("total_order_quantity"),
        contexts,
        variations,
        ratio_history,
        last_used: decode_timestamp(&last_used)?,
        confidence: row.get("confidence"),
    })
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl PatternRepository for SqlPatternRepository {
    async fn upsert(&self, pattern_key: &str, merge: MergeFn) -> Result<Pattern, RepositoryError> {
        let lock = self.key_lock(pattern_key).await;
        let guard = lock.lock().await;

        let result = async {
            let existing = self.get(pattern_key).await?;
            let merged = merge(existing);
            self.write(&merged).await?;
            Ok(merged)
        }
        .await;

        drop(guard);
        self.release_key_lock(pattern_key, &lock).await;
        result
    }

    async fn get(&self, pattern_key: &str) -> Result<Option<Pattern>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE pattern_key = ?"))
            .bind(pattern_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|value| pattern_from_row(&value)).transpose()
    }

    async fn get_by_context(&self, context_key: &str) -> Result<Vec<Pattern>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE context_key = ? ORDER BY confidence DESC, frequency DESC"
        ))
        .bind(context_key)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pattern_from_row).collect()
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Pattern>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE pattern_key LIKE ? ESCAPE '\\' ORDER BY pattern_key"
        ))
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pattern_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY pattern_key"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(pattern_from_row).collect()
    }

    async fn save_batch(&self, patterns: &[Pattern]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for pattern in patterns {
            sqlx::query(UPSERT_SQL)
                .bind(&pattern.pattern_key)
                .bind(&pattern.context_key)
                .bind(&pattern.product_name)
                .bind(&pattern.size)
                .bind(&pattern.profile)
                .bind(&pattern.measurement)
                .bind(pattern.quantity)
                .bind(pattern.order_quantity)
                .bind(pattern.ratio)
                .bind(pattern.frequency as i64)
                .bind(pattern.total_quantity)
                .bind(pattern.total_order_quantity)
                .bind(encode_json(&pattern.contexts)?)
                .bind(encode_json(&pattern.variations)?)
                .bind(encode_json(&pattern.ratio_history)?)
                .bind(encode_timestamp(pattern.last_used))
                .bind(pattern.confidence)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM suggestion_patterns").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        // Timestamps are stored as fixed-precision RFC 3339 UTC strings, so
        // lexicographic comparison matches chronological order.
        let result = sqlx::query("DELETE FROM suggestion_patterns WHERE last_used < ?")
            .bind(encode_timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM suggestion_patterns")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn max_frequency(&self) -> Result<u64, RepositoryError> {
        let max: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(frequency), 0) FROM suggestion_patterns")
                .fetch_one(&self.pool)
                .await?;
        Ok(max.max(0) as u64)
    }
}
