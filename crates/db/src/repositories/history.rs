use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use cutplan_core::domain::cutting_list::{CuttingList, CuttingListId, CuttingListItem};

use super::{HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

#[async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn load_history(&self) -> Result<Vec<CuttingList>, RepositoryError> {
        let list_rows = sqlx::query(
            "SELECT id, product_name, size, order_quantity, created_at \
             FROM cutting_lists ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let item_rows = sqlx::query(
            "SELECT cutting_list_id, profile, measurement, quantity \
             FROM cutting_list_items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_list: HashMap<String, Vec<CuttingListItem>> = HashMap::new();
        for row in &item_rows {
            let list_id: String = row.get("cutting_list_id");
            items_by_list.entry(list_id).or_default().push(CuttingListItem {
                profile: row.get("profile"),
                measurement: row.get("measurement"),
                quantity: row.get("quantity"),
            });
        }

        list_rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let created_at: String = row.get("created_at");
                Ok(CuttingList {
                    items: items_by_list.remove(&id).unwrap_or_default(),
                    id: CuttingListId(id),
                    product_name: row.get("product_name"),
                    size: row.get("size"),
                    order_quantity: row.get("order_quantity"),
                    created_at: decode_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn save_list(&self, list: &CuttingList) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO cutting_lists (id, product_name, size, order_quantity, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                product_name = excluded.product_name, \
                size = excluded.size, \
                order_quantity = excluded.order_quantity, \
                created_at = excluded.created_at",
        )
        .bind(&list.id.0)
        .bind(&list.product_name)
        .bind(&list.size)
        .bind(list.order_quantity)
        .bind(list.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cutting_list_items WHERE cutting_list_id = ?")
            .bind(&list.id.0)
            .execute(&mut *tx)
            .await?;

        for item in &list.items {
            sqlx::query(
                "INSERT INTO cutting_list_items (cutting_list_id, profile, measurement, quantity) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&list.id.0)
            .bind(&item.profile)
            .bind(&item.measurement)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
