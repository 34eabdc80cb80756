use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::ports::subscription_store::SubscriptionStore,
    domain::entities::{
        subscription_record::{ExternalSubscriptionId, SubscriptionRecord},
        subscription_status::SubscriptionStatus,
    },
};

fn row_to_record(row: &sqlx::postgres::PgRow) -> SubscriptionRecord {
    SubscriptionRecord {
        record_id: row.get("record_id"),
        account_id: row.get("account_id"),
        external_subscription_id: row
            .get::<Option<String>, _>("external_subscription_id")
            .map(ExternalSubscriptionId),
        status: row.get::<SubscriptionStatus, _>("status"),
        current_period_end: row.get("current_period_end"),
        last_synced_at: row.get("last_synced_at"),
        version: row.get("version"),
    }
}

const SELECT_COLS: &str = r#"
    record_id, account_id, external_subscription_id, status,
    current_period_end, last_synced_at, version
"#;

#[async_trait]
impl SubscriptionStore for PostgresPersistence {
    async fn get(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_records WHERE account_id = $1",
            SELECT_COLS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn save(&self, record: &SubscriptionRecord) -> AppResult<SubscriptionRecord> {
        let external_id = record
            .external_subscription_id
            .as_ref()
            .map(|id| id.as_str().to_string());

        if record.version == 0 {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO subscription_records
                    (account_id, record_id, external_subscription_id, status,
                     current_period_end, last_synced_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, 1)
                ON CONFLICT (account_id) DO NOTHING
                RETURNING {}
                "#,
                SELECT_COLS
            ))
            .bind(record.account_id)
            .bind(record.record_id)
            .bind(&external_id)
            .bind(record.status)
            .bind(record.current_period_end)
            .bind(record.last_synced_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
            return row.as_ref().map(row_to_record).ok_or(AppError::Conflict);
        }

        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        // Only archives when this write would also win the version check.
        sqlx::query(
            r#"
            INSERT INTO subscription_record_history
                (record_id, account_id, external_subscription_id, status,
                 current_period_end, last_synced_at, version)
            SELECT record_id, account_id, external_subscription_id, status,
                   current_period_end, last_synced_at, version
            FROM subscription_records
            WHERE account_id = $1 AND version = $2 AND record_id <> $3
            ON CONFLICT (record_id) DO NOTHING
            "#,
        )
        .bind(record.account_id)
        .bind(record.version)
        .bind(record.record_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE subscription_records
            SET record_id = $3,
                external_subscription_id = $4,
                status = $5,
                current_period_end = $6,
                last_synced_at = $7,
                version = version + 1,
                updated_at = now()
            WHERE account_id = $1 AND version = $2
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(record.account_id)
        .bind(record.version)
        .bind(record.record_id)
        .bind(&external_id)
        .bind(record.status)
        .bind(record.current_period_end)
        .bind(record.last_synced_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        match row {
            Some(row) => {
                tx.commit().await.map_err(AppError::from)?;
                Ok(row_to_record(&row))
            }
            None => {
                tx.rollback().await.map_err(AppError::from)?;
                tracing::debug!(
                    account_id = %record.account_id,
                    expected_version = record.version,
                    "Version check failed"
                );
                Err(AppError::Conflict)
            }
        }
    }

    async fn list_stale(
        &self,
        synced_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<SubscriptionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscription_records
            WHERE status IN ('active', 'pending_cancellation')
              AND (last_synced_at IS NULL OR last_synced_at < $1)
            ORDER BY last_synced_at ASC NULLS FIRST
            LIMIT $2
            "#,
            SELECT_COLS
        ))
        .bind(synced_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_record).collect())
    }
}
