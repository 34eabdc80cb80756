use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::ports::subscription_events::SubscriptionEventPublisher,
    domain::entities::subscription_event::SubscriptionEvent,
};

/// Events land in the `subscription_events` outbox, where notification
/// collaborators pick them up. A transition already in the outbox is ignored.
#[async_trait]
impl SubscriptionEventPublisher for PostgresPersistence {
    async fn publish(&self, event: &SubscriptionEvent) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_events
                (event_id, account_id, record_id, kind, source_version,
                 previous_status, new_status, effective_at, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event.event_id)
        .bind(event.account_id)
        .bind(event.record_id)
        .bind(event.kind)
        .bind(event.source_version)
        .bind(event.previous_status)
        .bind(event.new_status)
        .bind(event.effective_at)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                record_id = %event.record_id,
                kind = event.kind.as_str(),
                source_version = event.source_version,
                "Transition already published"
            );
            return Ok(());
        }

        tracing::info!(
            account_id = %event.account_id,
            record_id = %event.record_id,
            kind = event.kind.as_str(),
            "Subscription event published"
        );
        Ok(())
    }
}
