use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::subscription_record::SubscriptionRecord};

/// Durable account -> subscription record mapping with optimistic concurrency.
///
/// No other component may mutate persisted subscription state.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// `Ok(None)` means the account has no record. Query failures are errors,
    /// never an empty result.
    async fn get(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>>;

    /// Compare-and-swap on `record.version`.
    ///
    /// - version `0` inserts; fails with `AppError::Conflict` if a record exists.
    /// - otherwise updates only if the stored version equals `record.version`,
    ///   else fails with `AppError::Conflict`.
    /// - when `record.record_id` differs from the stored generation, the stored
    ///   generation is archived as part of the same write.
    ///
    /// Returns the saved record carrying its new version.
    async fn save(&self, record: &SubscriptionRecord) -> AppResult<SubscriptionRecord>;

    /// Live records (active or pending cancellation) never synced, or last
    /// synced before `synced_before`, oldest first.
    async fn list_stale(
        &self,
        synced_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<SubscriptionRecord>>;
}
