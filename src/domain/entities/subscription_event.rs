//! Domain events emitted by user-initiated subscription transitions.
//!
//! Events are named in past tense. Reconciliation is a repair and never emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::subscription_status::SubscriptionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Activated,
    CancellationScheduled,
    Reactivated,
}

impl SubscriptionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEventKind::Activated => "activated",
            SubscriptionEventKind::CancellationScheduled => "cancellation_scheduled",
            SubscriptionEventKind::Reactivated => "reactivated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub event_id: Uuid,
    pub account_id: Uuid,
    pub record_id: Uuid,
    pub kind: SubscriptionEventKind,
    /// Record version the transition started from. Together with `record_id`
    /// and `kind` it identifies one transition, so concurrent requests that
    /// both drove it publish it once.
    pub source_version: i64,
    pub previous_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
    /// Only set for `CancellationScheduled`.
    pub effective_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

impl SubscriptionEvent {
    fn new(
        kind: SubscriptionEventKind,
        account_id: Uuid,
        record_id: Uuid,
        source_version: i64,
        previous_status: SubscriptionStatus,
        new_status: SubscriptionStatus,
        effective_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            account_id,
            record_id,
            kind,
            source_version,
            previous_status,
            new_status,
            effective_at,
            occurred_at: Utc::now(),
        }
    }

    pub fn cancellation_scheduled(
        account_id: Uuid,
        record_id: Uuid,
        source_version: i64,
        effective_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            SubscriptionEventKind::CancellationScheduled,
            account_id,
            record_id,
            source_version,
            SubscriptionStatus::Active,
            SubscriptionStatus::PendingCancellation,
            Some(effective_at),
        )
    }

    pub fn reactivated(account_id: Uuid, record_id: Uuid, source_version: i64) -> Self {
        Self::new(
            SubscriptionEventKind::Reactivated,
            account_id,
            record_id,
            source_version,
            SubscriptionStatus::PendingCancellation,
            SubscriptionStatus::Active,
            None,
        )
    }

    /// `previous_status` is `None` or `Canceled`; `new_status` is
    /// `PendingCancellation` when the purchase was already set not to renew.
    pub fn activated(
        account_id: Uuid,
        record_id: Uuid,
        source_version: i64,
        previous_status: SubscriptionStatus,
        new_status: SubscriptionStatus,
    ) -> Self {
        Self::new(
            SubscriptionEventKind::Activated,
            account_id,
            record_id,
            source_version,
            previous_status,
            new_status,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_event_carries_effective_time() {
        let effective_at = Utc::now();
        let event = SubscriptionEvent::cancellation_scheduled(
            Uuid::new_v4(),
            Uuid::new_v4(),
            4,
            effective_at,
        );

        assert_eq!(event.kind, SubscriptionEventKind::CancellationScheduled);
        assert_eq!(event.source_version, 4);
        assert_eq!(event.previous_status, SubscriptionStatus::Active);
        assert_eq!(event.effective_at, Some(effective_at));
    }
}
