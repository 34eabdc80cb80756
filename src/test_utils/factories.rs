//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid record with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    application::ports::billing_gateway::GatewaySubscriptionState,
    domain::entities::{
        subscription_record::{ExternalSubscriptionId, SubscriptionRecord},
        subscription_status::SubscriptionStatus,
    },
};

/// Fixed timestamp for deterministic tests.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// End of the default billing period used by the factories.
pub fn test_period_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap()
}

/// A persisted record in `None` (version 1).
pub fn create_test_record(overrides: impl FnOnce(&mut SubscriptionRecord)) -> SubscriptionRecord {
    let mut record = SubscriptionRecord {
        version: 1,
        ..SubscriptionRecord::provisioned(Uuid::new_v4())
    };
    overrides(&mut record);
    record
}

/// A persisted `Active` record tracking `sub_1`.
pub fn create_active_record(
    overrides: impl FnOnce(&mut SubscriptionRecord),
) -> SubscriptionRecord {
    create_test_record(|r| {
        r.status = SubscriptionStatus::Active;
        r.external_subscription_id = Some(ExternalSubscriptionId::new("sub_1"));
        r.current_period_end = Some(test_period_end());
        r.last_synced_at = Some(test_datetime());
        overrides(r);
    })
}

/// A persisted `PendingCancellation` record tracking `sub_1`.
pub fn create_pending_record(
    overrides: impl FnOnce(&mut SubscriptionRecord),
) -> SubscriptionRecord {
    create_active_record(|r| {
        r.status = SubscriptionStatus::PendingCancellation;
        overrides(r);
    })
}

/// Gateway snapshot of a renewing subscription.
pub fn create_gateway_state(
    overrides: impl FnOnce(&mut GatewaySubscriptionState),
) -> GatewaySubscriptionState {
    let mut state = GatewaySubscriptionState {
        period_end: test_period_end(),
        cancel_at_period_end: false,
        canceled: false,
        account_reference: None,
    };
    overrides(&mut state);
    state
}
