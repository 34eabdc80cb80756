use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    app_error::AppResult, domain::entities::subscription_record::ExternalSubscriptionId,
};

// ============================================================================
// Port Types - Provider-agnostic gateway results
// ============================================================================

/// Result of scheduling a cancellation at period end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledCancellation {
    /// When the subscription stops renewing (end of the current period).
    pub effective_at: DateTime<Utc>,
}

/// Result of undoing a scheduled cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenewalState {
    pub renewing: bool,
}

/// Read-only snapshot of a subscription at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewaySubscriptionState {
    pub period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    /// The gateway has ended the subscription; it will never renew.
    pub canceled: bool,
    /// Account id recorded in the gateway's metadata when checkout created the
    /// subscription, if any.
    pub account_reference: Option<String>,
}

// ============================================================================
// Billing Gateway Port
// ============================================================================

/// Billing gateway port - abstracts the payment processor's subscription API.
///
/// Every operation may fail with `AppError::GatewayUnavailable` (transient)
/// or `AppError::GatewayRejected` (permanent).
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Stop renewal at the end of the current period.
    ///
    /// Idempotent: an already scheduled cancellation returns the same
    /// effective time without error.
    async fn schedule_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<ScheduledCancellation>;

    /// Resume renewal. Fails with `AppError::NotScheduled` when no
    /// cancellation was pending.
    async fn cancel_scheduled_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<RenewalState>;

    /// Reconciliation probe; never mutates gateway state.
    async fn fetch_current_state(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<GatewaySubscriptionState>;
}
