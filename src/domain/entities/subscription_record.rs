use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::subscription_status::SubscriptionStatus;

/// Identifier assigned to a subscription by the billing gateway (e.g. `sub_...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalSubscriptionId(pub String);

impl ExternalSubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gateway ids are single path-safe tokens such as `sub_1Abc`.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl std::fmt::Display for ExternalSubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("status {0} requires an external subscription id")]
    MissingExternalId(SubscriptionStatus),
    #[error("status none must not carry an external subscription id")]
    UnexpectedExternalId,
    #[error("status none must not carry a period end")]
    UnexpectedPeriodEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot transition subscription from {from} to {to}")]
pub struct TransitionError {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
}

/// Persisted subscription state for one account.
///
/// `record_id` identifies the generation: a purchase after `Canceled` starts a
/// fresh generation instead of reusing the canceled one. `version` is the
/// optimistic-concurrency sequence maintained by the store; `0` means the
/// record has never been saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub record_id: Uuid,
    pub account_id: Uuid,
    pub external_subscription_id: Option<ExternalSubscriptionId>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl SubscriptionRecord {
    /// A freshly provisioned, never-saved record in `None`.
    pub fn provisioned(account_id: Uuid) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            account_id,
            external_subscription_id: None,
            status: SubscriptionStatus::None,
            current_period_end: None,
            last_synced_at: None,
            version: 0,
        }
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match (self.status, &self.external_subscription_id) {
            (SubscriptionStatus::None, Some(_)) => {
                return Err(InvariantViolation::UnexpectedExternalId);
            }
            (status, None) if status != SubscriptionStatus::None => {
                return Err(InvariantViolation::MissingExternalId(status));
            }
            _ => {}
        }
        if self.status == SubscriptionStatus::None && self.current_period_end.is_some() {
            return Err(InvariantViolation::UnexpectedPeriodEnd);
        }
        Ok(())
    }

    fn transition(&mut self, to: SubscriptionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `None -> Active` once the gateway has created a subscription.
    pub fn activate(
        &mut self,
        external_id: ExternalSubscriptionId,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(SubscriptionStatus::Active)?;
        self.external_subscription_id = Some(external_id);
        self.current_period_end = Some(period_end);
        self.last_synced_at = Some(now);
        Ok(())
    }

    /// `Active -> PendingCancellation`; the period end becomes the effective time.
    pub fn schedule_cancellation(
        &mut self,
        effective_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(SubscriptionStatus::PendingCancellation)?;
        self.current_period_end = Some(effective_at);
        self.last_synced_at = Some(now);
        Ok(())
    }

    /// `PendingCancellation -> Active`. The period in force is unchanged.
    pub fn reactivate(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(SubscriptionStatus::Active)?;
        self.last_synced_at = Some(now);
        Ok(())
    }

    /// Overwrite local state with gateway truth. This is a repair, not a
    /// user transition, so the edge table is not consulted.
    pub fn sync_from_gateway(
        &mut self,
        status: SubscriptionStatus,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.current_period_end = Some(period_end);
        self.last_synced_at = Some(now);
    }

    /// Start a new generation for the same account, carrying the version so the
    /// store can still detect concurrent writers against the old generation.
    pub fn next_generation(&self) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            version: self.version,
            ..Self::provisioned(self.account_id)
        }
    }
}
