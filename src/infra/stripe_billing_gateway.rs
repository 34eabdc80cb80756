use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::{
        BillingGateway, GatewaySubscriptionState, RenewalState, ScheduledCancellation,
    },
    domain::entities::subscription_record::ExternalSubscriptionId,
    infra::stripe_client::{StripeClient, StripeSubscription},
};

/// Metadata key checkout writes the purchasing account id under.
pub const ACCOUNT_METADATA_KEY: &str = "account_id";

/// Adapter that wraps StripeClient to implement BillingGateway.
#[derive(Clone)]
pub struct StripeBillingGateway {
    client: StripeClient,
}

impl StripeBillingGateway {
    pub fn new(client: StripeClient) -> Self {
        Self { client }
    }

    fn timestamp_to_datetime(ts: i64) -> AppResult<DateTime<Utc>> {
        Utc.timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| AppError::Internal(format!("Invalid Stripe timestamp: {}", ts)))
    }

    fn period_end(sub: &StripeSubscription) -> AppResult<DateTime<Utc>> {
        let ts = sub.period_end().ok_or_else(|| {
            AppError::Internal(format!("Stripe subscription {} has no period end", sub.id))
        })?;
        Self::timestamp_to_datetime(ts)
    }

    fn to_state(sub: &StripeSubscription) -> AppResult<GatewaySubscriptionState> {
        Ok(GatewaySubscriptionState {
            period_end: Self::period_end(sub)?,
            cancel_at_period_end: sub.cancel_at_period_end,
            canceled: matches!(sub.status.as_str(), "canceled" | "incomplete_expired"),
            account_reference: sub.metadata.get(ACCOUNT_METADATA_KEY).cloned(),
        })
    }
}

#[async_trait]
impl BillingGateway for StripeBillingGateway {
    async fn schedule_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<ScheduledCancellation> {
        let sub = self
            .client
            .set_cancel_at_period_end(subscription_id.as_str(), true)
            .await?;

        Ok(ScheduledCancellation {
            effective_at: Self::period_end(&sub)?,
        })
    }

    async fn cancel_scheduled_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<RenewalState> {
        let current = self.client.get_subscription(subscription_id.as_str()).await?;
        if !current.cancel_at_period_end {
            return Err(AppError::NotScheduled);
        }

        let sub = self
            .client
            .set_cancel_at_period_end(subscription_id.as_str(), false)
            .await?;

        Ok(RenewalState {
            renewing: !sub.cancel_at_period_end && sub.status != "canceled",
        })
    }

    async fn fetch_current_state(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<GatewaySubscriptionState> {
        let sub = self.client.get_subscription(subscription_id.as_str()).await?;
        Self::to_state(&sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(status: &str, cancel_at_period_end: bool) -> StripeSubscription {
        serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": status,
            "current_period_end": 1_738_281_600,
            "cancel_at_period_end": cancel_at_period_end,
            "metadata": { "account_id": "acct-1" }
        }))
        .unwrap()
    }

    #[test]
    fn maps_pending_subscription() {
        let state = StripeBillingGateway::to_state(&subscription("active", true)).unwrap();

        assert_eq!(state.period_end.timestamp(), 1_738_281_600);
        assert!(state.cancel_at_period_end);
        assert!(!state.canceled);
        assert_eq!(state.account_reference.as_deref(), Some("acct-1"));
    }

    #[test]
    fn maps_ended_subscription_to_canceled() {
        let state = StripeBillingGateway::to_state(&subscription("canceled", false)).unwrap();
        assert!(state.canceled);
    }
}
