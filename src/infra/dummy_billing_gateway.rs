use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_gateway::{
        BillingGateway, GatewaySubscriptionState, RenewalState, ScheduledCancellation,
    },
    domain::entities::subscription_record::ExternalSubscriptionId,
};

pub const DUMMY_SUBSCRIPTION_PREFIX: &str = "dummy_sub_";
const DUMMY_PERIOD_DAYS: i64 = 30;

/// Dummy billing gateway for local development.
///
/// Simulates subscription state in memory without any external API calls.
/// Ids with the `dummy_sub_` prefix come into existence on first use with a
/// 30-day period; anything else is rejected as unknown.
#[derive(Default)]
pub struct DummyBillingGateway {
    subscriptions: Mutex<HashMap<String, GatewaySubscriptionState>>,
}

impl DummyBillingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_subscription<T>(
        &self,
        subscription_id: &ExternalSubscriptionId,
        f: impl FnOnce(&mut GatewaySubscriptionState) -> AppResult<T>,
    ) -> AppResult<T> {
        let id = subscription_id.as_str();
        if !id.starts_with(DUMMY_SUBSCRIPTION_PREFIX) {
            return Err(AppError::GatewayRejected(format!(
                "No such subscription: {}",
                id
            )));
        }

        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| AppError::Internal("dummy gateway lock poisoned".into()))?;
        let state = subscriptions
            .entry(id.to_string())
            .or_insert_with(|| GatewaySubscriptionState {
                period_end: Utc::now() + Duration::days(DUMMY_PERIOD_DAYS),
                cancel_at_period_end: false,
                canceled: false,
                account_reference: None,
            });
        f(state)
    }
}

#[async_trait]
impl BillingGateway for DummyBillingGateway {
    async fn schedule_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<ScheduledCancellation> {
        self.with_subscription(subscription_id, |state| {
            if state.canceled {
                return Err(AppError::GatewayRejected("Subscription is canceled".into()));
            }
            state.cancel_at_period_end = true;
            Ok(ScheduledCancellation {
                effective_at: state.period_end,
            })
        })
    }

    async fn cancel_scheduled_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<RenewalState> {
        self.with_subscription(subscription_id, |state| {
            if !state.cancel_at_period_end {
                return Err(AppError::NotScheduled);
            }
            state.cancel_at_period_end = false;
            Ok(RenewalState { renewing: true })
        })
    }

    async fn fetch_current_state(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<GatewaySubscriptionState> {
        self.with_subscription(subscription_id, |state| Ok(state.clone()))
    }
}
