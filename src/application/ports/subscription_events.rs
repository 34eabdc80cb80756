use async_trait::async_trait;

use crate::{app_error::AppResult, domain::entities::subscription_event::SubscriptionEvent};

/// Emission contract for notification collaborators (email, analytics).
///
/// Publishing happens after the transition is committed. A publish failure is
/// logged by the caller and does not undo the transition.
#[async_trait]
pub trait SubscriptionEventPublisher: Send + Sync {
    async fn publish(&self, event: &SubscriptionEvent) -> AppResult<()>;
}
