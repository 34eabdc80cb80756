use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::use_cases::subscription_lifecycle::SubscriptionLifecycleUseCases;

/// Periodically repairs records that drifted from the gateway, e.g. after a
/// gateway change was confirmed but the local write lost every retry.
pub async fn run_reconciliation_loop(
    lifecycle: Arc<SubscriptionLifecycleUseCases>,
    every: Duration,
    stale_after: chrono::Duration,
    batch_size: i64,
) {
    let mut ticker = interval(every);

    info!(
        "Subscription reconciliation started (every {}s, stale after {}s)",
        every.as_secs(),
        stale_after.num_seconds()
    );

    loop {
        ticker.tick().await;

        if let Err(e) = lifecycle.reconcile_stale(stale_after, batch_size).await {
            error!(error = ?e, "Failed to list stale subscription records");
        }
    }
}
