use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_gateway::{BillingGateway, GatewaySubscriptionState},
        subscription_events::SubscriptionEventPublisher,
        subscription_store::SubscriptionStore,
    },
    domain::entities::{
        subscription_event::SubscriptionEvent,
        subscription_record::{ExternalSubscriptionId, SubscriptionRecord, TransitionError},
        subscription_status::SubscriptionStatus,
    },
};

// ============================================================================
// Outcome Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationOutcome {
    pub effective_at: chrono::DateTime<Utc>,
    /// The cancellation was already pending before this call; it did not move
    /// the gateway.
    pub already_scheduled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactivationOutcome {
    Renewing,
    AlreadyRenewing,
}

impl ReactivationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactivationOutcome::Renewing => "renewing",
            ReactivationOutcome::AlreadyRenewing => "already-renewing",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub examined: usize,
    /// Records whose status or period end differed from the gateway.
    pub repaired: usize,
    pub failed: usize,
}

/// Bounds for the two retry loops and the gateway call timeout.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub store_max_attempts: u32,
    pub gateway_max_attempts: u32,
    pub gateway_backoff: Duration,
    pub gateway_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            store_max_attempts: 3,
            gateway_max_attempts: 3,
            gateway_backoff: Duration::from_millis(200),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

const MAX_GATEWAY_BACKOFF: Duration = Duration::from_secs(5);

/// What a re-applied transition decided for the freshly read record.
enum Step<T> {
    Write(T),
    Skip(T),
}

struct Committed<T> {
    record: SubscriptionRecord,
    value: T,
    written: bool,
}

fn not_allowed(err: TransitionError) -> AppError {
    tracing::debug!(from = %err.from, to = %err.to, "Transition rejected");
    AppError::NoSubscription
}

/// Gateway truth expressed as a local status.
fn status_from_gateway(state: &GatewaySubscriptionState) -> SubscriptionStatus {
    if state.canceled {
        SubscriptionStatus::Canceled
    } else if state.cancel_at_period_end {
        SubscriptionStatus::PendingCancellation
    } else {
        SubscriptionStatus::Active
    }
}

/// Delay before retry number `attempt` (1-based): exponential from `base`,
/// capped, plus up to a quarter of `base` in jitter.
pub fn gateway_backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let capped = exponential.min(MAX_GATEWAY_BACKOFF);
    let jitter_ms = (base.as_millis() / 4) as u64;
    if jitter_ms == 0 {
        return capped;
    }
    capped + Duration::from_millis(rand::random::<u64>() % jitter_ms)
}

fn same_external_id(record: &SubscriptionRecord, external_id: &ExternalSubscriptionId) -> bool {
    record.external_subscription_id.as_ref() == Some(external_id)
}

// ============================================================================
// Use Cases
// ============================================================================

/// Subscription lifecycle state machine.
///
/// Same-account safety relies only on the store's version check: every write
/// re-reads and re-applies on conflict. Records are only mutated after the
/// gateway confirmed the change. User transitions call the gateway at most
/// once (plus transient retries of that same call); reconciliation re-reads
/// the gateway whenever the record changed under it.
#[derive(Clone)]
pub struct SubscriptionLifecycleUseCases {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
    events: Arc<dyn SubscriptionEventPublisher>,
    policy: RetryPolicy,
}

impl SubscriptionLifecycleUseCases {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn BillingGateway>,
        events: Arc<dyn SubscriptionEventPublisher>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            policy,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Return the account's record, creating a `None` record on first use.
    #[instrument(skip(self))]
    pub async fn provision(&self, account_id: Uuid) -> AppResult<SubscriptionRecord> {
        if let Some(record) = self.store.get(account_id).await? {
            return Ok(record);
        }

        match self
            .store
            .save(&SubscriptionRecord::provisioned(account_id))
            .await
        {
            Ok(record) => {
                info!(%account_id, "Provisioned subscription record");
                Ok(record)
            }
            // A concurrent request provisioned first.
            Err(AppError::Conflict) => self.store.get(account_id).await?.ok_or_else(|| {
                AppError::Internal("record vanished after provisioning conflict".into())
            }),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_subscription(&self, account_id: Uuid) -> AppResult<SubscriptionRecord> {
        self.provision(account_id).await
    }

    // ========================================================================
    // User-initiated transitions
    // ========================================================================

    /// Schedule cancellation at period end. Only valid from `Active`; repeating
    /// it while `PendingCancellation` returns the existing effective time.
    #[instrument(skip(self))]
    pub async fn request_cancellation(&self, account_id: Uuid) -> AppResult<CancellationOutcome> {
        let record = self
            .store
            .get(account_id)
            .await?
            .ok_or(AppError::NoSubscription)?;

        match record.status {
            SubscriptionStatus::PendingCancellation => {
                if let Some(effective_at) = record.current_period_end {
                    info!(%account_id, %effective_at, "Cancellation already scheduled");
                    return Ok(CancellationOutcome {
                        effective_at,
                        already_scheduled: true,
                    });
                }
            }
            SubscriptionStatus::Active => {}
            status => {
                info!(%account_id, %status, "Cancellation requested without active subscription");
                return Err(AppError::NoSubscription);
            }
        }

        let external_id = record
            .external_subscription_id
            .clone()
            .ok_or_else(|| AppError::Internal("live record without external id".into()))?;

        let scheduled = self
            .call_gateway("schedule_cancellation", account_id, || {
                self.gateway.schedule_cancellation(&external_id)
            })
            .await?;
        let effective_at = scheduled.effective_at;
        let source_version = record.version;
        let scheduled_from_active = record.status == SubscriptionStatus::Active;

        let committed = self
            .persist(account_id, record, |fresh| {
                if !same_external_id(fresh, &external_id) {
                    return Err(AppError::Conflict);
                }
                match fresh.status {
                    SubscriptionStatus::Active => {
                        fresh
                            .schedule_cancellation(effective_at, Utc::now())
                            .map_err(not_allowed)?;
                        Ok(Step::Write(false))
                    }
                    SubscriptionStatus::PendingCancellation
                        if fresh.current_period_end.is_none() =>
                    {
                        fresh.current_period_end = Some(effective_at);
                        fresh.last_synced_at = Some(Utc::now());
                        Ok(Step::Write(true))
                    }
                    SubscriptionStatus::PendingCancellation => Ok(Step::Skip(true)),
                    _ => Err(AppError::NoSubscription),
                }
            })
            .await?;

        let effective_at = committed.record.current_period_end.unwrap_or(effective_at);
        // This call moved the gateway off `Active`, even if another writer
        // committed the local transition first.
        if scheduled_from_active {
            info!(%account_id, %effective_at, "Subscription cancellation scheduled");
            self.emit(SubscriptionEvent::cancellation_scheduled(
                account_id,
                committed.record.record_id,
                source_version,
                effective_at,
            ))
            .await;
        }

        Ok(CancellationOutcome {
            effective_at,
            already_scheduled: !scheduled_from_active,
        })
    }

    /// Undo a scheduled cancellation. `Active` is a no-op success.
    #[instrument(skip(self))]
    pub async fn request_reactivation(&self, account_id: Uuid) -> AppResult<ReactivationOutcome> {
        let record = self
            .store
            .get(account_id)
            .await?
            .ok_or(AppError::NoSubscription)?;

        match record.status {
            SubscriptionStatus::Active => {
                info!(%account_id, "Subscription already renewing");
                return Ok(ReactivationOutcome::AlreadyRenewing);
            }
            SubscriptionStatus::PendingCancellation => {}
            status => {
                info!(%account_id, %status, "Reactivation requested without pending cancellation");
                return Err(AppError::NoSubscription);
            }
        }

        let external_id = record
            .external_subscription_id
            .clone()
            .ok_or_else(|| AppError::Internal("live record without external id".into()))?;

        let source_version = record.version;
        let resumed = match self
            .call_gateway("cancel_scheduled_cancellation", account_id, || {
                self.gateway.cancel_scheduled_cancellation(&external_id)
            })
            .await
        {
            Ok(state) if !state.renewing => {
                return Err(AppError::GatewayRejected(
                    "gateway did not resume renewal".into(),
                ));
            }
            Ok(_) => true,
            Err(AppError::NotScheduled) => {
                // Gateway already renews; converge the local record.
                warn!(
                    %account_id,
                    external_subscription_id = %external_id,
                    "Gateway had no scheduled cancellation; local record drifted"
                );
                false
            }
            Err(err) => return Err(err),
        };

        let committed = self
            .persist(account_id, record, |fresh| {
                if !same_external_id(fresh, &external_id) {
                    return Err(AppError::Conflict);
                }
                match fresh.status {
                    SubscriptionStatus::PendingCancellation => {
                        fresh.reactivate(Utc::now()).map_err(not_allowed)?;
                        Ok(Step::Write(()))
                    }
                    SubscriptionStatus::Active => Ok(Step::Skip(())),
                    _ => Err(AppError::NoSubscription),
                }
            })
            .await?;

        if resumed || committed.written {
            info!(%account_id, "Subscription reactivated");
            self.emit(SubscriptionEvent::reactivated(
                account_id,
                committed.record.record_id,
                source_version,
            ))
            .await;
        }

        Ok(ReactivationOutcome::Renewing)
    }

    /// Record a subscription created by the gateway's hosted checkout.
    ///
    /// `None` becomes `Active` in place; `Canceled` starts a fresh record
    /// generation. The gateway must confirm the subscription belongs to the
    /// account and is not already canceled.
    #[instrument(skip(self))]
    pub async fn record_purchase(
        &self,
        account_id: Uuid,
        external_id: ExternalSubscriptionId,
    ) -> AppResult<SubscriptionRecord> {
        if external_id.as_str().trim().is_empty() {
            return Err(AppError::InvalidInput(
                "externalSubscriptionId is required".into(),
            ));
        }
        if !external_id.is_well_formed() {
            return Err(AppError::InvalidInput(
                "externalSubscriptionId is malformed".into(),
            ));
        }

        let record = self.provision(account_id).await?;
        if record.status.is_live() {
            return if same_external_id(&record, &external_id) {
                Ok(record)
            } else {
                Err(AppError::InvalidInput(
                    "Account already has a live subscription".into(),
                ))
            };
        }
        if record.status == SubscriptionStatus::Canceled && same_external_id(&record, &external_id)
        {
            return Err(AppError::InvalidInput(
                "Subscription has already been canceled".into(),
            ));
        }

        let state = self
            .call_gateway("fetch_current_state", account_id, || {
                self.gateway.fetch_current_state(&external_id)
            })
            .await?;
        let previous_status = record.status;
        let source_version = record.version;

        if let Some(reference) = state.account_reference.as_deref()
            && reference != account_id.to_string()
        {
            warn!(
                %account_id,
                external_subscription_id = %external_id,
                "Purchase claimed for a subscription owned by another account"
            );
            return Err(AppError::InvalidInput(
                "Subscription does not belong to this account".into(),
            ));
        }
        if state.canceled {
            return Err(AppError::InvalidInput(
                "Subscription has already been canceled".into(),
            ));
        }

        let committed = self
            .persist(account_id, record, |fresh| {
                if fresh.status.is_live() {
                    return if same_external_id(fresh, &external_id) {
                        Ok(Step::Skip(()))
                    } else {
                        Err(AppError::InvalidInput(
                            "Account already has a live subscription".into(),
                        ))
                    };
                }
                if fresh.status == SubscriptionStatus::Canceled {
                    *fresh = fresh.next_generation();
                }
                let now = Utc::now();
                fresh
                    .activate(external_id.clone(), state.period_end, now)
                    .map_err(not_allowed)?;
                if state.cancel_at_period_end {
                    fresh
                        .schedule_cancellation(state.period_end, now)
                        .map_err(not_allowed)?;
                }
                Ok(Step::Write(()))
            })
            .await?;

        if committed.written {
            info!(
                %account_id,
                external_subscription_id = %external_id,
                record_id = %committed.record.record_id,
                "Subscription activated"
            );
            self.emit(SubscriptionEvent::activated(
                account_id,
                committed.record.record_id,
                source_version,
                previous_status,
                committed.record.status,
            ))
            .await;
        }

        Ok(committed.record)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Overwrite local status and period end with gateway truth. Never emits
    /// events.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, account_id: Uuid) -> AppResult<SubscriptionRecord> {
        let record = self.provision(account_id).await?;
        self.reconcile_record(record)
            .await
            .map(|(record, _repaired)| record)
    }

    /// Reconcile up to `limit` live records not synced within `stale_after`.
    /// Per-account failures are logged and counted.
    #[instrument(skip(self))]
    pub async fn reconcile_stale(
        &self,
        stale_after: chrono::Duration,
        limit: i64,
    ) -> AppResult<ReconcileReport> {
        let synced_before = Utc::now() - stale_after;
        let records = self.store.list_stale(synced_before, limit).await?;

        let mut report = ReconcileReport::default();
        for record in records {
            report.examined += 1;
            let account_id = record.account_id;
            match self.reconcile_record(record).await {
                Ok((_, true)) => report.repaired += 1,
                Ok((_, false)) => {}
                Err(err) => {
                    report.failed += 1;
                    error!(%account_id, error = ?err, "Reconciliation failed");
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                repaired = report.repaired,
                failed = report.failed,
                "Reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Apply a gateway snapshot to `record`. A snapshot is only written over
    /// the version it was fetched against; when another writer commits first,
    /// the gateway is read again for the fresh record.
    async fn reconcile_record(
        &self,
        mut record: SubscriptionRecord,
    ) -> AppResult<(SubscriptionRecord, bool)> {
        let account_id = record.account_id;

        for round in 1..=self.policy.store_max_attempts {
            let external_id = match record.external_subscription_id.clone() {
                Some(id) if !record.status.is_terminal() => id,
                // Nothing to compare against, or terminal.
                _ => return Ok((record, false)),
            };

            let state = self
                .call_gateway("fetch_current_state", account_id, || {
                    self.gateway.fetch_current_state(&external_id)
                })
                .await?;
            let target = status_from_gateway(&state);
            let snapshot_version = record.version;

            let committed = self
                .persist(account_id, record, |fresh| {
                    if fresh.version != snapshot_version {
                        return Ok(Step::Skip(None));
                    }
                    let drifted = fresh.status != target
                        || fresh.current_period_end != Some(state.period_end);
                    fresh.sync_from_gateway(target, state.period_end, Utc::now());
                    Ok(Step::Write(Some(drifted)))
                })
                .await?;

            match committed.value {
                Some(repaired) => {
                    if repaired {
                        info!(
                            %account_id,
                            status = %committed.record.status,
                            "Subscription record repaired from gateway state"
                        );
                    }
                    return Ok((committed.record, repaired));
                }
                None => {
                    warn!(
                        %account_id,
                        round,
                        "Record changed during reconciliation, re-fetching"
                    );
                    record = committed.record;
                }
            }
        }

        error!(%account_id, "Giving up reconciliation after repeated conflicts");
        Err(AppError::Conflict)
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    /// Run one gateway operation under the timeout, retrying transient
    /// failures with exponential backoff. Permanent rejections are returned
    /// immediately.
    async fn call_gateway<T, F, Fut>(
        &self,
        op: &'static str,
        account_id: Uuid,
        call: F,
    ) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.policy.gateway_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::GatewayUnavailable(format!(
                    "{} timed out after {:?}",
                    op, self.policy.gateway_timeout
                ))),
            };

            match result {
                Err(err) if err.is_transient() && attempt < self.policy.gateway_max_attempts => {
                    let delay = gateway_backoff_delay(self.policy.gateway_backoff, attempt);
                    warn!(
                        %account_id,
                        op,
                        attempt,
                        ?delay,
                        error = %err,
                        "Gateway call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AppError::GatewayRejected(msg)) => {
                    warn!(
                        %account_id,
                        op,
                        reason = %msg,
                        "Gateway rejected request; record may reference an unknown subscription"
                    );
                    return Err(AppError::GatewayRejected(msg));
                }
                other => return other,
            }
        }
    }

    /// Apply `step` to `record` and save, re-reading and re-applying on
    /// version conflicts up to the store retry budget.
    async fn persist<T>(
        &self,
        account_id: Uuid,
        mut record: SubscriptionRecord,
        step: impl Fn(&mut SubscriptionRecord) -> AppResult<Step<T>>,
    ) -> AppResult<Committed<T>> {
        let mut attempt = 1;
        loop {
            let value = match step(&mut record)? {
                Step::Skip(value) => {
                    return Ok(Committed {
                        record,
                        value,
                        written: false,
                    });
                }
                Step::Write(value) => value,
            };

            record
                .check_invariants()
                .map_err(|e| AppError::Internal(format!("invariant violated: {}", e)))?;

            match self.store.save(&record).await {
                Ok(saved) => {
                    return Ok(Committed {
                        record: saved,
                        value,
                        written: true,
                    });
                }
                Err(AppError::Conflict) if attempt < self.policy.store_max_attempts => {
                    warn!(%account_id, attempt, "Concurrent update detected, re-reading record");
                    attempt += 1;
                    record = self
                        .store
                        .get(account_id)
                        .await?
                        .ok_or(AppError::NoSubscription)?;
                }
                Err(AppError::Conflict) => {
                    error!(%account_id, attempts = attempt, "Giving up after repeated conflicts");
                    return Err(AppError::Conflict);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn emit(&self, event: SubscriptionEvent) {
        if let Err(err) = self.events.publish(&event).await {
            error!(
                account_id = %event.account_id,
                kind = event.kind.as_str(),
                error = ?err,
                "Failed to publish subscription event"
            );
        }
    }
}
