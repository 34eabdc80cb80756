//! In-memory mock implementations for the subscription lifecycle ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_gateway::{
            BillingGateway, GatewaySubscriptionState, RenewalState, ScheduledCancellation,
        },
        subscription_events::SubscriptionEventPublisher,
        subscription_store::SubscriptionStore,
    },
    domain::entities::{
        subscription_event::SubscriptionEvent,
        subscription_record::{ExternalSubscriptionId, SubscriptionRecord},
    },
};

type ConcurrentWrite = Box<dyn FnOnce(&mut SubscriptionRecord) + Send>;

// ============================================================================
// InMemorySubscriptionStore
// ============================================================================

/// Version-checked in-memory store. Concurrent writers are simulated by
/// queueing mutations that are applied (with a version bump) right before a
/// save, which then fails with `AppError::Conflict`.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    pub records: Mutex<HashMap<Uuid, SubscriptionRecord>>,
    pub archived: Mutex<Vec<SubscriptionRecord>>,
    concurrent_writes: Mutex<VecDeque<ConcurrentWrite>>,
    save_calls: AtomicUsize,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SubscriptionRecord>) -> Self {
        let map: HashMap<Uuid, SubscriptionRecord> =
            records.into_iter().map(|r| (r.account_id, r)).collect();
        Self {
            records: Mutex::new(map),
            ..Self::default()
        }
    }

    /// The next `count` saves lose the race against a writer that changes nothing.
    pub fn inject_conflicts(&self, count: usize) {
        for _ in 0..count {
            self.inject_concurrent_write(|_| {});
        }
    }

    /// The next save loses the race against a writer applying `write`.
    pub fn inject_concurrent_write(
        &self,
        write: impl FnOnce(&mut SubscriptionRecord) + Send + 'static,
    ) {
        self.concurrent_writes
            .lock()
            .unwrap()
            .push_back(Box::new(write));
    }

    pub fn record(&self, account_id: Uuid) -> Option<SubscriptionRecord> {
        self.records.lock().unwrap().get(&account_id).cloned()
    }

    pub fn archived(&self) -> Vec<SubscriptionRecord> {
        self.archived.lock().unwrap().clone()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>> {
        Ok(self.records.lock().unwrap().get(&account_id).cloned())
    }

    async fn save(&self, record: &SubscriptionRecord) -> AppResult<SubscriptionRecord> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();

        let concurrent = self.concurrent_writes.lock().unwrap().pop_front();
        if let Some(write) = concurrent {
            if let Some(stored) = records.get_mut(&record.account_id) {
                write(stored);
                stored.version += 1;
            }
            return Err(AppError::Conflict);
        }

        match records.get(&record.account_id) {
            None if record.version == 0 => {}
            None => return Err(AppError::Conflict),
            Some(stored) if stored.version != record.version || record.version == 0 => {
                return Err(AppError::Conflict);
            }
            Some(stored) => {
                if stored.record_id != record.record_id {
                    self.archived.lock().unwrap().push(stored.clone());
                }
            }
        }

        let mut saved = record.clone();
        saved.version += 1;
        records.insert(saved.account_id, saved.clone());
        Ok(saved)
    }

    async fn list_stale(
        &self,
        synced_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<SubscriptionRecord>> {
        let mut stale: Vec<SubscriptionRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status.is_live())
            .filter(|r| r.last_synced_at.is_none_or(|t| t < synced_before))
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.last_synced_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

// ============================================================================
// ScriptedBillingGateway
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum GatewayFailure {
    Unavailable,
    Rejected,
    /// Delay the call; combined with a short policy timeout this simulates a hang.
    Hang(Duration),
}

/// Gateway double keeping subscription state in memory, counting calls and
/// failing on demand.
#[derive(Default)]
pub struct ScriptedBillingGateway {
    pub subscriptions: Mutex<HashMap<String, GatewaySubscriptionState>>,
    failures: Mutex<VecDeque<GatewayFailure>>,
    schedule_calls: AtomicUsize,
    unschedule_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedBillingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, id: &str, state: GatewaySubscriptionState) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id.to_string(), state);
        self
    }

    /// Queue a failure for the next call (any operation).
    pub fn fail_next(&self, failure: GatewayFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub fn state(&self, id: &str) -> Option<GatewaySubscriptionState> {
        self.subscriptions.lock().unwrap().get(id).cloned()
    }

    pub fn set_state(&self, id: &str, update: impl FnOnce(&mut GatewaySubscriptionState)) {
        if let Some(state) = self.subscriptions.lock().unwrap().get_mut(id) {
            update(state);
        }
    }

    pub fn schedule_calls(&self) -> usize {
        self.schedule_calls.load(Ordering::SeqCst)
    }

    pub fn unschedule_calls(&self) -> usize {
        self.unschedule_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.schedule_calls() + self.unschedule_calls() + self.fetch_calls()
    }

    async fn maybe_fail(&self) -> AppResult<()> {
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            None => Ok(()),
            Some(GatewayFailure::Unavailable) => Err(AppError::GatewayUnavailable(
                "simulated outage".into(),
            )),
            Some(GatewayFailure::Rejected) => Err(AppError::GatewayRejected(
                "simulated rejection".into(),
            )),
            Some(GatewayFailure::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn unknown(id: &ExternalSubscriptionId) -> AppError {
        AppError::GatewayRejected(format!("No such subscription: {}", id))
    }
}

#[async_trait]
impl BillingGateway for ScriptedBillingGateway {
    async fn schedule_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<ScheduledCancellation> {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail().await?;

        let mut subscriptions = self.subscriptions.lock().unwrap();
        let state = subscriptions
            .get_mut(subscription_id.as_str())
            .ok_or_else(|| Self::unknown(subscription_id))?;
        if state.canceled {
            return Err(AppError::GatewayRejected("subscription is canceled".into()));
        }
        state.cancel_at_period_end = true;
        Ok(ScheduledCancellation {
            effective_at: state.period_end,
        })
    }

    async fn cancel_scheduled_cancellation(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<RenewalState> {
        self.unschedule_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail().await?;

        let mut subscriptions = self.subscriptions.lock().unwrap();
        let state = subscriptions
            .get_mut(subscription_id.as_str())
            .ok_or_else(|| Self::unknown(subscription_id))?;
        if !state.cancel_at_period_end {
            return Err(AppError::NotScheduled);
        }
        state.cancel_at_period_end = false;
        Ok(RenewalState { renewing: true })
    }

    async fn fetch_current_state(
        &self,
        subscription_id: &ExternalSubscriptionId,
    ) -> AppResult<GatewaySubscriptionState> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail().await?;

        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id.as_str())
            .cloned()
            .ok_or_else(|| Self::unknown(subscription_id))
    }
}

// ============================================================================
// RecordingEventPublisher
// ============================================================================

#[derive(Default)]
pub struct RecordingEventPublisher {
    pub events: Mutex<Vec<SubscriptionEvent>>,
    pub fail: AtomicBool,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_all(&self) -> Vec<SubscriptionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &SubscriptionEvent) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("publisher offline".into()));
        }
        let mut events = self.events.lock().unwrap();
        // Same transition key as the outbox's unique index.
        let duplicate = events.iter().any(|e| {
            e.record_id == event.record_id
                && e.kind == event.kind
                && e.source_version == event.source_version
        });
        if !duplicate {
            events.push(event.clone());
        }
        Ok(())
    }
}
