//! Test app state builder for HTTP-level integration testing.
//!
//! This module provides `TestAppStateBuilder` which creates a minimal `AppState`
//! with in-memory mocks for testing HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        jwt::issue_access_token,
        ports::billing_gateway::GatewaySubscriptionState,
        use_cases::subscription_lifecycle::{RetryPolicy, SubscriptionLifecycleUseCases},
    },
    domain::entities::subscription_record::SubscriptionRecord,
    infra::config::{AppConfig, GatewayKind},
    test_utils::{InMemorySubscriptionStore, RecordingEventPublisher, ScriptedBillingGateway},
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-for-billing-routes";
pub const TEST_JWT_AUDIENCE: &str = "authenticated";

/// Access token for `account_id`, valid against the builder's config.
pub fn test_access_token(account_id: Uuid) -> String {
    issue_access_token(
        account_id,
        Some(TEST_JWT_AUDIENCE),
        &SecretString::from(TEST_JWT_SECRET.to_string()),
        time::Duration::minutes(5),
    )
    .expect("test token should encode")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/test".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        jwt_secret: SecretString::from(TEST_JWT_SECRET.to_string()),
        jwt_audience: Some(TEST_JWT_AUDIENCE.to_string()),
        billing_gateway: GatewayKind::Dummy,
        stripe_secret_key: None,
        stripe_api_base: Url::parse("https://api.stripe.test/v1/").unwrap(),
        retry_policy: RetryPolicy {
            store_max_attempts: 3,
            gateway_max_attempts: 3,
            gateway_backoff: Duration::ZERO,
            gateway_timeout: Duration::from_millis(100),
        },
        reconcile_interval: Duration::from_secs(60),
        reconcile_stale_after: chrono::Duration::hours(1),
        reconcile_batch_size: 10,
    }
}

/// Builder for creating `AppState` with in-memory mocks for testing.
///
/// # Example
///
/// ```ignore
/// let record = create_active_record(|_| {});
///
/// let (app_state, store, gateway, events) = TestAppStateBuilder::new()
///     .with_record(record)
///     .with_gateway_subscription("sub_1", create_gateway_state(|_| {}))
///     .build_with_mocks();
/// ```
pub struct TestAppStateBuilder {
    records: Vec<SubscriptionRecord>,
    gateway: ScriptedBillingGateway,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            records: vec![],
            gateway: ScriptedBillingGateway::new(),
        }
    }

    /// Add a persisted subscription record.
    pub fn with_record(mut self, record: SubscriptionRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Make a subscription known to the scripted gateway.
    pub fn with_gateway_subscription(mut self, id: &str, state: GatewaySubscriptionState) -> Self {
        self.gateway = self.gateway.with_subscription(id, state);
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    /// Build the state and hand back the mocks for assertions.
    pub fn build_with_mocks(
        self,
    ) -> (
        AppState,
        Arc<InMemorySubscriptionStore>,
        Arc<ScriptedBillingGateway>,
        Arc<RecordingEventPublisher>,
    ) {
        let config = test_config();
        let store = Arc::new(InMemorySubscriptionStore::with_records(self.records));
        let gateway = Arc::new(self.gateway);
        let events = Arc::new(RecordingEventPublisher::new());

        let use_cases = SubscriptionLifecycleUseCases::new(
            store.clone(),
            gateway.clone(),
            events.clone(),
            config.retry_policy,
        );

        let app_state = AppState {
            config: Arc::new(config),
            subscription_use_cases: Arc::new(use_cases),
        };

        (app_state, store, gateway, events)
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
