use std::{net::SocketAddr, str::FromStr};

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::application::use_cases::subscription_lifecycle::RetryPolicy;

/// Which billing gateway implementation to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    /// Local simulation, no network calls.
    Dummy,
}

impl FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(GatewayKind::Stripe),
            "dummy" => Ok(GatewayKind::Dummy),
            other => Err(format!("unknown billing gateway: {other}")),
        }
    }
}

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    /// HS256 secret shared with the auth provider that issues access tokens.
    pub jwt_secret: SecretString,
    /// Expected `aud` claim. Audience is not checked when unset.
    pub jwt_audience: Option<String>,
    pub billing_gateway: GatewayKind,
    /// Required when `billing_gateway` is `Stripe`.
    pub stripe_secret_key: Option<SecretString>,
    pub stripe_api_base: Url,
    pub retry_policy: RetryPolicy,
    pub reconcile_interval: std::time::Duration,
    pub reconcile_stale_after: chrono::Duration,
    pub reconcile_batch_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3001".parse().unwrap());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let jwt_secret = SecretString::from(get_env::<String>("AUTH_JWT_SECRET"));
        let jwt_audience = optional_env("AUTH_JWT_AUDIENCE");

        let billing_gateway: GatewayKind =
            get_env_default("BILLING_GATEWAY", String::from("stripe"))
                .parse()
                .expect("BILLING_GATEWAY must be stripe or dummy");
        let stripe_secret_key = optional_env("STRIPE_SECRET_KEY").map(SecretString::from);
        let stripe_api_base: Url = get_env_default(
            "STRIPE_API_BASE",
            Url::parse("https://api.stripe.com/v1/").unwrap(),
        );

        let defaults = RetryPolicy::default();
        let gateway_timeout_ms: u64 =
            get_env_default("GATEWAY_TIMEOUT_MS", defaults.gateway_timeout.as_millis() as u64);
        let gateway_backoff_ms: u64 =
            get_env_default("GATEWAY_BACKOFF_MS", defaults.gateway_backoff.as_millis() as u64);
        let gateway_max_attempts: u32 =
            get_env_default("GATEWAY_MAX_ATTEMPTS", defaults.gateway_max_attempts);
        let store_max_attempts: u32 =
            get_env_default("STORE_MAX_ATTEMPTS", defaults.store_max_attempts);

        let reconcile_interval_secs: u64 = get_env_default("RECONCILE_INTERVAL_SECS", 300);
        let reconcile_stale_after_secs: i64 = get_env_default("RECONCILE_STALE_AFTER_SECS", 3_600);
        let reconcile_batch_size: i64 = get_env_default("RECONCILE_BATCH_SIZE", 100);

        Self {
            database_url,
            bind_addr,
            cors_origin,
            jwt_secret,
            jwt_audience,
            billing_gateway,
            stripe_secret_key,
            stripe_api_base,
            retry_policy: RetryPolicy {
                store_max_attempts: store_max_attempts.max(1),
                gateway_max_attempts: gateway_max_attempts.max(1),
                gateway_backoff: std::time::Duration::from_millis(gateway_backoff_ms),
                gateway_timeout: std::time::Duration::from_millis(gateway_timeout_ms),
            },
            reconcile_interval: std::time::Duration::from_secs(reconcile_interval_secs.max(1)),
            reconcile_stale_after: chrono::Duration::seconds(reconcile_stale_after_secs),
            reconcile_batch_size,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
