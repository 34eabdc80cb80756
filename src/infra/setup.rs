use crate::{
    adapters::http::app_state::AppState,
    application::ports::billing_gateway::BillingGateway,
    infra::{
        config::{AppConfig, GatewayKind},
        dummy_billing_gateway::DummyBillingGateway,
        error::InfraError,
        http_client::try_build_client_with_timeout,
        postgres_persistence,
        stripe_billing_gateway::StripeBillingGateway,
        stripe_client::StripeClient,
    },
    use_cases::subscription_lifecycle::SubscriptionLifecycleUseCases,
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let gateway = build_billing_gateway(&config)?;

    let subscription_use_cases = SubscriptionLifecycleUseCases::new(
        postgres_arc.clone(),
        gateway,
        postgres_arc,
        config.retry_policy,
    );

    Ok(AppState {
        config: Arc::new(config),
        subscription_use_cases: Arc::new(subscription_use_cases),
    })
}

pub fn build_billing_gateway(config: &AppConfig) -> Result<Arc<dyn BillingGateway>, InfraError> {
    match config.billing_gateway {
        GatewayKind::Stripe => {
            let secret_key =
                config
                    .stripe_secret_key
                    .clone()
                    .ok_or(InfraError::ConfigMissing {
                        var: "STRIPE_SECRET_KEY",
                    })?;
            let http = try_build_client_with_timeout(config.retry_policy.gateway_timeout)
                .map_err(InfraError::HttpClient)?;
            let client = StripeClient::new(http, secret_key, config.stripe_api_base.clone());
            Ok(Arc::new(StripeBillingGateway::new(client)))
        }
        GatewayKind::Dummy => {
            tracing::warn!("Using dummy billing gateway; no payments are processed");
            Ok(Arc::new(DummyBillingGateway::new()))
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "drivetest_api=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don’t show target (module path)
        .with_level(true) // show log level
        .pretty(); // human-friendly, with colors

    // File (structured JSON logs); skipped when the file cannot be created.
    let json_layer = File::create("app.log").ok().map(|file| {
        fmt::layer()
            .json()
            .with_writer(file)
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
