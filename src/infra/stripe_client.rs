use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::subscription_record::ExternalSubscriptionId,
};

/// Thin client for the subset of the Stripe subscriptions API the lifecycle
/// needs. Failures are classified as transient or permanent here so the
/// lifecycle manager can decide whether to retry.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: Url,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: SecretString, api_base: Url) -> Self {
        Self {
            client,
            secret_key,
            api_base,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    /// The id is pushed as one escaped path segment; ids that are not a
    /// single token are rejected outright.
    fn subscription_url(&self, subscription_id: &str) -> AppResult<Url> {
        if !ExternalSubscriptionId::new(subscription_id).is_well_formed() {
            return Err(AppError::GatewayRejected(format!(
                "Malformed subscription id: {:?}",
                subscription_id
            )));
        }
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Stripe API base cannot carry a path".into()))?
            .pop_if_empty()
            .push("subscriptions")
            .push(subscription_id);
        Ok(url)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn get_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        let response = self
            .client
            .get(self.subscription_url(subscription_id)?)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_response(response).await
    }

    /// Set or clear `cancel_at_period_end`. Stripe treats repeated updates
    /// with the same value as no-ops.
    pub async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> AppResult<StripeSubscription> {
        let value = if cancel_at_period_end { "true" } else { "false" };
        let response = self
            .client
            .post(self.subscription_url(subscription_id)?)
            .header("Authorization", self.auth_header())
            .form(&[("cancel_at_period_end", value)])
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");
            return Err(classify_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    AppError::GatewayUnavailable(format!("Stripe request failed: {}", e))
}

/// 5xx and 429 are worth retrying; any other non-success status is a
/// permanent rejection.
pub fn classify_error(status: StatusCode, body: &str) -> AppError {
    let detail = serde_json::from_str::<StripeErrorResponse>(body)
        .map(|e| e.error.message.unwrap_or(e.error.error_type))
        .unwrap_or_else(|_| status.to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AppError::GatewayUnavailable(format!("Stripe error: {}", detail))
    } else {
        AppError::GatewayRejected(format!("Stripe error: {}", detail))
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    /// Top-level on older API versions; newer versions only report it per item.
    #[serde(default)]
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: Option<StripeSubscriptionItems>,
}

impl StripeSubscription {
    /// End of the period in force, falling back to the first item.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.current_period_end)
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}
