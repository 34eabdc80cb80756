//! Billing routes: subscription view, cancellation, reactivation, repair.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, auth::current_account},
    app_error::{AppError, AppResult},
    domain::entities::{
        subscription_record::{ExternalSubscriptionId, SubscriptionRecord},
        subscription_status::SubscriptionStatus,
    },
};

// ============================================================================
// Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    status: &'static str,
    effective_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct UncancelResponse {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionResponse {
    record_id: Uuid,
    status: SubscriptionStatus,
    external_subscription_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    last_synced_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionRecord> for SubscriptionResponse {
    fn from(record: SubscriptionRecord) -> Self {
        Self {
            record_id: record.record_id,
            status: record.status,
            external_subscription_id: record
                .external_subscription_id
                .map(|id| id.as_str().to_string()),
            current_period_end: record.current_period_end,
            cancel_at_period_end: record.status == SubscriptionStatus::PendingCancellation,
            last_synced_at: record.last_synced_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivatePayload {
    external_subscription_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/billing/cancel-subscription
/// Stops renewal at the end of the current period.
async fn cancel_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
) -> AppResult<impl IntoResponse> {
    let account_id = current_account(&app_state, &headers, &cookies)?;

    let outcome = app_state
        .subscription_use_cases
        .request_cancellation(account_id)
        .await?;

    Ok(Json(CancelResponse {
        status: "scheduled",
        effective_at: outcome.effective_at,
    }))
}

/// POST /api/billing/uncancel-subscription
async fn uncancel_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
) -> AppResult<impl IntoResponse> {
    let account_id = current_account(&app_state, &headers, &cookies)?;

    let outcome = app_state
        .subscription_use_cases
        .request_reactivation(account_id)
        .await?;

    Ok(Json(UncancelResponse {
        status: outcome.as_str(),
    }))
}

/// GET /api/billing/subscription
async fn get_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
) -> AppResult<impl IntoResponse> {
    let account_id = current_account(&app_state, &headers, &cookies)?;

    let record = app_state
        .subscription_use_cases
        .get_subscription(account_id)
        .await?;

    Ok(Json(SubscriptionResponse::from(record)))
}

/// POST /api/billing/subscription/reconcile
/// Re-reads the subscription from the billing provider and repairs drift.
async fn reconcile_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
) -> AppResult<impl IntoResponse> {
    let account_id = current_account(&app_state, &headers, &cookies)?;

    let record = app_state
        .subscription_use_cases
        .reconcile(account_id)
        .await?;

    Ok(Json(SubscriptionResponse::from(record)))
}

/// POST /api/billing/subscription/activate
/// Called after hosted checkout returns with the new subscription id.
async fn activate_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
    payload: Result<Json<ActivatePayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let account_id = current_account(&app_state, &headers, &cookies)?;
    let Json(payload) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    let record = app_state
        .subscription_use_cases
        .record_purchase(
            account_id,
            ExternalSubscriptionId::new(payload.external_subscription_id.trim()),
        )
        .await?;

    Ok(Json(SubscriptionResponse::from(record)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cancel-subscription", post(cancel_subscription))
        .route("/uncancel-subscription", post(uncancel_subscription))
        .route("/subscription", get(get_subscription))
        .route("/subscription/reconcile", post(reconcile_subscription))
        .route("/subscription/activate", post(activate_subscription))
}
