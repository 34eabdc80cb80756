use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        tracing::error!(error = ?self, "Request failed");

        match self {
            AppError::Database(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DatabaseError,
                "Something went wrong",
            ),
            AppError::Unauthenticated => error_resp(
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthenticated,
                "Not authenticated",
            ),
            AppError::NoSubscription | AppError::NotScheduled => error_resp(
                StatusCode::BAD_REQUEST,
                ErrorCode::NoSubscription,
                "No active subscription",
            ),
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, &msg)
            }
            AppError::NotFound => {
                error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Not found")
            }
            AppError::Conflict => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Conflict,
                "Subscription is being updated, please retry",
            ),
            AppError::GatewayUnavailable(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::GatewayUnavailable,
                "Billing provider is unavailable, please retry",
            ),
            AppError::GatewayRejected(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::GatewayRejected,
                "Billing provider rejected the request",
            ),
            AppError::Internal(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "Something went wrong",
            ),
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message, "code": code.as_str() });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upstream_detail_is_not_leaked() {
        let response =
            AppError::GatewayRejected("No such subscription: sub_secret".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "GATEWAY_REJECTED");
        assert!(!body["error"].as_str().unwrap().contains("sub_secret"));
    }

    #[tokio::test]
    async fn no_subscription_is_a_client_error() {
        let response = AppError::NoSubscription.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "NO_SUBSCRIPTION");
    }
}
