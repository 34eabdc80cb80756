use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("No active subscription")]
    NoSubscription,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    /// Optimistic-concurrency collision on save.
    #[error("Subscription record was modified concurrently")]
    Conflict,

    /// Transient gateway failure: network error, timeout, 5xx or rate limit.
    #[error("Billing gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Permanent gateway rejection, e.g. an unknown subscription id.
    #[error("Billing gateway rejected the request: {0}")]
    GatewayRejected(String),

    /// The gateway had no pending cancellation to undo.
    #[error("No cancellation is scheduled")]
    NotScheduled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors worth another attempt with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::GatewayUnavailable(_))
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    Unauthenticated,
    NoSubscription,
    InvalidInput,
    NotFound,
    Conflict,
    GatewayUnavailable,
    GatewayRejected,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::NoSubscription => "NO_SUBSCRIPTION",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::GatewayUnavailable => "GATEWAY_UNAVAILABLE",
            ErrorCode::GatewayRejected => "GATEWAY_REJECTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
