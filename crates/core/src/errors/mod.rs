//! Error types and Result alias for the Terminus economy engine

use thiserror::Error;

/// Main error type for the economy engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("No inviter matches code {0}")]
    InviterNotFound(String),

    #[error("No pending purchase for player {0}")]
    PurchaseNotFound(String),

    #[error("Not enough coins: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Not enough energy: required {required}, available {available}")]
    InsufficientEnergy { required: i64, available: i64 },

    #[error("Spend amount {requested} exceeds cap {cap}")]
    ExceedsCap { requested: i64, cap: i64 },

    #[error("Boost is already at max level")]
    MaxLevelReached,

    #[error("Daily activation limit reached")]
    DailyLimitReached,

    #[error("Stage gate not open yet")]
    TooEarly,

    #[error("Task already checked today")]
    AlreadyCheckedToday,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Paid amount {actual} does not match pending amount {expected}")]
    PriceMismatch { expected: f64, actual: f64 },

    #[error("Unsupported sku: {0}")]
    UnsupportedSku(String),

    #[error("External verifier unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable, user-safe reason code for the API layer.
    ///
    /// These strings are part of the external contract; internal detail
    /// (messages, SQL errors, upstream bodies) never leaks through them.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::PlayerNotFound(_) => "player_not_found",
            Error::TaskNotFound(_) => "task_not_found",
            Error::InviterNotFound(_) => "inviter_not_found",
            Error::PurchaseNotFound(_) => "purchase_not_found",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::InsufficientEnergy { .. } => "insufficient_energy",
            Error::ExceedsCap { .. } => "exceeds_cap",
            Error::MaxLevelReached => "max_level_reached",
            Error::DailyLimitReached => "daily_limit_reached",
            Error::TooEarly => "too_early",
            Error::AlreadyCheckedToday => "already_checked_today",
            Error::Conflict(_) => "conflict",
            Error::PriceMismatch { .. } => "price_mismatch",
            Error::UnsupportedSku(_) => "unsupported_sku",
            Error::VerifierUnavailable(_) => "verifier_unavailable",
            Error::PaymentGatewayError(_) => "payment_gateway_error",
            Error::NetworkError(_) => "network_error",
            Error::DatabaseError(_) => "database_error",
            Error::InvalidData(_) => "invalid_data",
        }
    }

    /// Transient errors are retryable and must never surface as fatal
    /// to the player (verifier and payment timeouts map to a negative,
    /// retryable result instead of a state change).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::VerifierUnavailable(_) | Error::NetworkError(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}
