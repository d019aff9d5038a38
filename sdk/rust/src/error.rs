//! Error types for the TableTide SDK

use std::fmt;

/// Machine-readable error codes.
///
/// `Network`, `Timeout`, and `CircuitOpen` are transport-class failures:
/// they feed the circuit breaker and trigger the cache/fallback ladder
/// instead of being surfaced while a usable fallback exists. The rest are
/// definitive server answers and are surfaced directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkErrorCode {
    /// Could not reach the server
    Network,
    /// The request exceeded its deadline
    Timeout,
    /// The circuit breaker is open; no call was attempted
    CircuitOpen,
    /// Unknown email or installation token
    Auth,
    /// The subscription does not grant access
    Subscription,
    /// Device session conflict
    Session,
    /// Too many validation requests
    RateLimited,
    /// Malformed request or response
    Validation,
    /// Server-side failure
    Server,
}

/// Error type returned by SDK operations.
#[derive(Debug, Clone)]
pub struct SdkError {
    pub code: SdkErrorCode,
    pub message: String,
    /// HTTP status, when the server answered
    pub status: Option<u16>,
    /// Server-suggested retry delay in seconds, when one was given
    pub retry_after: Option<i64>,
}

impl SdkError {
    pub fn new(code: SdkErrorCode, message: impl Into<String>) -> Self {
        SdkError {
            code,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SdkErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SdkErrorCode::Timeout, message)
    }

    pub fn circuit_open() -> Self {
        Self::new(SdkErrorCode::CircuitOpen, "Circuit breaker is open")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(SdkErrorCode::Validation, message)
    }

    /// Whether this failure counts against the circuit breaker and should
    /// fall through to cached/fallback results.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.code,
            SdkErrorCode::Network
                | SdkErrorCode::Timeout
                | SdkErrorCode::CircuitOpen
                | SdkErrorCode::Server
        )
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for SdkError {}

/// Map a server error category to an SDK error code.
pub(crate) fn map_category(category: Option<&str>, status: u16) -> SdkErrorCode {
    match category {
        Some("auth") => SdkErrorCode::Auth,
        Some("subscription") => SdkErrorCode::Subscription,
        Some("session") => SdkErrorCode::Session,
        Some("validation") => SdkErrorCode::Validation,
        Some("system") if status == 429 => SdkErrorCode::RateLimited,
        Some("system") => SdkErrorCode::Server,
        _ if status == 429 => SdkErrorCode::RateLimited,
        _ if status >= 500 => SdkErrorCode::Server,
        _ if status == 401 => SdkErrorCode::Auth,
        _ if status == 403 => SdkErrorCode::Subscription,
        _ => SdkErrorCode::Validation,
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
