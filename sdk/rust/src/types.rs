//! Request and response types shared with the TableTide server.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The identity a POS installation validates as. Immutable per client.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub email: String,
    pub installation_token: String,
    pub device_fingerprint: String,
}

impl Identity {
    /// Stable hash used as the cache key for this identity. Matches the
    /// server's identity hashing so keys line up across restarts.
    pub fn identity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.email.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.installation_token.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.device_fingerprint.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Grace,
    Cancelled,
    Expired,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Grace => "grace",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Server cache advice, ordered from longest to shortest TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    Aggressive,
    Moderate,
    Frequent,
    Immediate,
}

// ==================== /validate wire types ====================

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidateOptions {
    /// Serve a fresh cached result without contacting the server
    pub allow_cache: bool,
    /// Skip session coordination on the server
    pub performance_mode: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions {
            allow_cache: true,
            performance_mode: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateRequest {
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub options: ValidateOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationBlock {
    pub valid: bool,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionBlock {
    pub status: SubscriptionStatus,
    pub current_period_end: i64,
    #[serde(default)]
    pub grace_period_until: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictInfo {
    pub device_fingerprint: String,
    #[serde(default)]
    pub device_name: Option<String>,
    pub last_heartbeat_at: i64,
    pub started_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionBlock {
    pub allowed: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conflict: Option<ConflictInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CachingBlock {
    pub strategy: CacheStrategy,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceBlock {
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub validation: ValidationBlock,
    pub subscription: SubscriptionBlock,
    #[serde(default)]
    pub session: Option<SessionBlock>,
    pub caching: CachingBlock,
    pub performance: PerformanceBlock,
}

// ==================== Session wire types ====================

#[derive(Debug, Serialize)]
pub struct SessionRequest {
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionIdRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
    #[serde(default)]
    pub last_heartbeat_at: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndSessionResponse {
    pub ended: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TakeoverResponse {
    pub session_id: String,
    pub started_at: i64,
}

// ==================== Cached results and outcomes ====================

/// Snapshot of a successful validation, as stored in the fallback cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedValidation {
    pub valid: bool,
    pub status: SubscriptionStatus,
    pub current_period_end: i64,
    #[serde(default)]
    pub grace_period_until: Option<i64>,
    pub strategy: CacheStrategy,
}

impl CachedValidation {
    pub fn from_response(response: &ValidateResponse) -> Self {
        CachedValidation {
            valid: response.validation.valid,
            status: response.validation.status,
            current_period_end: response.subscription.current_period_end,
            grace_period_until: response.subscription.grace_period_until,
            strategy: response.caching.strategy,
        }
    }
}

/// Where a validation answer came from. Callers must handle every source:
/// a `Fallback` answer is provisional and an `Offline` answer is a denial
/// with a retry hint, not an error.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// Fresh answer from the server
    Live(ValidateResponse),
    /// Fresh cached answer served without contacting the server
    Cache {
        result: CachedValidation,
        age_seconds: i64,
    },
    /// Stale-but-recent answer served because the server is unreachable.
    /// Must be re-checked against the server by `recheck_by`.
    Fallback {
        result: CachedValidation,
        age_seconds: i64,
        recheck_by: i64,
    },
    /// Unreachable with nothing usable cached
    Offline { retry_after_seconds: i64 },
}

impl ValidationOutcome {
    /// Whether this outcome grants access right now.
    pub fn valid(&self) -> bool {
        match self {
            ValidationOutcome::Live(r) => r.validation.valid,
            ValidationOutcome::Cache { result, .. } => result.valid,
            ValidationOutcome::Fallback { result, .. } => result.valid,
            ValidationOutcome::Offline { .. } => false,
        }
    }

    pub fn status(&self) -> Option<SubscriptionStatus> {
        match self {
            ValidationOutcome::Live(r) => Some(r.validation.status),
            ValidationOutcome::Cache { result, .. } => Some(result.status),
            ValidationOutcome::Fallback { result, .. } => Some(result.status),
            ValidationOutcome::Offline { .. } => None,
        }
    }
}
