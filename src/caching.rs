//! Cache-TTL advice returned with every validation response.
//!
//! The server knows how stable a subscription is; the client knows nothing
//! but the last answer. So the server picks the TTL tier and the client's
//! fallback cache obeys it.

use serde::{Deserialize, Serialize};

use crate::models::{Subscription, SubscriptionStatus};

/// How long the 30-day "recent payment trouble" shadow lasts.
const PAYMENT_ISSUE_LOOKBACK_SECS: i64 = 30 * 86400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Stable active subscription: re-validate hourly
    Aggressive,
    /// Entitled but recently troubled: short leash
    Moderate,
    /// Entitled but not in a paid-steady state (trial, grace)
    Frequent,
    /// Do not cache: first-ever validation, or a denial
    Immediate,
}

impl CacheStrategy {
    pub fn ttl_seconds(&self) -> i64 {
        match self {
            Self::Aggressive => 3600,
            Self::Moderate => 300,
            Self::Frequent => 120,
            Self::Immediate => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Moderate => "moderate",
            Self::Frequent => "frequent",
            Self::Immediate => "immediate",
        }
    }
}

/// Pick the strategy for a validation result.
///
/// `valid` is the entitlement decision; `subscription` is the record
/// *before* this validation was counted, so `validation_count == 0`
/// means this is the installation's first-ever successful validation
/// (which must always hit the remote path again next time).
pub fn advise(subscription: &Subscription, valid: bool, ts: i64) -> CacheStrategy {
    if !valid || subscription.validation_count == 0 {
        return CacheStrategy::Immediate;
    }

    let recent_payment_issue = subscription
        .last_payment_failure_at
        .is_some_and(|at| ts - at < PAYMENT_ISSUE_LOOKBACK_SECS);

    match subscription.status {
        SubscriptionStatus::Active if !recent_payment_issue => CacheStrategy::Aggressive,
        _ if recent_payment_issue => CacheStrategy::Moderate,
        _ => CacheStrategy::Frequent,
    }
}
