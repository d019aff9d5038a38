use serde::{Deserialize, Serialize};

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

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Grace => "grace",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Whether this status can still confer entitlement (subject to the
    /// period/grace deadlines checked at validation time).
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Trial | Self::Active | Self::PastDue | Self::Grace)
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "grace" => Ok(Self::Grace),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscription record. Never deleted, only status-transitioned:
/// webhooks drive billing transitions (active/past_due/cancelled),
/// validation requests drive time-based ones (trial expiry, grace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub email: String,
    /// SHA-256 hash of the installation token (no raw secrets stored)
    pub installation_token_hash: String,
    pub status: SubscriptionStatus,
    /// End of the current paid (or trial) period
    pub current_period_end: i64,
    /// Deadline for the grace window after a payment failure
    pub grace_period_until: Option<i64>,
    pub last_payment_failure_at: Option<i64>,
    pub validation_count: i64,
    pub last_validated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscription {
    pub email: String,
    pub trial_days: i64,
}
