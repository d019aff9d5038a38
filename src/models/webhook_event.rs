use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Billing event types that drive subscription-state transitions.
/// Unrecognized types are recorded and ignored (providers send far
/// more event kinds than we act on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventType {
    PaymentSucceeded,
    PaymentFailed,
    SubscriptionCancelled,
}

impl BillingEventType {
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "payment_succeeded" => Some(Self::PaymentSucceeded),
            "payment_failed" => Some(Self::PaymentFailed),
            "subscription_cancelled" => Some(Self::SubscriptionCancelled),
            _ => None,
        }
    }
}

/// Idempotency ledger row for one provider event. Created on first
/// receipt; `completed` records permanently short-circuit duplicates,
/// `failed` records may be reclaimed by a later delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider_event_id: String,
    pub event_type: String,
    pub processing_status: ProcessingStatus,
    pub received_at: i64,
    pub processed_at: Option<i64>,
    pub last_error: Option<String>,
}
