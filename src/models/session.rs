use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            _ => Err(()),
        }
    }
}

/// Why a session stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Explicit end by the owning device
    Released,
    /// Another device took over the license
    Superseded,
    /// No heartbeat within the liveness window
    TimedOut,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::Superseded => "superseded",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::str::FromStr for EndReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "released" => Ok(Self::Released),
            "superseded" => Ok(Self::Superseded),
            "timed_out" => Ok(Self::TimedOut),
            _ => Err(()),
        }
    }
}

/// One device's hold on a subscription. At most one session per
/// subscription is `active` at any instant (enforced by a partial
/// unique index in the schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
    pub id: String,
    pub subscription_id: String,
    pub device_fingerprint: String,
    pub device_name: Option<String>,
    pub status: SessionStatus,
    pub end_reason: Option<EndReason>,
    pub started_at: i64,
    pub last_heartbeat_at: i64,
    pub ended_at: Option<i64>,
}
