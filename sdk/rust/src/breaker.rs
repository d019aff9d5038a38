//! Circuit breaker guarding calls to the validation authority.
//!
//! A single finite-state machine per backend target. After
//! `failure_threshold` consecutive failures the breaker opens and every
//! call fails fast with a `CircuitOpen` error instead of waiting out a
//! network timeout. Once the open timeout elapses, exactly one probe call
//! is let through; its outcome decides whether the breaker closes or opens
//! again with a fresh timeout.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SdkError;

/// Time source, injected so state transitions are testable without sleeping.
pub trait Clock: Send + Sync {
    /// Current unix timestamp in seconds
    fn now(&self) -> i64;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before allowing a probe
    pub open_timeout_secs: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: 5,
            open_timeout_secs: 30,
        }
    }
}

/// Process-local breaker state. Not persisted; a restart begins closed.
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: i64,
    probe_in_flight: bool,
    probe_started_at: i64,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        CircuitBreaker {
            config,
            clock,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: 0,
            probe_in_flight: false,
            probe_started_at: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Seconds until the next probe is due, if the breaker is open.
    pub fn retry_after_secs(&self) -> Option<i64> {
        match self.state {
            BreakerState::Open => {
                let due = self.opened_at + self.config.open_timeout_secs;
                Some((due - self.clock.now()).max(0))
            }
            _ => None,
        }
    }

    /// Ask permission to attempt the guarded operation. Callers must follow
    /// up with `record_success` or `record_failure`.
    ///
    /// While open and before the probe time this fails fast without the
    /// operation being attempted; once the timeout elapses, exactly one
    /// caller is admitted as the half-open probe.
    ///
    /// A probe whose caller dropped the operation mid-flight never reports
    /// an outcome, so its claim lapses after the open timeout and a later
    /// call is admitted as a fresh probe.
    pub fn try_call(&mut self) -> Result<(), SdkError> {
        let now = self.clock.now();
        match self.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                if now >= self.opened_at + self.config.open_timeout_secs {
                    self.state = BreakerState::HalfOpen;
                    self.claim_probe(now);
                    Ok(())
                } else {
                    Err(SdkError::circuit_open())
                }
            }
            BreakerState::HalfOpen => {
                if self.probe_in_flight
                    && now < self.probe_started_at + self.config.open_timeout_secs
                {
                    Err(SdkError::circuit_open())
                } else {
                    self.claim_probe(now);
                    Ok(())
                }
            }
        }
    }

    fn claim_probe(&mut self, now: i64) {
        self.probe_in_flight = true;
        self.probe_started_at = now;
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.probe_in_flight = false;
    }

    pub fn record_failure(&mut self) {
        self.probe_in_flight = false;
        match self.state {
            BreakerState::HalfOpen => {
                // Failed probe: open again with a fresh timeout
                self.open();
            }
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            BreakerState::Open => {}
        }
    }

    fn open(&mut self) {
        self.state = BreakerState::Open;
        self.opened_at = self.clock.now();
    }
}
