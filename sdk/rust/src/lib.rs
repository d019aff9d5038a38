//! # TableTide SDK
//!
//! Rust client for TableTide — license validation and device-session
//! coordination for restaurant POS installations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabletide_sdk::{Tabletide, TabletideOptions, ValidateOptions, ValidationOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Tabletide::new(
//!         "https://license.tabletide.example",
//!         "owner@bistro.test",
//!         "tt_installation_token",
//!         TabletideOptions {
//!             device_name: Some("Front counter".into()),
//!             ..Default::default()
//!         },
//!     )?;
//!
//!     // Works through outages: the outcome says which tier answered
//!     match client.validate(ValidateOptions::default()).await? {
//!         ValidationOutcome::Live(r) => println!("live: valid={}", r.validation.valid),
//!         ValidationOutcome::Cache { result, .. } => println!("cached: valid={}", result.valid),
//!         ValidationOutcome::Fallback { recheck_by, .. } => {
//!             println!("provisional until {}", recheck_by)
//!         }
//!         ValidationOutcome::Offline { retry_after_seconds } => {
//!             println!("offline, retry in {}s", retry_after_seconds)
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Offline-Tolerant Design
//!
//! - Validation runs a cache → live → fallback → offline ladder; loss of
//!   connectivity never surfaces as an error while a recent answer exists
//! - A circuit breaker bounds latency against a failing server: once open,
//!   calls fail fast instead of waiting out timeouts
//! - Cached results persist via a pluggable [`StorageAdapter`]
//!   (`MemoryStorage`, `FileStorage`)
//! - Exactly one device holds the license at a time; conflicts carry the
//!   holding device's metadata so the user can be offered a takeover

pub mod breaker;
pub mod cache;
pub mod client;
pub mod device;
pub mod error;
pub mod storage;
pub mod types;

// Main client
pub use client::{
    HttpTransport, Tabletide, TabletideOptions, ValidationTransport, HEARTBEAT_TIMEOUT,
    VALIDATE_TIMEOUT,
};

// Error types
pub use error::{Result, SdkError, SdkErrorCode};

// Breaker
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, Clock, SystemClock};

// Cache
pub use cache::{CacheConfig, CacheEntry, FallbackCache};

// Storage
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};

// Types
pub use types::{
    CacheStrategy, CachedValidation, ConflictInfo, HeartbeatResponse, Identity, SessionBlock,
    SubscriptionStatus, TakeoverResponse, ValidateOptions, ValidateRequest, ValidateResponse,
    ValidationOutcome,
};

// Device utilities
pub use device::{generate_uuid, machine_fingerprint};
