//! TableTide licensing backend
//!
//! This library provides the server-side core of the TableTide licensing
//! system: subscription state, single-active-device session coordination,
//! billing webhook processing with exactly-once semantics, and the online
//! validation endpoint consumed by POS installations.

pub mod caching;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod util;
