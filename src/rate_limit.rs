//! Per-identity rate limiting for the validation endpoint.
//!
//! Counters are fixed one-minute windows keyed by (identity hash, window
//! start), incremented atomically in storage so the limit holds across
//! server instances. Over-limit requests get a `system` error with a
//! retry-after hint equal to the window remainder.
//!
//! Configure via RATE_LIMIT_VALIDATE_RPM (default: 30).

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};

pub const WINDOW_SECS: i64 = 60;

/// Windows older than this are dead weight and can be pruned.
pub const COUNTER_RETENTION_SECS: i64 = 10 * WINDOW_SECS;

pub fn window_start(ts: i64) -> i64 {
    ts - ts.rem_euclid(WINDOW_SECS)
}

/// Increment the caller's counter and fail if the window limit is exceeded.
pub fn check_validation_rate(
    conn: &Connection,
    identity_hash: &str,
    limit_per_minute: i64,
    ts: i64,
) -> Result<()> {
    let window = window_start(ts);
    let count = queries::increment_validation_counter(conn, identity_hash, window)?;

    // First hit in a fresh window: sweep counters past retention so the
    // table does not grow by one row per identity per minute forever.
    if count == 1
        && let Err(e) = queries::prune_validation_counters(conn, window - COUNTER_RETENTION_SECS)
    {
        tracing::warn!("Validation counter prune failed: {}", e);
    }

    if count > limit_per_minute {
        let retry_after = window + WINDOW_SECS - ts;
        tracing::warn!(
            "Rate limit exceeded for identity {} ({} in window)",
            &identity_hash[..12.min(identity_hash.len())],
            count
        );
        return Err(AppError::RateLimited {
            retry_after: retry_after.max(1),
        });
    }

    Ok(())
}
