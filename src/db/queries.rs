use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use uuid::Uuid;

use crate::crypto::hash_secret;
use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    query_all, query_one, SESSION_COLS, SUBSCRIPTION_COLS, WEBHOOK_EVENT_COLS,
};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// High-entropy installation token handed to a POS install once at
/// provisioning time. Only its hash is stored.
pub fn generate_installation_token() -> String {
    format!(
        "tt_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

// ============ Subscriptions ============

/// Create a trial subscription and return it with the raw installation token.
pub fn create_subscription(
    conn: &Connection,
    input: &CreateSubscription,
) -> Result<(Subscription, String)> {
    let id = gen_id();
    let token = generate_installation_token();
    let ts = now();
    let period_end = ts + input.trial_days * 86400;

    conn.execute(
        "INSERT INTO subscriptions (id, email, installation_token_hash, status, current_period_end, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'trial', ?4, ?5, ?5)",
        params![id, input.email, hash_secret(&token), period_end, ts],
    )?;

    let subscription = get_subscription_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Subscription not found after insert".into()))?;
    Ok((subscription, token))
}

pub fn get_subscription_by_id(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscriptions WHERE id = ?1", SUBSCRIPTION_COLS),
        &[&id],
    )
}

/// Look up the subscription a validating identity belongs to. Both the
/// email and the token hash must match; a token alone is not enough.
pub fn get_subscription_by_identity(
    conn: &Connection,
    email: &str,
    installation_token: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE email = ?1 AND installation_token_hash = ?2",
            SUBSCRIPTION_COLS
        ),
        &[&email, &hash_secret(installation_token)],
    )
}

/// Billing transition: payment confirmed. Clears any grace window and
/// advances the paid period if the payload carried one.
pub fn apply_payment_succeeded(
    conn: &Connection,
    subscription_id: &str,
    period_end: Option<i64>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions
         SET status = 'active',
             grace_period_until = NULL,
             current_period_end = COALESCE(?2, current_period_end),
             updated_at = ?3
         WHERE id = ?1",
        params![subscription_id, period_end, now()],
    )?;
    Ok(affected > 0)
}

/// Billing transition: payment failed. Starts the grace window.
pub fn apply_payment_failed(
    conn: &Connection,
    subscription_id: &str,
    grace_until: i64,
) -> Result<bool> {
    let ts = now();
    let affected = conn.execute(
        "UPDATE subscriptions
         SET status = 'past_due',
             grace_period_until = ?2,
             last_payment_failure_at = ?3,
             updated_at = ?3
         WHERE id = ?1",
        params![subscription_id, grace_until, ts],
    )?;
    Ok(affected > 0)
}

/// Billing transition: subscription cancelled.
pub fn apply_cancellation(conn: &Connection, subscription_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'cancelled', updated_at = ?2 WHERE id = ?1",
        params![subscription_id, now()],
    )?;
    Ok(affected > 0)
}

/// Time-based transitions applied at validation time. Webhooks remain the
/// only path into active/past_due/cancelled; this walk only expires trials,
/// moves past_due into grace once the paid period lapses, and expires
/// anything past its grace deadline.
pub fn apply_time_transitions(
    conn: &Connection,
    subscription: &Subscription,
    ts: i64,
) -> Result<Subscription> {
    let new_status = match subscription.status {
        SubscriptionStatus::Trial if ts > subscription.current_period_end => {
            Some(SubscriptionStatus::Expired)
        }
        SubscriptionStatus::PastDue => match subscription.grace_period_until {
            Some(grace) if ts > grace => Some(SubscriptionStatus::Expired),
            _ if ts > subscription.current_period_end => Some(SubscriptionStatus::Grace),
            _ => None,
        },
        SubscriptionStatus::Grace => match subscription.grace_period_until {
            Some(grace) if ts > grace => Some(SubscriptionStatus::Expired),
            // Grace without a deadline shouldn't happen; expire rather than
            // grant open-ended access.
            None => Some(SubscriptionStatus::Expired),
            _ => None,
        },
        _ => None,
    };

    match new_status {
        Some(status) => {
            conn.execute(
                "UPDATE subscriptions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![subscription.id, status.as_str(), ts],
            )?;
            let mut updated = subscription.clone();
            updated.status = status;
            updated.updated_at = ts;
            Ok(updated)
        }
        None => Ok(subscription.clone()),
    }
}

pub fn record_validation(conn: &Connection, subscription_id: &str, ts: i64) -> Result<()> {
    conn.execute(
        "UPDATE subscriptions
         SET validation_count = validation_count + 1, last_validated_at = ?2
         WHERE id = ?1",
        params![subscription_id, ts],
    )?;
    Ok(())
}

// ============ Device sessions ============

/// Outcome of a session start attempt.
#[derive(Debug)]
pub enum SessionStart {
    /// No live session existed; this device now holds the license
    Started(DeviceSession),
    /// The same device reconnected to its own live session
    Resumed(DeviceSession),
    /// A different device holds a live session
    Conflict(DeviceSession),
}

#[derive(Debug)]
pub enum HeartbeatOutcome {
    Alive(DeviceSession),
    /// Session was superseded, ended, or missed too many heartbeats
    Expired,
}

pub fn get_session_by_id(conn: &Connection, session_id: &str) -> Result<Option<DeviceSession>> {
    query_one(
        conn,
        &format!("SELECT {} FROM device_sessions WHERE id = ?1", SESSION_COLS),
        &[&session_id],
    )
}

pub fn get_active_session(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Option<DeviceSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM device_sessions WHERE subscription_id = ?1 AND status = 'active'",
            SESSION_COLS
        ),
        &[&subscription_id],
    )
}

/// Session history, newest first. Surfaces takeover/timeout audit data.
pub fn list_sessions(conn: &Connection, subscription_id: &str) -> Result<Vec<DeviceSession>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM device_sessions WHERE subscription_id = ?1 ORDER BY started_at DESC, ended_at DESC",
            SESSION_COLS
        ),
        &[&subscription_id],
    )
}

/// End the active session if its holder stopped heartbeating. Frees the
/// unique-index slot so a new `start` can claim it.
fn reap_stale_session(conn: &Connection, subscription_id: &str, stale_before: i64) -> Result<()> {
    let reaped = conn.execute(
        "UPDATE device_sessions
         SET status = 'ended', end_reason = 'timed_out', ended_at = ?3
         WHERE subscription_id = ?1 AND status = 'active' AND last_heartbeat_at < ?2",
        params![subscription_id, stale_before, now()],
    )?;
    if reaped > 0 {
        tracing::info!(
            subscription_id,
            "Reaped abandoned session (no heartbeat since before {})",
            stale_before
        );
    }
    Ok(())
}

fn insert_active_session(
    conn: &Connection,
    subscription_id: &str,
    device_fingerprint: &str,
    device_name: Option<&str>,
    ts: i64,
) -> std::result::Result<String, rusqlite::Error> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO device_sessions (id, subscription_id, device_fingerprint, device_name, status, started_at, last_heartbeat_at)
         VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
        params![id, subscription_id, device_fingerprint, device_name, ts],
    )?;
    Ok(id)
}

/// Start (or resume) a session for a device.
///
/// Runs inside an immediate transaction so racing starts serialize: of N
/// concurrent starts, exactly one inserts and each of the rest observes
/// either the winner's row (`Conflict`) or, if the winner already released
/// it, a free slot it claims itself. The partial unique index on active
/// sessions backstops the invariant at the storage level.
pub fn start_session(
    conn: &mut Connection,
    subscription_id: &str,
    device_fingerprint: &str,
    device_name: Option<&str>,
    liveness_window_secs: i64,
) -> Result<SessionStart> {
    let ts = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    reap_stale_session(&tx, subscription_id, ts - liveness_window_secs)?;

    let outcome = match get_active_session(&tx, subscription_id)? {
        Some(existing) if existing.device_fingerprint == device_fingerprint => {
            tx.execute(
                "UPDATE device_sessions SET last_heartbeat_at = ?2 WHERE id = ?1 AND status = 'active'",
                params![existing.id, ts],
            )?;
            let refreshed = get_session_by_id(&tx, &existing.id)?
                .ok_or_else(|| AppError::Internal("Session vanished during resume".into()))?;
            SessionStart::Resumed(refreshed)
        }
        Some(existing) => SessionStart::Conflict(existing),
        None => {
            let id =
                insert_active_session(&tx, subscription_id, device_fingerprint, device_name, ts)?;
            let session = get_session_by_id(&tx, &id)?
                .ok_or_else(|| AppError::Internal("Session not found after insert".into()))?;
            SessionStart::Started(session)
        }
    };

    tx.commit()?;
    Ok(outcome)
}

/// Conditional heartbeat write. A session that was superseded, explicitly
/// ended, or is past the liveness window gets `Expired`, forcing the
/// device to restart its session.
pub fn heartbeat_session(
    conn: &Connection,
    session_id: &str,
    liveness_window_secs: i64,
) -> Result<HeartbeatOutcome> {
    let ts = now();
    let affected = conn.execute(
        "UPDATE device_sessions
         SET last_heartbeat_at = ?2
         WHERE id = ?1 AND status = 'active' AND last_heartbeat_at >= ?3",
        params![session_id, ts, ts - liveness_window_secs],
    )?;

    if affected == 1 {
        let session = get_session_by_id(conn, session_id)?
            .ok_or_else(|| AppError::Internal("Session vanished during heartbeat".into()))?;
        return Ok(HeartbeatOutcome::Alive(session));
    }

    // Still marked active but past the liveness window: close it out so
    // the slot is free for the next start.
    conn.execute(
        "UPDATE device_sessions
         SET status = 'ended', end_reason = 'timed_out', ended_at = ?2
         WHERE id = ?1 AND status = 'active'",
        params![session_id, ts],
    )?;

    Ok(HeartbeatOutcome::Expired)
}

/// Explicit end by the owning device.
pub fn end_session(conn: &Connection, session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE device_sessions
         SET status = 'ended', end_reason = 'released', ended_at = ?2
         WHERE id = ?1 AND status = 'active'",
        params![session_id, now()],
    )?;
    Ok(affected > 0)
}

/// User-confirmed takeover: ends the previous session (superseded) and
/// starts a new one for the requesting device in a single immediate
/// transaction. The only path that overrides a live session.
pub fn takeover_session(
    conn: &mut Connection,
    subscription_id: &str,
    device_fingerprint: &str,
    device_name: Option<&str>,
) -> Result<DeviceSession> {
    let ts = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "UPDATE device_sessions
         SET status = 'ended', end_reason = 'superseded', ended_at = ?2
         WHERE subscription_id = ?1 AND status = 'active'",
        params![subscription_id, ts],
    )?;

    let id = insert_active_session(&tx, subscription_id, device_fingerprint, device_name, ts)?;
    let session = get_session_by_id(&tx, &id)?
        .ok_or_else(|| AppError::Internal("Session not found after takeover".into()))?;

    tx.commit()?;
    Ok(session)
}

// ============ Webhook idempotency ledger ============

/// Result of the first-writer-wins claim on a provider event id.
#[derive(Debug, PartialEq, Eq)]
pub enum EventClaim {
    /// This delivery owns the event and must apply + mark it
    Claimed,
    /// A previous delivery completed the event; nothing to do
    Duplicate,
    /// Another delivery currently owns the event
    InFlight,
}

pub fn get_webhook_event(
    conn: &Connection,
    provider_event_id: &str,
) -> Result<Option<WebhookEvent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE provider_event_id = ?1",
            WEBHOOK_EVENT_COLS
        ),
        &[&provider_event_id],
    )
}

/// Atomically claim a provider event. Duplicates are the common case under
/// provider retry policies, so the duplicate path is a single keyed lookup.
/// A `failed` record may be reclaimed (the earlier attempt is allowed to
/// retry); `completed` never is.
pub fn claim_webhook_event(
    conn: &Connection,
    provider_event_id: &str,
    event_type: &str,
) -> Result<EventClaim> {
    let ts = now();
    let inserted = conn.execute(
        "INSERT INTO webhook_events (provider_event_id, event_type, processing_status, received_at)
         VALUES (?1, ?2, 'processing', ?3)
         ON CONFLICT(provider_event_id) DO NOTHING",
        params![provider_event_id, event_type, ts],
    )?;
    if inserted == 1 {
        return Ok(EventClaim::Claimed);
    }

    let existing = get_webhook_event(conn, provider_event_id)?
        .ok_or_else(|| AppError::Internal("Ledger row vanished after claim".into()))?;

    match existing.processing_status {
        ProcessingStatus::Completed => Ok(EventClaim::Duplicate),
        ProcessingStatus::Processing => Ok(EventClaim::InFlight),
        ProcessingStatus::Failed => {
            let reclaimed = conn.execute(
                "UPDATE webhook_events
                 SET processing_status = 'processing', received_at = ?2, last_error = NULL
                 WHERE provider_event_id = ?1 AND processing_status = 'failed'",
                params![provider_event_id, ts],
            )?;
            if reclaimed == 1 {
                Ok(EventClaim::Claimed)
            } else {
                Ok(EventClaim::InFlight)
            }
        }
    }
}

pub fn complete_webhook_event(conn: &Connection, provider_event_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events
         SET processing_status = 'completed', processed_at = ?2
         WHERE provider_event_id = ?1",
        params![provider_event_id, now()],
    )?;
    Ok(())
}

/// A failed record does not block reprocessing: a future delivery of the
/// same event id retries from the claim step.
pub fn fail_webhook_event(conn: &Connection, provider_event_id: &str, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events
         SET processing_status = 'failed', processed_at = ?2, last_error = ?3
         WHERE provider_event_id = ?1",
        params![provider_event_id, now(), error],
    )?;
    Ok(())
}

/// Retention sweep: ledger rows are audit data, pruned after 90 days.
pub fn prune_webhook_events(conn: &Connection, received_before: i64) -> Result<usize> {
    let pruned = conn.execute(
        "DELETE FROM webhook_events WHERE received_at < ?1",
        params![received_before],
    )?;
    Ok(pruned)
}

// ============ Validation counters ============

/// Atomic increment-and-read for the fixed-window rate limiter.
pub fn increment_validation_counter(
    conn: &Connection,
    identity_hash: &str,
    window_start: i64,
) -> Result<i64> {
    conn.query_row(
        "INSERT INTO validation_counters (identity_hash, window_start, count)
         VALUES (?1, ?2, 1)
         ON CONFLICT(identity_hash, window_start) DO UPDATE SET count = count + 1
         RETURNING count",
        params![identity_hash, window_start],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn prune_validation_counters(conn: &Connection, window_before: i64) -> Result<usize> {
    let pruned = conn.execute(
        "DELETE FROM validation_counters WHERE window_start < ?1",
        params![window_before],
    )?;
    Ok(pruned)
}
