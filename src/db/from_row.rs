//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Like `parse_enum` but for nullable columns.
fn parse_enum_opt<T: std::str::FromStr>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(col)? {
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                col,
                col_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
        None => Ok(None),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const SUBSCRIPTION_COLS: &str = "id, email, installation_token_hash, status, current_period_end, grace_period_until, last_payment_failure_at, validation_count, last_validated_at, created_at, updated_at";

pub const SESSION_COLS: &str = "id, subscription_id, device_fingerprint, device_name, status, end_reason, started_at, last_heartbeat_at, ended_at";

pub const WEBHOOK_EVENT_COLS: &str =
    "provider_event_id, event_type, processing_status, received_at, processed_at, last_error";

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            email: row.get(1)?,
            installation_token_hash: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            current_period_end: row.get(4)?,
            grace_period_until: row.get(5)?,
            last_payment_failure_at: row.get(6)?,
            validation_count: row.get(7)?,
            last_validated_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for DeviceSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DeviceSession {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            device_fingerprint: row.get(2)?,
            device_name: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            end_reason: parse_enum_opt(row, 5, "end_reason")?,
            started_at: row.get(6)?,
            last_heartbeat_at: row.get(7)?,
            ended_at: row.get(8)?,
        })
    }
}

impl FromRow for WebhookEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEvent {
            provider_event_id: row.get(0)?,
            event_type: row.get(1)?,
            processing_status: parse_enum(row, 2, "processing_status")?,
            received_at: row.get(3)?,
            processed_at: row.get(4)?,
            last_error: row.get(5)?,
        })
    }
}
