use rusqlite::Connection;

/// Initialize the database schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Subscriptions (never deleted, only status-transitioned)
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            installation_token_hash TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL CHECK (status IN ('trial', 'active', 'past_due', 'grace', 'cancelled', 'expired')),
            current_period_end INTEGER NOT NULL,
            grace_period_until INTEGER,
            last_payment_failure_at INTEGER,
            validation_count INTEGER NOT NULL DEFAULT 0,
            last_validated_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_email ON subscriptions(email);

        -- Device sessions. The partial unique index is the atomic claim
        -- behind the single-active-device invariant: two racing starts
        -- cannot both insert an active row for the same subscription.
        CREATE TABLE IF NOT EXISTS device_sessions (
            id TEXT PRIMARY KEY,
            subscription_id TEXT NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
            device_fingerprint TEXT NOT NULL,
            device_name TEXT,
            status TEXT NOT NULL CHECK (status IN ('active', 'ended')),
            end_reason TEXT CHECK (end_reason IS NULL OR end_reason IN ('released', 'superseded', 'timed_out')),
            started_at INTEGER NOT NULL,
            last_heartbeat_at INTEGER NOT NULL,
            ended_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_device_sessions_one_active
            ON device_sessions(subscription_id) WHERE status = 'active';
        CREATE INDEX IF NOT EXISTS idx_device_sessions_subscription
            ON device_sessions(subscription_id, started_at);

        -- Webhook idempotency ledger. Rows are never deleted in normal
        -- operation; a prune pass removes rows past the retention window.
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider_event_id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            processing_status TEXT NOT NULL CHECK (processing_status IN ('processing', 'completed', 'failed')),
            received_at INTEGER NOT NULL,
            processed_at INTEGER,
            last_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_received ON webhook_events(received_at);

        -- Fixed-window validation counters keyed by (identity, window)
        CREATE TABLE IF NOT EXISTS validation_counters (
            identity_hash TEXT NOT NULL,
            window_start INTEGER NOT NULL,
            count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (identity_hash, window_start)
        );
        "#,
    )
}
