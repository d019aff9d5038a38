mod schema;
pub mod queries;

mod from_row;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Shared secret for billing webhook signature verification
    pub webhook_secret: String,
    /// Expected device heartbeat cadence in seconds
    pub heartbeat_interval_secs: i64,
    /// Days of grace after a payment failure
    pub grace_days: i64,
    /// Per-identity validation requests allowed per minute
    pub validate_rate_limit_per_minute: i64,
}

impl AppState {
    /// A session with no heartbeat for longer than this is abandoned.
    pub fn liveness_window_secs(&self) -> i64 {
        self.heartbeat_interval_secs * 2
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        // Concurrent starts/webhook deliveries hit the same tables; wait
        // out the writer instead of surfacing SQLITE_BUSY to handlers.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")
    });
    Pool::builder().max_size(10).build(manager)
}
