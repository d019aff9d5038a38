use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Shared secret for verifying billing-provider webhook signatures
    pub webhook_secret: String,
    /// Expected device heartbeat cadence in seconds
    pub heartbeat_interval_secs: i64,
    /// Days of trial granted to a newly provisioned subscription
    pub trial_days: i64,
    /// Days of grace granted after a payment failure
    pub grace_days: i64,
    /// Per-identity validation requests allowed per minute
    pub validate_rate_limit_per_minute: i64,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TABLETIDE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tabletide.db".to_string()),
            webhook_secret: env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-webhook-secret".to_string()),
            heartbeat_interval_secs: env_i64("HEARTBEAT_INTERVAL_SECS", 30),
            trial_days: env_i64("TRIAL_DAYS", 14),
            grace_days: env_i64("GRACE_DAYS", 7),
            validate_rate_limit_per_minute: env_i64("RATE_LIMIT_VALIDATE_RPM", 30),
            dev_mode,
        }
    }

    /// A session with no heartbeat for longer than this is abandoned
    /// (two missed intervals).
    pub fn liveness_window_secs(&self) -> i64 {
        self.heartbeat_interval_secs * 2
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
