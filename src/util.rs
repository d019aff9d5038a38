//! Shared utility functions for the TableTide backend.

pub const SECONDS_PER_DAY: i64 = 86400;

/// Deadline `days` from `base_time`.
pub fn days_from(base_time: i64, days: i64) -> i64 {
    base_time + days * SECONDS_PER_DAY
}

/// Redact an email for logs: keep the first character and the domain.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().unwrap();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}
