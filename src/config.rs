//! Environment-driven configuration.
//!
//! Mirrors the teacher's `std::env::var(...).unwrap_or_else(...)` /
//! `.ok().and_then(|s| s.parse().ok()).unwrap_or(default)` chains, but
//! collected into one struct with a typed failure mode for the variables
//! that are actually required (spec §6).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub worker_name: String,
    pub spreadsheet_id: String,
    pub service_account_file: PathBuf,

    pub poll_interval: Duration,
    pub base_interval: Duration,
    pub claim_ttl: Duration,
    pub active_window: Duration,
    pub lease_ttl: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        Ok(_) => Err(ConfigError::EmptyVar(name)),
        Err(_) => Err(ConfigError::MissingVar(name)),
    }
}

fn optional_secs(name: &str, default_secs: f64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| *v >= 0.0)
        .unwrap_or(default_secs);
    Duration::from_secs_f64(secs)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            worker_name: required("WORKER_NAME")?,
            spreadsheet_id: required("SPREADSHEET_ID")?,
            service_account_file: PathBuf::from(required("SERVICE_ACCOUNT_FILE")?),
            poll_interval: optional_secs("POLL_INTERVAL_SECS", 5.0),
            base_interval: optional_secs("BASE_INTERVAL_SECS", 1.0),
            claim_ttl: optional_secs("CLAIM_TTL_SECS", 15.0 * 60.0),
            active_window: optional_secs("ACTIVE_WINDOW_SECS", 120.0),
            lease_ttl: optional_secs("LEASE_TTL_SECS", 300.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global, so tests that touch them
    // serialize through this lock instead of relying on test-harness luck.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn missing_required_var_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("WORKER_NAME");
        std::env::remove_var("SPREADSHEET_ID");
        std::env::remove_var("SERVICE_ACCOUNT_FILE");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("WORKER_NAME")));
    }

    #[test]
    fn optional_overrides_fall_back_on_garbage() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("WORKER_NAME", "alpha");
        std::env::set_var("SPREADSHEET_ID", "sheet-1");
        std::env::set_var("SERVICE_ACCOUNT_FILE", "/tmp/sa.json");
        std::env::set_var("POLL_INTERVAL_SECS", "not-a-number");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs_f64(5.0));
        std::env::remove_var("WORKER_NAME");
        std::env::remove_var("SPREADSHEET_ID");
        std::env::remove_var("SERVICE_ACCOUNT_FILE");
        std::env::remove_var("POLL_INTERVAL_SECS");
    }
}
