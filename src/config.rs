//! Process configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` builds one `ServerConfig` at start-up and hands the pieces to the
//! components that own them. Subsystems with their own knobs (tier limits,
//! LLM providers) parse those next to the code that uses them, sharing the
//! `env_parse` helper below.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ADMISSION_STORE_TIMEOUT_MS: u64 = 1500;
const DEFAULT_DISPATCH_MAX_IN_FLIGHT: usize = 64;
const DEFAULT_BUCKET_REAP_INTERVAL_SECS: u64 = 300;
const DEFAULT_BUCKET_REAP_GRACE_SECS: u64 = 3600;
const DEFAULT_STALE_REQUEST_SECS: u64 = 900;

/// Parse `key` from the environment, falling back to `default` when the
/// variable is unset or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Top-level server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    /// Upper bound on any single admission-store round trip.
    pub admission_store_timeout: Duration,
    /// Maximum provider calls the dispatcher runs at once.
    pub dispatch_max_in_flight: usize,
    pub bucket_reap_interval: Duration,
    /// How long past `expires_at` a rate bucket is kept before reaping.
    pub bucket_reap_grace: Duration,
    /// Age after which a `pending`/`processing` request is failed by the
    /// reaper. Must exceed the provider timeout plus dispatch queueing.
    pub stale_request_after: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
}

impl ServerConfig {
    /// Load settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            admission_store_timeout: Duration::from_millis(env_parse(
                "ADMISSION_STORE_TIMEOUT_MS",
                DEFAULT_ADMISSION_STORE_TIMEOUT_MS,
            )),
            dispatch_max_in_flight: env_parse("DISPATCH_MAX_IN_FLIGHT", DEFAULT_DISPATCH_MAX_IN_FLIGHT).max(1),
            bucket_reap_interval: Duration::from_secs(
                env_parse("BUCKET_REAP_INTERVAL_SECS", DEFAULT_BUCKET_REAP_INTERVAL_SECS).max(1),
            ),
            bucket_reap_grace: Duration::from_secs(env_parse("BUCKET_REAP_GRACE_SECS", DEFAULT_BUCKET_REAP_GRACE_SECS)),
            stale_request_after: Duration::from_secs(
                env_parse("STALE_REQUEST_SECS", DEFAULT_STALE_REQUEST_SECS).max(1),
            ),
        })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
