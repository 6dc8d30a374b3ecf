//! Application settings loaded from `config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Durations are written as whole seconds or milliseconds in the file and
//! converted to [`DispatcherConfig`] at startup.

use crate::dispatcher::{DispatcherConfig, RetryPolicy};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "LOYALTY_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Price of one campaign in ledger credits
    pub price_per_campaign: i64,
    /// Credits granted once when a seller first appears
    pub free_signup_credits: i64,
    /// Delivery worker settings
    pub dispatcher: DispatcherSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            price_per_campaign: 1,
            free_signup_credits: 3,
            dispatcher: DispatcherSettings::default(),
        }
    }
}

/// `[dispatcher]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Concurrent workers polling the queue
    pub worker_count: usize,
    /// Rows claimed per batch
    pub batch_size: u64,
    /// Sleep between polls when the queue is empty
    pub poll_interval_ms: u64,
    /// Claim lease; an unfinished claim becomes eligible again after this
    pub lease_seconds: u64,
    /// Longest wait for one send; must be shorter than the lease
    pub send_timeout_seconds: u64,
    /// Attempt ceiling before a transient failure becomes terminal
    pub max_attempts: u32,
    /// Backoff base
    pub retry_base_seconds: u64,
    /// Backoff cap
    pub retry_max_seconds: u64,
    /// Relative jitter applied to each backoff (0.0 - 1.0)
    pub jitter_factor: f64,
    /// Outbound messages per second per shop
    pub shop_rate_per_second: u32,
    /// Sends in flight per worker
    pub max_concurrent_sends: usize,
    /// Grace period for workers on shutdown
    pub shutdown_timeout_seconds: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            worker_count: 2,
            batch_size: 50,
            poll_interval_ms: 1000,
            lease_seconds: 300,
            send_timeout_seconds: 30,
            max_attempts: 5,
            retry_base_seconds: 30,
            retry_max_seconds: 3600,
            jitter_factor: 0.25,
            shop_rate_per_second: 25,
            max_concurrent_sends: 8,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Largest accepted backoff cap (30 days)
const MAX_RETRY_SECONDS: u64 = 30 * 24 * 60 * 60;

impl DispatcherSettings {
    /// Converts file settings into the runtime dispatcher configuration.
    ///
    /// Counts of zero are raised to one.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when `jitter_factor` is not a number in
    /// `0.0..=1.0`, `retry_max_seconds` exceeds 30 days, or the send timeout
    /// is not shorter than the lease.
    pub fn to_dispatcher_config(&self) -> Result<DispatcherConfig> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(Error::Config {
                message: format!(
                    "dispatcher.jitter_factor must be between 0.0 and 1.0, got {}",
                    self.jitter_factor
                ),
            });
        }
        if self.retry_max_seconds > MAX_RETRY_SECONDS {
            return Err(Error::Config {
                message: format!(
                    "dispatcher.retry_max_seconds must be at most {MAX_RETRY_SECONDS}, got {}",
                    self.retry_max_seconds
                ),
            });
        }
        let send_timeout_seconds = self.send_timeout_seconds.max(1);
        if send_timeout_seconds >= self.lease_seconds {
            return Err(Error::Config {
                message: format!(
                    "dispatcher.send_timeout_seconds ({send_timeout_seconds}) must be shorter than lease_seconds ({})",
                    self.lease_seconds
                ),
            });
        }

        Ok(DispatcherConfig {
            worker_count: self.worker_count.max(1),
            batch_size: self.batch_size.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            lease_duration: Duration::from_secs(self.lease_seconds),
            send_timeout: Duration::from_secs(send_timeout_seconds),
            retry_policy: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_secs(self.retry_base_seconds.min(MAX_RETRY_SECONDS)),
                max_delay: Duration::from_secs(self.retry_max_seconds),
                jitter_factor: self.jitter_factor,
            },
            shop_rate_per_second: self.shop_rate_per_second,
            max_concurrent_sends: self.max_concurrent_sends.max(1),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        })
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

/// Loads `$LOYALTY_CONFIG` or `./config.toml`, falling back to defaults when
/// the file does not exist.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        let config = load_config(&path)?;
        info!(path = %path, "Loaded configuration file");
        Ok(config)
    } else {
        info!(path = %path, "No configuration file found, using defaults");
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r"
            price_per_campaign = 100
            free_signup_credits = 0

            [dispatcher]
            worker_count = 4
            batch_size = 10
            lease_seconds = 60
            max_attempts = 3
            retry_base_seconds = 5
            retry_max_seconds = 600
            jitter_factor = 0.0
            shop_rate_per_second = 10
        ";

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.price_per_campaign, 100);
        assert_eq!(config.free_signup_credits, 0);
        assert_eq!(config.dispatcher.worker_count, 4);
        assert_eq!(config.dispatcher.max_attempts, 3);

        let runtime = config.dispatcher.to_dispatcher_config().unwrap();
        assert_eq!(runtime.batch_size, 10);
        assert_eq!(runtime.lease_duration, Duration::from_secs(60));
        assert_eq!(runtime.retry_policy.base_delay, Duration::from_secs(5));
        assert_eq!(runtime.retry_policy.max_delay, Duration::from_secs(600));
        assert_eq!(runtime.retry_policy.jitter_factor, 0.0);
        assert_eq!(runtime.shop_rate_per_second, 10);
        // untouched keys keep their defaults
        assert_eq!(runtime.max_concurrent_sends, 8);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.price_per_campaign, 1);
        assert_eq!(config.free_signup_credits, 3);

        let runtime = config.dispatcher.to_dispatcher_config().unwrap();
        assert_eq!(runtime.retry_policy.max_attempts, 5);
        assert_eq!(runtime.retry_policy.base_delay, Duration::from_secs(30));
        assert_eq!(runtime.retry_policy.max_delay, Duration::from_secs(3600));
        assert_eq!(runtime.lease_duration, Duration::from_secs(300));
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let toml_str = r"
            [dispatcher]
            worker_count = 0
            batch_size = 0
            max_attempts = 0
        ";
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let runtime = config.dispatcher.to_dispatcher_config().unwrap();
        assert_eq!(runtime.worker_count, 1);
        assert_eq!(runtime.batch_size, 1);
        assert_eq!(runtime.retry_policy.max_attempts, 1);
    }

    #[test]
    fn test_out_of_range_dispatcher_values_are_rejected() {
        for toml_str in [
            "[dispatcher]\njitter_factor = nan",
            "[dispatcher]\njitter_factor = 1.5",
            "[dispatcher]\njitter_factor = -0.1",
            "[dispatcher]\nretry_max_seconds = 9223372036854775807",
            "[dispatcher]\nlease_seconds = 30\nsend_timeout_seconds = 30",
        ] {
            let config: AppConfig = toml::from_str(toml_str).unwrap();
            assert!(
                matches!(
                    config.dispatcher.to_dispatcher_config(),
                    Err(Error::Config { .. })
                ),
                "accepted {toml_str:?}"
            );
        }
    }

    #[test]
    fn test_send_timeout_defaults_below_lease() {
        let runtime = AppConfig::default().dispatcher.to_dispatcher_config().unwrap();
        assert_eq!(runtime.send_timeout, Duration::from_secs(30));
        assert!(runtime.send_timeout < runtime.lease_duration);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = std::env::temp_dir().join("loyalty_courier_bad_config.toml");
        std::fs::write(&dir, "price_per_campaign = \"lots\"").unwrap();
        let result = load_config(&dir);
        assert!(matches!(result, Err(Error::Config { .. })));
        let _ = std::fs::remove_file(&dir);
    }
}
