//! Environment-variable configuration, loaded once at startup.
//!
//! Field names and defaults are grounded on
//! `original_source/app/core/config.py`'s `Settings` model; loading
//! itself uses `config` + `dotenvy`, the combination every `ro2-*`
//! binary's `Cargo.toml` pulls in for this purpose.

use std::collections::HashMap;
use std::time::Duration;

use config::Environment;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be a valid integer, got {1:?}")]
    BadInt(&'static str, String),
    #[error("{0} must be a valid number, got {1:?}")]
    BadFloat(&'static str, String),
    #[error("SIA_ACCOUNTS and SIA_KEYS declare {accounts} accounts but {keys} keys")]
    AccountKeyMismatch { accounts: usize, keys: usize },
    #[error("account key for {account:?} must be 16, 24, or 32 ASCII bytes, got {len}")]
    BadKeyLength { account: String, len: usize },
    #[error("APP_TIMEZONE {0:?} is not a valid IANA timezone name")]
    InvalidTimezone(String),
    #[error("failed to read environment: {0}")]
    Source(#[from] config::ConfigError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,

    pub sia_host: String,
    pub sia_port: u16,
    pub sia_accounts: Vec<String>,
    /// Parallel to `sia_accounts`; an empty string means unencrypted.
    pub sia_keys: Vec<String>,
    pub sia_allowed_timeband: Duration,
    /// Idle timeout before a connection with no frames is closed.
    pub sia_idle_timeout: Duration,

    pub forward_url: String,
    pub forward_auth_header: String,
    pub forward_cookie: String,
    pub forward_timeout: Duration,
    pub forward_max_retries: u32,
    pub forward_retry_base_delay: Duration,
    pub forward_extra_headers: HashMap<String, String>,

    pub app_timezone: String,
    pub heartbeat_codes: Vec<String>,

    /// Bounded queue capacity between receiver and forward worker.
    /// Not a named env var in the original (which used an unbounded
    /// queue); see DESIGN.md for why this expansion bounds it.
    pub queue_capacity: usize,
    /// How long the accept loop waits for the queue to drain on shutdown.
    pub shutdown_drain_timeout: Duration,

    /// Bind address for the admin HTTP surface (§6.3).
    pub admin_bind: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let source = config::Config::builder()
            .add_source(Environment::default())
            .build()?;

        let get = |key: &str, default: &str| -> String {
            source
                .get_string(key)
                .unwrap_or_else(|_| default.to_string())
        };

        let sia_port = parse_u16("SIA_PORT", &get("SIA_PORT", "65100"))?;
        let sia_accounts = split_csv(&get("SIA_ACCOUNTS", "AAA"));
        let sia_keys = split_csv_allow_empty(&get("SIA_KEYS", ""));
        if !sia_keys.is_empty() && sia_keys.len() != sia_accounts.len() {
            return Err(ConfigError::AccountKeyMismatch {
                accounts: sia_accounts.len(),
                keys: sia_keys.len(),
            });
        }
        for (account, key) in sia_accounts.iter().zip(sia_keys.iter()) {
            if !key.is_empty() && !matches!(key.len(), 16 | 24 | 32) {
                return Err(ConfigError::BadKeyLength {
                    account: account.clone(),
                    len: key.len(),
                });
            }
        }

        let sia_allowed_timeband = Duration::from_secs(parse_u64(
            "SIA_ALLOWED_TIMEBAND",
            &get("SIA_ALLOWED_TIMEBAND", "600"),
        )?);
        let sia_idle_timeout =
            Duration::from_secs(parse_u64("SIA_IDLE_TIMEOUT", &get("SIA_IDLE_TIMEOUT", "30"))?);

        let forward_timeout = Duration::from_secs_f64(parse_f64(
            "FORWARD_TIMEOUT",
            &get("FORWARD_TIMEOUT", "5"),
        )?);
        let forward_max_retries =
            parse_u32("FORWARD_MAX_RETRIES", &get("FORWARD_MAX_RETRIES", "5"))?;
        let forward_retry_base_delay = Duration::from_secs_f64(parse_f64(
            "FORWARD_RETRY_BASE_DELAY",
            &get("FORWARD_RETRY_BASE_DELAY", "0.5"),
        )?);
        let forward_extra_headers = parse_extra_headers(&get("FORWARD_EXTRA_HEADERS", ""));

        let heartbeat_codes = split_csv(&get("HEARTBEAT_CODES", ""));

        let queue_capacity =
            parse_usize("QUEUE_CAPACITY", &get("QUEUE_CAPACITY", "1024"))?;
        let shutdown_drain_timeout = Duration::from_secs(parse_u64(
            "SHUTDOWN_DRAIN_TIMEOUT",
            &get("SHUTDOWN_DRAIN_TIMEOUT", "3"),
        )?);

        let app_timezone = get("APP_TIMEZONE", "Asia/Jakarta");
        validate_timezone(&app_timezone)?;

        Ok(Self {
            log_level: get("LOG_LEVEL", "info"),
            sia_host: get("SIA_HOST", ""),
            sia_port,
            sia_accounts,
            sia_keys,
            sia_allowed_timeband,
            sia_idle_timeout,
            forward_url: get("FORWARD_URL", "http://localhost:9000/ingest"),
            forward_auth_header: get("FORWARD_AUTH_HEADER", ""),
            forward_cookie: get("FORWARD_COOKIE", ""),
            forward_timeout,
            forward_max_retries,
            forward_retry_base_delay,
            forward_extra_headers,
            app_timezone,
            heartbeat_codes,
            queue_capacity,
            shutdown_drain_timeout,
            admin_bind: get("ADMIN_BIND", "0.0.0.0:8080"),
        })
    }

    /// Key bytes for account at `sia_accounts[i]`, or `None` if unkeyed.
    pub fn key_bytes_for(&self, index: usize) -> Option<&[u8]> {
        self.sia_keys
            .get(index)
            .filter(|k| !k.is_empty())
            .map(|k| k.as_bytes())
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Like [`split_csv`], but keeps empty entries — `SIA_KEYS` uses an
/// empty slot to mean "this account is unencrypted".
fn split_csv_allow_empty(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::trim).map(str::to_string).collect()
}

fn parse_extra_headers(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|entry| entry.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn parse_u16(name: &'static str, raw: &str) -> Result<u16, ConfigError> {
    raw.parse().map_err(|_| ConfigError::BadInt(name, raw.to_string()))
}
fn parse_u32(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.parse().map_err(|_| ConfigError::BadInt(name, raw.to_string()))
}
fn parse_u64(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::BadInt(name, raw.to_string()))
}
fn parse_usize(name: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.parse().map_err(|_| ConfigError::BadInt(name, raw.to_string()))
}
fn parse_f64(name: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::BadFloat(name, raw.to_string()))
}

/// Fail fast on an unrecognized `APP_TIMEZONE` rather than silently
/// falling back to UTC at some later call site (spec.md §7, §4.8).
fn validate_timezone(raw: &str) -> Result<(), ConfigError> {
    raw.parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidTimezone(raw.to_string()))
}
