// Engine Configuration
// Defaults with environment overrides

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::services::crypto::VAULT_KEY_ENV;
use crate::services::scheduler::SchedulerSettings;
use crate::utils::database::DATABASE_FILE;

pub const TICK_SECS_ENV: &str = "SYNCBRIDGE_TICK_SECS";
pub const DEFAULT_INTERVAL_ENV: &str = "SYNCBRIDGE_DEFAULT_INTERVAL_SECS";
pub const HTTP_TIMEOUT_ENV: &str = "SYNCBRIDGE_HTTP_TIMEOUT_SECS";
pub const MAX_ITEMS_ENV: &str = "SYNCBRIDGE_MAX_ITEMS_PER_SYNC";
pub const FEED_BATCH_CAP_ENV: &str = "SYNCBRIDGE_FEED_BATCH_CAP";
pub const MAX_BODY_BYTES_ENV: &str = "SYNCBRIDGE_MAX_BODY_BYTES";
pub const DATABASE_ENV: &str = "SYNCBRIDGE_DATABASE";
pub const BIND_ADDR_ENV: &str = "SYNCBRIDGE_BIND_ADDR";
pub const PORT_ENV: &str = "SYNCBRIDGE_PORT";
pub const SINK_URL_ENV: &str = "SYNCBRIDGE_SINK_URL";

/// Default gateway port
pub const DEFAULT_PORT: u16 = 9876;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Secret material for the credential vault
    pub vault_key: String,
    pub tick_interval_secs: u64,
    pub default_sync_interval_secs: i64,
    pub http_timeout_secs: u64,
    pub max_items_per_sync: usize,
    pub feed_batch_cap: usize,
    /// Hard cap on any gateway request body
    pub max_body_bytes: usize,
    pub database_path: PathBuf,
    pub bind_address: IpAddr,
    pub port: u16,
    /// `HttpSink` URL template; messages are only logged when unset
    pub sink_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vault_key: String::new(),
            tick_interval_secs: 60,
            default_sync_interval_secs: 300,
            http_timeout_secs: 30,
            max_items_per_sync: 10,
            feed_batch_cap: 5,
            max_body_bytes: 5 * 1024 * 1024,
            database_path: PathBuf::from(DATABASE_FILE),
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            sink_url: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `SYNCBRIDGE_*` variables. The vault key is required.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let vault_key = get(VAULT_KEY_ENV).ok_or_else(|| {
            EngineError::Config(format!("{} must be set", VAULT_KEY_ENV))
        })?;

        Ok(Self {
            vault_key,
            tick_interval_secs: parse_or(get(TICK_SECS_ENV), TICK_SECS_ENV, defaults.tick_interval_secs)?,
            default_sync_interval_secs: parse_or(
                get(DEFAULT_INTERVAL_ENV),
                DEFAULT_INTERVAL_ENV,
                defaults.default_sync_interval_secs,
            )?,
            http_timeout_secs: parse_or(get(HTTP_TIMEOUT_ENV), HTTP_TIMEOUT_ENV, defaults.http_timeout_secs)?,
            max_items_per_sync: parse_or(get(MAX_ITEMS_ENV), MAX_ITEMS_ENV, defaults.max_items_per_sync)?,
            feed_batch_cap: parse_or(get(FEED_BATCH_CAP_ENV), FEED_BATCH_CAP_ENV, defaults.feed_batch_cap)?,
            max_body_bytes: parse_or(get(MAX_BODY_BYTES_ENV), MAX_BODY_BYTES_ENV, defaults.max_body_bytes)?,
            database_path: get(DATABASE_ENV).map(PathBuf::from).unwrap_or(defaults.database_path),
            bind_address: parse_or(get(BIND_ADDR_ENV), BIND_ADDR_ENV, defaults.bind_address)?,
            port: parse_or(get(PORT_ENV), PORT_ENV, defaults.port)?,
            sink_url: get(SINK_URL_ENV),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: Duration::from_secs(self.tick_interval_secs.max(1)),
            default_interval_secs: self.default_sync_interval_secs.max(0),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> EngineResult<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("{} has an invalid value: {}", name, value))),
        None => Ok(default),
    }
}
