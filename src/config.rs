//! Environment-driven configuration

use std::time::Duration;
use validator::Validate;

use crate::{Result, SyncError};

pub const DEFAULT_SETTLE_DELAY_MS: u64 = 400;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

#[derive(Clone, Debug, Validate)]
pub struct SyncConfig {
    #[validate(url)]
    pub store_api_url: String,
    pub publishable_key: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub vip_settle_delay_ms: u64,
    #[validate(range(min = 100, max = 120000))]
    pub request_timeout_ms: u64,
    #[validate(range(min = 10, max = 86400))]
    pub session_idle_secs: u64,
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
}

impl SyncConfig {
    /// Reads `STORE_API_URL`, `STORE_PUBLISHABLE_KEY`, `VIP_SETTLE_DELAY_MS`,
    /// `STORE_REQUEST_TIMEOUT_MS`, `SESSION_IDLE_SECS`, `PORT`, `DATABASE_URL`
    /// and `NATS_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store_api_url = lookup("STORE_API_URL").ok_or_else(|| SyncError::Config("STORE_API_URL is not set".into()))?;
        let config = Self {
            store_api_url: store_api_url.trim_end_matches('/').to_string(),
            publishable_key: lookup("STORE_PUBLISHABLE_KEY").filter(|k| !k.is_empty()),
            vip_settle_delay_ms: parse_or(&lookup, "VIP_SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS)?,
            request_timeout_ms: parse_or(&lookup, "STORE_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            session_idle_secs: parse_or(&lookup, "SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            database_url: lookup("DATABASE_URL").filter(|u| !u.is_empty()),
            nats_url: lookup("NATS_URL").filter(|u| !u.is_empty()),
        };
        config.validate().map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn settle_delay(&self) -> Duration { Duration::from_millis(self.vip_settle_delay_ms) }
    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }
    pub fn session_idle(&self) -> Duration { Duration::from_secs(self.session_idle_secs) }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| SyncError::Config(format!("{} is not a valid value: {}", key, raw))),
    }
}
