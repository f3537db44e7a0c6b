//! Environment-driven configuration.
//!
//! Everything the server needs is constructed here once at startup and
//! passed into constructors. There are no process-wide mutable toggles:
//! concurrent requests only ever see an immutable snapshot of this config.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Connection settings for one PostgreSQL target plus its pool limits.
///
/// The server holds two of these: one for the writer endpoint, one for the
/// read replica. Limits are per pool, not shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Schema placed on the connection's search_path.
    pub schema: String,

    /// Maximum open connections in the pool.
    pub max_open: u32,
    /// Connections kept warm when idle.
    pub min_idle: u32,
    /// Maximum lifetime of a single connection before it is recycled.
    pub max_lifetime_secs: u64,
    /// How long a connection may sit idle before being reaped.
    pub idle_timeout_secs: u64,
    /// How long an acquire may wait on a saturated pool before failing.
    pub acquire_timeout_secs: u64,
}

impl PgConfig {
    /// Load a pool target from `{prefix}_PG_*` environment variables.
    fn from_env(prefix: &'static str, default_host: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or(&format!("{prefix}_PG_HOST"), default_host),
            port: env_parse(prefix, "_PG_PORT", 5432)?,
            user: env_or(&format!("{prefix}_PG_USER"), "postgres"),
            password: env_or(&format!("{prefix}_PG_PASSWORD"), "postgres"),
            database: env_or(&format!("{prefix}_PG_DATABASE"), "txgate"),
            schema: env_or(&format!("{prefix}_PG_SCHEMA"), "public"),
            max_open: env_parse(prefix, "_PG_MAX_OPEN", 20)?,
            min_idle: env_parse(prefix, "_PG_MIN_IDLE", 2)?,
            max_lifetime_secs: env_parse(prefix, "_PG_MAX_LIFETIME_SECS", 1800)?,
            idle_timeout_secs: env_parse(prefix, "_PG_IDLE_TIMEOUT_SECS", 300)?,
            acquire_timeout_secs: env_parse(prefix, "_PG_ACQUIRE_TIMEOUT_SECS", 5)?,
        })
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP listener binds to.
    pub host: String,
    pub http_port: u16,
    pub writer: PgConfig,
    pub reader: PgConfig,
}

impl AppConfig {
    /// Load the full configuration from the environment.
    ///
    /// Missing variables fall back to development defaults; present but
    /// unparseable variables are a hard error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("TXGATE_HOST", "127.0.0.1"),
            http_port: env_parse("TXGATE", "_HTTP_PORT", 8080)?,
            writer: PgConfig::from_env("WRITER", "localhost")?,
            reader: PgConfig::from_env("READER", "localhost")?,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(prefix: &'static str, suffix: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let var = format!("{prefix}{suffix}");
    match env::var(&var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            reason: format!("{raw:?}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}
