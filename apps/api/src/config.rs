use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::export::RasterFailurePolicy;
use crate::persistence::autosave::DEFAULT_DEBOUNCE;

/// Application configuration loaded from environment variables.
/// Every setting has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Snapshots go to Redis when set, to process memory otherwise.
    pub redis_url: Option<String>,
    pub autosave_debounce: Duration,
    pub raster_settle: Duration,
    pub rasterizer_bin: String,
    pub raster_timeout_secs: u64,
    pub raster_failure_policy: RasterFailurePolicy,
    pub upstream_api_url: String,
    /// Sessions unused for this long are flushed and closed.
    pub session_idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            autosave_debounce: Duration::from_millis(
                parse_env("AUTOSAVE_DEBOUNCE_MS", DEFAULT_DEBOUNCE.as_millis() as u64)
                    .context("AUTOSAVE_DEBOUNCE_MS must be a number of milliseconds")?,
            ),
            raster_settle: Duration::from_millis(
                parse_env("RASTER_SETTLE_MS", 500)
                    .context("RASTER_SETTLE_MS must be a number of milliseconds")?,
            ),
            rasterizer_bin: std::env::var("RASTERIZER_BIN")
                .unwrap_or_else(|_| "wkhtmltoimage".to_string()),
            raster_timeout_secs: parse_env("RASTER_TIMEOUT_SECS", 30)
                .context("RASTER_TIMEOUT_SECS must be a number of seconds")?,
            raster_failure_policy: match std::env::var("RASTER_FAILURE_POLICY") {
                Ok(raw) => raw.parse().map_err(|e: String| anyhow!(e))?,
                Err(_) => RasterFailurePolicy::default(),
            },
            upstream_api_url: std::env::var("UPSTREAM_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            session_idle_timeout: Duration::from_secs(
                parse_env("SESSION_IDLE_TIMEOUT_SECS", 3600)
                    .context("SESSION_IDLE_TIMEOUT_SECS must be a number of seconds")?,
            ),
        })
    }
}

/// Reads `key`, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
