//! Application configuration loaded from environment variables.
//!
//! Supports `.env` files for development and environment variables for
//! production. Config precedence: env vars > .env file > config.toml >
//! defaults. Field names are flat (not `SECTION__KEY` nested like some
//! sibling services use) because the env var names are part of the public
//! contract (`PORT`, `FRONTEND_URL`, `RTC_MIN_PORT`, ...) and must be
//! matched verbatim.

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("config not initialized, call vane_common::config::init() first")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code
/// accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        .set_default("port", 3000)?
        .set_default("frontend_url", "")?
        .set_default("rtc_min_port", 40000)?
        .set_default("rtc_max_port", 49999)?
        .set_default("announced_ip", "127.0.0.1")?
        .set_default("store_path", "./data/vane.json")?
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::default().try_parsing(true))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// `PORT` — single HTTP+WebSocket listen port.
    pub port: u16,
    /// `FRONTEND_URL` — permitted CORS origin (plus `localhost:5173`, always allowed).
    pub frontend_url: String,
    /// `RTC_MIN_PORT` — low end of the mediasoup UDP/TCP listen range.
    pub rtc_min_port: u16,
    /// `RTC_MAX_PORT` — high end of the mediasoup UDP/TCP listen range.
    pub rtc_max_port: u16,
    /// `ANNOUNCED_IP` — IP advertised in ICE candidates.
    pub announced_ip: String,
    /// Path to the single-file JSON document store (not in the spec's env
    /// table; every deployment needs somewhere to put the file).
    pub store_path: String,
}
