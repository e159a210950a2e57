use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use tracing::info;

use crate::error::AppError;

/// Credentials and endpoints of the institutional scheduling API.
#[derive(Clone, Debug)]
pub struct ExternalApiConfig {
    pub auth_url: String,
    pub routine_url: String,
    pub username: String,
    pub password: String,
    pub origin: String,
    pub basic_auth: String,
    pub timeout: Duration,
}

impl ExternalApiConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let timeout_secs: u64 = optional("EXTERNAL_API_TIMEOUT_SECS", "30")
            .parse()
            .map_err(|_| AppError::Config("EXTERNAL_API_TIMEOUT_SECS must be a number of seconds".to_string()))?;

        Ok(Self {
            auth_url: required("AUTH_BASE_URL")?,
            routine_url: required("ROUTINE_URL")?,
            username: required("EXTERNAL_API_USERNAME")?,
            password: required("EXTERNAL_API_PASSWORD")?,
            origin: required("EXTERNAL_API_ORIGIN")?,
            basic_auth: required("EXTERNAL_API_BASIC_AUTH")?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Knobs of the sync engine and its cron trigger.
#[derive(Clone, Debug)]
pub struct SyncSettings {
    /// Non-instructional weekday: skipped by the weekly run and by the cron trigger.
    pub excluded_weekday: Option<Weekday>,
    /// UTC time of day at which the cron trigger fires.
    pub daily_at: NaiveTime,
    pub scheduler_enabled: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            excluded_weekday: Some(Weekday::Sat),
            daily_at: NaiveTime::from_hms_opt(0, 1, 0).unwrap_or_default(),
            scheduler_enabled: true,
        }
    }
}

impl SyncSettings {
    pub fn new_from_env() -> Result<Self, AppError> {
        let excluded_weekday = parse_excluded_weekday(&optional("SYNC_EXCLUDED_WEEKDAY", "sat"))?;
        let daily_at = NaiveTime::parse_from_str(&optional("SYNC_DAILY_AT", "00:01"), "%H:%M")
            .map_err(|_| AppError::Config("SYNC_DAILY_AT must be HH:MM".to_string()))?;
        let scheduler_enabled = optional("SYNC_SCHEDULER_ENABLED", "true")
            .parse::<bool>()
            .map_err(|_| AppError::Config("SYNC_SCHEDULER_ENABLED must be true or false".to_string()))?;

        Ok(Self {
            excluded_weekday,
            daily_at,
            scheduler_enabled,
        })
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub external: ExternalApiConfig,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let bind_addr = optional("BIND_ADDR", "127.0.0.1:3000")
            .parse()
            .map_err(|_| AppError::Config("BIND_ADDR must be host:port".to_string()))?;

        Ok(Self {
            database_url: optional("DATABASE_URL", "sqlite://routine.db"),
            bind_addr,
            external: ExternalApiConfig::new_from_env()?,
            sync: SyncSettings::new_from_env()?,
        })
    }
}

/// `none` (or an empty value) disables the exclusion.
pub fn parse_excluded_weekday(raw: &str) -> Result<Option<Weekday>, AppError> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .parse::<Weekday>()
        .map(Some)
        .map_err(|_| AppError::Config(format!("SYNC_EXCLUDED_WEEKDAY: unknown weekday '{}'", value)))
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::Config(format!("{} is not set", key)))
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{} not set, using default: {}", key, default);
        default.to_string()
    })
}
