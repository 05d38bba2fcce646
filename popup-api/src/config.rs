use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::info;

const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// No database means the in-memory store
    pub database_url: Option<String>,
    pub api_port: u16,
    pub jwt_secret: String,
    pub jwt_expiry_secs: i64,
    /// Allowed CORS origin; any origin when unset
    pub base_url: Option<String>,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} characters"),
            });
        }

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            api_port: try_load("API_PORT", "4001")?,
            jwt_secret,
            jwt_expiry_secs: try_load("JWT_EXPIRY_SECS", "3600")?,
            base_url: optional("BASE_URL"),
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
