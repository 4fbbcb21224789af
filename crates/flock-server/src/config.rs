use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

/// Shipped in `.env.example`; refused unless `FLOCK_ALLOW_DEV_SECRET=1`.
pub const DEV_SECRET: &str = "dev-secret-change-me";

/// One year.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FLOCK_JWT_SECRET is not set")]
    MissingSecret,
    #[error("FLOCK_JWT_SECRET is the development placeholder; set FLOCK_ALLOW_DEV_SECRET=1 to use it")]
    PlaceholderSecret,
    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allow_dev = lookup("FLOCK_ALLOW_DEV_SECRET").as_deref() == Some("1");
        let jwt_secret = match lookup("FLOCK_JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) if secret == DEV_SECRET && !allow_dev => return Err(ConfigError::PlaceholderSecret),
            Some(secret) => secret,
            None if allow_dev => DEV_SECRET.to_string(),
            None => return Err(ConfigError::MissingSecret),
        };

        let db_path = PathBuf::from(lookup("FLOCK_DB_PATH").unwrap_or_else(|| "flock.db".into()));
        let host = lookup("FLOCK_HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match lookup("FLOCK_PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "FLOCK_PORT", value })?,
            None => 5000,
        };

        let token_ttl = match lookup("FLOCK_TOKEN_TTL_HOURS") {
            Some(value) => match value.parse::<i64>() {
                Ok(hours) if (1..=MAX_TOKEN_TTL_HOURS).contains(&hours) => Duration::try_hours(hours)
                    .ok_or(ConfigError::Invalid { name: "FLOCK_TOKEN_TTL_HOURS", value })?,
                _ => return Err(ConfigError::Invalid { name: "FLOCK_TOKEN_TTL_HOURS", value }),
            },
            None => Duration::hours(24),
        };

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            token_ttl,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = format!("{}:{}", self.host, self.port);
        value
            .parse()
            .map_err(|_| ConfigError::Invalid { name: "FLOCK_HOST", value })
    }
}
