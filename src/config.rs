use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use dotenvy::dotenv;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {key}: {message}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub pool_size: u32,
    pub bind_address: SocketAddr,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenv() {
            info!("No .env file loaded: {err}");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            warn!("DATABASE_URL not set, records will only be kept in memory");
        }

        let pool_size: u32 = try_load(&lookup, "DATABASE_POOL_SIZE", "8")?;
        if pool_size == 0 {
            return Err(ConfigError {
                key: "DATABASE_POOL_SIZE",
                value: pool_size.to_string(),
                message: String::from("must be at least 1"),
            });
        }

        Ok(Self {
            database_url,
            pool_size,
            bind_address: try_load(&lookup, "BIND_ADDRESS", "0.0.0.0:3000")?,
        })
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.trim().parse::<T>().map_err(|e| ConfigError {
        key,
        message: e.to_string(),
        value,
    })
}
