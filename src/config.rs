use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use log::{info, warn, LevelFilter};
use thiserror::Error;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable {0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Inclusive range used for recipe amounts and cooking times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

impl Bounds {
    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_lifetime_hours: i64,
    pub page_size: i64,
    pub amount: Bounds,
    pub cooking_time: Bounds,
    pub shopping_list_file_name: String,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            bind_addr: try_load(&lookup, "BIND_ADDR", "0.0.0.0:8000")?,
            database_url: require(&lookup, "DATABASE_URL")?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            jwt_secret: require(&lookup, "JWT_SECRET")?,
            jwt_lifetime_hours: try_load(&lookup, "JWT_LIFETIME_HOURS", "24")?,
            page_size: try_load(&lookup, "PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?,
            amount: load_bounds(&lookup, ("AMOUNT_MIN", "1"), ("AMOUNT_MAX", "32000"))?,
            cooking_time: load_bounds(
                &lookup,
                ("COOKING_TIME_MIN", "1"),
                ("COOKING_TIME_MAX", "32000"),
            )?,
            shopping_list_file_name: try_load(
                &lookup,
                "SHOPPING_LIST_FILE_NAME",
                "shopping_list.txt",
            )?,
            log_level: try_load(&lookup, "RUST_LOG_LEVEL", "info")?,
        };

        if !(1..=MAX_PAGE_SIZE).contains(&config.page_size) {
            return Err(ConfigError::Invalid {
                key: "PAGE_SIZE",
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        if config.jwt_lifetime_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_LIFETIME_HOURS",
                reason: String::from("must be positive"),
            });
        }

        Ok(config)
    }
}

fn require<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => {
            warn!("Environment variable {key} not found");
            Err(ConfigError::Missing(key))
        }
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

fn load_bounds<F>(
    lookup: &F,
    (min_key, min_default): (&'static str, &str),
    (max_key, max_default): (&'static str, &str),
) -> Result<Bounds, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let min: i32 = try_load(lookup, min_key, min_default)?;
    let max: i32 = try_load(lookup, max_key, max_default)?;

    if min < 1 {
        return Err(ConfigError::Invalid {
            key: min_key,
            reason: String::from("must be at least 1"),
        });
    }
    if min > max {
        return Err(ConfigError::Invalid {
            key: max_key,
            reason: format!("must not be below {min_key} ({min})"),
        });
    }

    Ok(Bounds { min, max })
}
