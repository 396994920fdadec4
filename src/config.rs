//! Environment configuration.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::orders::EngineSettings;
use crate::pricing::DeliveryPolicy;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub discount_cache_ttl: Duration,
    pub confirm_timeout: Duration,
    pub order_id_max_attempts: u32,
    pub delivery: DeliveryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8083,
            database_max_connections: 10,
            nats_url: None,
            discount_cache_ttl: Duration::from_secs(3600),
            confirm_timeout: Duration::from_millis(5000),
            order_id_max_attempts: 5,
            delivery: DeliveryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Builds the config from any key lookup; unset and blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let delivery = DeliveryPolicy {
            free_threshold: parse(&get, "FREE_DELIVERY_THRESHOLD")?.unwrap_or(defaults.delivery.free_threshold),
            inside_charge: parse(&get, "DELIVERY_CHARGE_INSIDE")?.unwrap_or(defaults.delivery.inside_charge),
            outside_charge: parse(&get, "DELIVERY_CHARGE_OUTSIDE")?.unwrap_or(defaults.delivery.outside_charge),
            home_district: get("HOME_DISTRICT").unwrap_or(defaults.delivery.home_district),
        };
        for (key, value) in [
            ("FREE_DELIVERY_THRESHOLD", delivery.free_threshold),
            ("DELIVERY_CHARGE_INSIDE", delivery.inside_charge),
            ("DELIVERY_CHARGE_OUTSIDE", delivery.outside_charge),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::Invalid { key, value: value.to_string() });
            }
        }

        let order_id_max_attempts = parse(&get, "ORDER_ID_MAX_ATTEMPTS")?.unwrap_or(defaults.order_id_max_attempts);
        if order_id_max_attempts == 0 {
            return Err(ConfigError::Invalid { key: "ORDER_ID_MAX_ATTEMPTS", value: "0".into() });
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(defaults.database_max_connections),
            nats_url: get("NATS_URL"),
            discount_cache_ttl: parse(&get, "DISCOUNT_CACHE_TTL_SECS")?.map(Duration::from_secs).unwrap_or(defaults.discount_cache_ttl),
            confirm_timeout: parse(&get, "CONFIRM_TIMEOUT_MS")?.map(Duration::from_millis).unwrap_or(defaults.confirm_timeout),
            order_id_max_attempts,
            delivery,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing { key: "DATABASE_URL" })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings { confirm_timeout: self.confirm_timeout, order_id_max_attempts: self.order_id_max_attempts }
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| ConfigError::Invalid { key, value }),
    }
}
