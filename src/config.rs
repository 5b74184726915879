//! Service configuration from the environment (`.env` is loaded by `main`).

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "orders-backend-development-secret";
/// Upper bound for `TOKEN_TTL_SECS`: one year.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 86_400;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub price_list_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("{name} must be between 1 and {max}, got {value}")]
    OutOfRange { name: &'static str, value: u64, max: u64 },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            db_max_connections: 10,
            nats_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: Duration::from_secs(86_400),
            price_list_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET is not set, using the development secret");
                defaults.jwt_secret
            }
        };

        let token_ttl = number(get("TOKEN_TTL_SECS"), "TOKEN_TTL_SECS", defaults.token_ttl.as_secs())?;
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&token_ttl) {
            return Err(ConfigError::OutOfRange { name: "TOKEN_TTL_SECS", value: token_ttl, max: MAX_TOKEN_TTL_SECS });
        }

        Ok(Self {
            port: number(get("PORT"), "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            db_max_connections: number(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            nats_url: get("NATS_URL"),
            jwt_secret,
            token_ttl: Duration::from_secs(token_ttl),
            price_list_timeout: Duration::from_secs(number(get("PRICE_LIST_TIMEOUT_SECS"), "PRICE_LIST_TIMEOUT_SECS", 30)?),
        })
    }
}

fn number<T: FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8083);
        assert!(config.database_url.is_none());
        assert_eq!(config.token_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let config = AppConfig::from_lookup(lookup(&[("PORT", "9000"), ("DATABASE_URL", "postgres://db/orders"), ("NATS_URL", "")]))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://db/orders"));
        assert!(config.nats_url.is_none());

        let err = AppConfig::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn test_token_ttl_bounds() {
        let config = AppConfig::from_lookup(lookup(&[("TOKEN_TTL_SECS", "3600")])).unwrap();
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        for raw in ["0", "18446744073709551615"] {
            let err = AppConfig::from_lookup(lookup(&[("TOKEN_TTL_SECS", raw)])).unwrap_err();
            assert!(matches!(err, ConfigError::OutOfRange { name: "TOKEN_TTL_SECS", .. }));
        }
    }
}
