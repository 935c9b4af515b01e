//! Engine configuration.
//!
//! Loaded from `STOREFRONT_*` environment variables with fallback to defaults.
//!
//! | Variable                          | Default          |
//! |-----------------------------------|------------------|
//! | `STOREFRONT_DB_PATH`              | `storefront.db`  |
//! | `STOREFRONT_DB_MAX_CONNECTIONS`   | `5`              |
//! | `STOREFRONT_MAX_CART_LINES`       | `100`            |
//! | `STOREFRONT_MAX_ITEM_QUANTITY`    | `999`            |
//! | `STOREFRONT_LOCK_PRUNE_THRESHOLD` | `1024`           |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use storefront_core::{CartLimits, MAX_CART_LINES, MAX_ITEM_QUANTITY};
use storefront_db::DbConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Pool size for the SQLite backend
    pub db_max_connections: u32,

    /// Distinct lines a cart may hold
    pub max_cart_lines: usize,

    /// Largest quantity a single cart line may reach
    pub max_item_quantity: i64,

    /// Idle per-key locks kept before pruning
    pub lock_prune_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: PathBuf::from("storefront.db"),
            db_max_connections: 5,
            max_cart_lines: MAX_CART_LINES,
            max_item_quantity: MAX_ITEM_QUANTITY,
            lock_prune_threshold: 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            db_path: lookup("STOREFRONT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            db_max_connections: parse_or(
                &lookup,
                "STOREFRONT_DB_MAX_CONNECTIONS",
                defaults.db_max_connections,
            )?,

            max_cart_lines: parse_or(&lookup, "STOREFRONT_MAX_CART_LINES", defaults.max_cart_lines)?,

            max_item_quantity: parse_or(
                &lookup,
                "STOREFRONT_MAX_ITEM_QUANTITY",
                defaults.max_item_quantity,
            )?,

            lock_prune_threshold: parse_or(
                &lookup,
                "STOREFRONT_LOCK_PRUNE_THRESHOLD",
                defaults.lock_prune_threshold,
            )?,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("STOREFRONT_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.max_cart_lines == 0 {
            return Err(ConfigError::InvalidValue("STOREFRONT_MAX_CART_LINES".to_string()));
        }
        if config.max_item_quantity < 1 {
            return Err(ConfigError::InvalidValue("STOREFRONT_MAX_ITEM_QUANTITY".to_string()));
        }

        Ok(config)
    }

    pub fn cart_limits(&self) -> CartLimits {
        CartLimits {
            max_lines: self.max_cart_lines,
            max_item_quantity: self.max_item_quantity,
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.db_path).max_connections(self.db_max_connections)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cart_limits(), CartLimits::default());
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("STOREFRONT_DB_PATH", "/tmp/shop.db"),
            ("STOREFRONT_MAX_CART_LINES", " 20 "),
            ("STOREFRONT_MAX_ITEM_QUANTITY", "50"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.max_cart_lines, 20);
        assert_eq!(config.max_item_quantity, 50);
        assert_eq!(config.db_config().max_connections, 5);
    }

    #[test]
    fn test_invalid_values() {
        let err = EngineConfig::from_lookup(lookup(&[("STOREFRONT_MAX_CART_LINES", "lots")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for STOREFRONT_MAX_CART_LINES");

        assert!(
            EngineConfig::from_lookup(lookup(&[("STOREFRONT_DB_MAX_CONNECTIONS", "0")])).is_err()
        );
    }
}
