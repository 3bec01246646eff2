use std::{env, str::FromStr, time::Duration};

use color_eyre::eyre::{Result, eyre};

pub const DATABASE_URL_VAR: &str = "PAYMENTS_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "PAYMENTS_MAX_CONNECTIONS";
pub const BUSY_TIMEOUT_VAR: &str = "PAYMENTS_BUSY_TIMEOUT_MS";
pub const OPERATION_TIMEOUT_VAR: &str = "PAYMENTS_OPERATION_TIMEOUT_MS";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
    /// Upper bound on any single store operation.
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database_url: "sqlite::memory:".to_owned(),
            max_connections: 4,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = StoreConfig::default();

        Ok(StoreConfig {
            database_url: lookup(DATABASE_URL_VAR).unwrap_or(defaults.database_url),
            max_connections: parse_or(&lookup, MAX_CONNECTIONS_VAR, defaults.max_connections)?,
            busy_timeout: parse_or(&lookup, BUSY_TIMEOUT_VAR, DEFAULT_BUSY_TIMEOUT_MS)
                .map(Duration::from_millis)?,
            operation_timeout: parse_or(&lookup, OPERATION_TIMEOUT_VAR, DEFAULT_OPERATION_TIMEOUT_MS)
                .map(Duration::from_millis)?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| eyre!("Invalid value {:?} for {}: {}", raw, key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_when_nothing_set() {
        let config = StoreConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (DATABASE_URL_VAR, "sqlite:ledger.db?mode=rwc"),
            (MAX_CONNECTIONS_VAR, "8"),
            (OPERATION_TIMEOUT_VAR, " 250 "),
        ]);

        let config =
            StoreConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.database_url, "sqlite:ledger.db?mode=rwc");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_millis(5_000));
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_garbage() {
        let err = StoreConfig::from_lookup(|key| {
            (key == BUSY_TIMEOUT_VAR).then(|| "soon".to_owned())
        })
        .unwrap_err();

        assert!(err.to_string().contains(BUSY_TIMEOUT_VAR));
    }
}
