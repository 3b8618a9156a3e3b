use std::{fs, time::Duration};

use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::normalize::DEFAULT_LOCAL_ZONE;
use crate::sources::ColumnSchema;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// IANA zone for unzoned timestamps and period boundaries.
    pub local_zone: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            local_zone: DEFAULT_LOCAL_ZONE.name().to_string(),
        }
    }
}

impl BillingConfig {
    pub fn zone(&self) -> anyhow::Result<Tz> {
        self.local_zone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid billing.local_zone '{}': {e}", self.local_zone))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub timestamp_column: String,
    pub energy_column: String,
    pub price_column: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        let schema = ColumnSchema::default();
        Self {
            timestamp_column: schema.timestamp,
            energy_column: schema.energy,
            price_column: schema.price,
        }
    }
}

impl ImportConfig {
    pub fn schema(&self) -> ColumnSchema {
        ColumnSchema {
            timestamp: self.timestamp_column.clone(),
            energy: self.energy_column.clone(),
            price: self.price_column.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Rows per INSERT statement inside one upsert transaction.
    pub chunk_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5_000,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl StoreConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BILLING_CONFIG").unwrap_or_else(|_| "billing-config.toml".to_string());
        let contents = fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        // fail at startup rather than on the first import
        cfg.billing.zone()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [database]
            uri = "postgres://localhost/billing"
            max_connections = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.billing.zone().unwrap(), chrono_tz::Europe::Prague);
        assert_eq!(cfg.import.schema(), ColumnSchema::default());
        assert_eq!(cfg.store.chunk_size, 5_000);
        assert_eq!(cfg.store.retry_backoff(), Duration::from_millis(200));
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [database]
            uri = "postgres://localhost/billing"
            max_connections = 2

            [billing]
            local_zone = "Europe/Ljubljana"

            [import]
            timestamp_column = "ts"

            [store]
            max_retries = 0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.billing.zone().unwrap(), chrono_tz::Europe::Ljubljana);
        assert_eq!(cfg.import.schema().timestamp, "ts");
        assert_eq!(cfg.import.schema().energy, "Poraba [kWh]");
        assert_eq!(cfg.store.max_retries, 0);
        assert_eq!(cfg.store.chunk_size, 5_000);
    }

    #[test]
    fn unknown_zone_fails_to_load() {
        let res = AppConfig::from_toml(
            r#"
            [database]
            uri = "postgres://localhost/billing"
            max_connections = 1

            [billing]
            local_zone = "Mars/Olympus"
            "#,
        );

        assert!(res.is_err());
    }
}
