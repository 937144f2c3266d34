//! Tiered-cache configuration.

use serde::Deserialize;

/// Top-level configuration, loaded from `tiered-cache.toml` and/or
/// `TIERED_CACHE__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global_store: GlobalStoreConfig,

    #[serde(default)]
    pub change_feed: ChangeFeedConfig,

    #[serde(default)]
    pub slot_table: SlotTableConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_store: GlobalStoreConfig::default(),
            change_feed: ChangeFeedConfig::default(),
            slot_table: SlotTableConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalStoreConfig {
    #[serde(default = "defaults::table_name")]
    pub table_name: String,

    #[serde(default = "defaults::read_capacity_per_second")]
    pub read_capacity_per_second: u32,

    #[serde(default = "defaults::write_capacity_per_second")]
    pub write_capacity_per_second: u32,
}

impl Default for GlobalStoreConfig {
    fn default() -> Self {
        Self {
            table_name: defaults::table_name(),
            read_capacity_per_second: defaults::read_capacity_per_second(),
            write_capacity_per_second: defaults::write_capacity_per_second(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeFeedConfig {
    #[serde(default = "defaults::poll_interval_millis")]
    pub poll_interval_millis: u64,
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_millis: defaults::poll_interval_millis(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotTableConfig {
    #[serde(default = "defaults::slot_count")]
    pub slot_count: usize,
}

impl Default for SlotTableConfig {
    fn default() -> Self {
        Self {
            slot_count: defaults::slot_count(),
        }
    }
}

mod defaults {
    pub fn table_name() -> String {
        "tiered-cache-entries".into()
    }

    pub fn read_capacity_per_second() -> u32 {
        1000
    }

    pub fn write_capacity_per_second() -> u32 {
        100
    }

    pub fn poll_interval_millis() -> u64 {
        1000
    }

    pub fn slot_count() -> usize {
        1024
    }
}

/// Load configuration from `tiered-cache.toml` (if present) layered under
/// `TIERED_CACHE__*` environment variables. Falls back to defaults when no
/// config source is found; a genuine parse error is fatal.
pub fn load() -> Result<Config, crate::Error> {
    let result = config::Config::builder()
        .add_source(config::File::with_name("tiered-cache").required(false))
        .add_source(
            config::Environment::with_prefix("TIERED_CACHE")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize());

    match result {
        Ok(config) => Ok(config),
        Err(e) => {
            let err_str = format!("{e}");
            if err_str.contains("not found") || err_str.contains("missing field") {
                tracing::warn!(error = %e, "No config file found, using defaults");
                Ok(Config::default())
            } else {
                Err(crate::Error::Configuration(err_str))
            }
        }
    }
}
