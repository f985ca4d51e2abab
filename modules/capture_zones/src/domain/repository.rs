//! Persistence boundary
//!
//! The runtime treats persistence as a key -> blob store. Keys are
//! `/`-separated (`config/global`, `config/zones/<id>`, `zones/<id>`,
//! `stats/players`, `shops/<id>`). Implementations are in
//! infra/storage/repositories.rs

use anyhow::Result;
use async_trait::async_trait;

pub const GLOBAL_CONFIG_KEY: &str = "config/global";
pub const ZONE_CONFIG_PREFIX: &str = "config/zones/";
pub const ZONES_PREFIX: &str = "zones/";
pub const SHOPS_PREFIX: &str = "shops/";
pub const STATS_KEY: &str = "stats/players";

pub fn zone_config_key(zone_id: &str) -> String {
    format!("{}{}", ZONE_CONFIG_PREFIX, zone_id)
}

pub fn zone_key(zone_id: &str) -> String {
    format!("{}{}", ZONES_PREFIX, zone_id)
}

pub fn shop_key(zone_id: &str) -> String {
    format!("{}{}", SHOPS_PREFIX, zone_id)
}

/// Key -> blob store for config, zones, shops and stats
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Load a blob, `None` if the key was never saved
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Save (flush) a blob
    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Remove a blob; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every stored key
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Discard any cache and re-fetch from the backing source
    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}
