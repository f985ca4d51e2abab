//! Configuration for capture zones module

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix for overrides, e.g. `CAPTURE_ZONES_TICK_INTERVAL_MS`
pub const ENV_PREFIX: &str = "CAPTURE_ZONES_";

/// Capture zones module configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory for YAML data files; in-memory storage when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Occupancy tick period (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Build version reported next to the API version
    #[serde(default = "default_plugin_version")]
    pub plugin_version: String,

    /// Restore persisted state during init
    #[serde(default = "default_true")]
    pub load_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            tick_interval_ms: default_tick_interval_ms(),
            plugin_version: default_plugin_version(),
            load_on_start: true,
        }
    }
}

impl Config {
    /// Defaults, then the optional YAML file, then `CAPTURE_ZONES_*` variables
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_plugin_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert!(config.load_on_start);
        assert_eq!(config.plugin_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture_zones.yaml");
        std::fs::write(&path, "tick_interval_ms: 250\ndata_dir: /srv/zones\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/zones")));
    }

    #[test]
    fn test_rejects_unknown_fields_and_zero_tick() {
        let dir = tempfile::tempdir().unwrap();
        let unknown = dir.path().join("unknown.yaml");
        std::fs::write(&unknown, "tick_rate: 5\n").unwrap();
        assert!(Config::load(Some(&unknown)).is_err());

        let zero = dir.path().join("zero.yaml");
        std::fs::write(&zero, "tick_interval_ms: 0\n").unwrap();
        assert!(Config::load(Some(&zero)).is_err());
    }
}
