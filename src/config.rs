//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. an explicit path (for example `huginn-bench --config <path>`)
//! 2. `$XDG_CONFIG_HOME/huginn/config.toml` (platform config dir)
//! 3. `~/.huginn/config.toml` (user)
//! 4. `/etc/huginn/config.toml` (system)
//!
//! Unlike an explicit path, the standard locations are optional: with no
//! file present the defaults apply. Durations are written as integer
//! milliseconds in `*_ms` keys.
//!
//! ```toml
//! [cache]
//! max_entries = 5000
//! ttl_ms = 600000
//!
//! [batch]
//! max_batch_size = 64
//! aggressiveness = "conservative"
//!
//! [memory.thresholds]
//! critical = 95.0
//!
//! [features]
//! memory = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::strategy::MemoryConfig;
use crate::{HuginnError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub memory: MemoryConfig,
    pub features: FeatureToggles,
}

/// Which optimization components the orchestrator builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub cache: bool,
    pub batch: bool,
    pub memory: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            cache: true,
            batch: true,
            memory: true,
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// A missing explicit path, an unreadable file or invalid TOML is a
    /// [`HuginnError::Configuration`].
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                return Err(HuginnError::Configuration(format!(
                    "Config file not found: {path:?}"
                )));
            }
            None => match search_paths().into_iter().find(|path| path.is_file()) {
                Some(path) => path,
                None => {
                    debug!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::load_from(&path)
    }

    /// Read and parse one file.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = ?path, "loading config");
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }
}

/// Standard config locations, most specific first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("huginn").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".huginn").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/huginn/config.toml"));
    paths
}

/// `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::batch::Aggressiveness;

    #[test]
    fn empty_document_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.batch.initial_batch_size, 32);
        assert_eq!(config.memory.thresholds.critical, 90.0);
        assert_eq!(config.features, FeatureToggles::default());
    }

    #[test]
    fn durations_are_milliseconds() {
        let toml = r#"
[cache]
ttl_ms = 1500

[batch]
optimization_cooldown_ms = 0
aggressiveness = "aggressive"

[memory]
monitoring_interval_ms = 100
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_millis(1500));
        assert_eq!(config.batch.optimization_cooldown, Duration::ZERO);
        assert_eq!(config.batch.aggressiveness, Aggressiveness::Aggressive);
        assert_eq!(config.memory.monitoring_interval, Duration::from_millis(100));
    }

    #[test]
    fn feature_toggles_default_on() {
        let config = Config::from_toml_str("[features]\nmemory = false\n").unwrap();
        assert!(config.features.cache);
        assert!(config.features.batch);
        assert!(!config.features.memory);
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        let err = Config::from_toml_str("[cache\n").unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn system_location_is_searched_last() {
        let paths = search_paths();
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/huginn/config.toml")));
        assert!(paths.iter().all(|p| p.ends_with("config.toml")));
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }
}
