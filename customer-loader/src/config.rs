use crate::Error;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use getset::Getters;
use log::LevelFilter;
use request_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "customer-loader.yml";

#[serde_inline_default]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[get = "pub"]
pub struct Config {
    #[serde(default)]
    cache: CacheConfig,
    #[serde_inline_default(PathBuf::from("fixtures.json"))]
    fixtures: PathBuf,
    /// Simulated round-trip time of the in-memory backend
    #[serde_inline_default(0)]
    latency_ms: u64,
    /// Load every requested customer a second time to show cache hits
    #[serde_inline_default(true)]
    repeat: bool,
    #[serde_inline_default("info".to_string())]
    log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fixtures: PathBuf::from("fixtures.json"),
            latency_ms: 0,
            repeat: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Read `path` (a missing file is fine) and apply `LOADER_` environment
    /// overrides on top, e.g. `LOADER_CACHE__TTL_MS=5000`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::figment(path).extract().map_err(Error::from)
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("LOADER_").split("__"))
    }

    pub fn level_filter(&self) -> Result<LevelFilter, Error> {
        Ok(LevelFilter::from_str(&self.log_level)?)
    }
}
