use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Configuration for a [`RequestCache`](crate::RequestCache)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a stored response may be reused when the caller doesn't pass its own TTL.
    /// Written as milliseconds in config files.
    #[serde(rename = "ttl_ms", with = "millis")]
    pub default_ttl: Duration,
    /// Whether caching and deduplication are enabled
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::seconds(30),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create an enabled configuration with the given default TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            enabled: true,
        }
    }

    /// A configuration that turns the cache into a plain pass-through
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(ttl.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(ms))
    }
}
