use getset::Getters;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::InMemoryBackend;
use crate::config::Config;
use crate::loader::CustomerDetailsLoader;
use crate::Error;

/// Long-lived state shared by everything that loads customer data
#[derive(Getters)]
#[get = "pub"]
pub struct Context {
    loader: CustomerDetailsLoader,
    config: Config,
}

impl Context {
    pub fn new(loader: CustomerDetailsLoader, config: Config) -> Self {
        Self { loader, config }
    }

    /// Build the loader on top of the in-memory backend seeded from the configured fixtures
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let backend = InMemoryBackend::from_file(config.fixtures())?
            .with_latency(Duration::from_millis(*config.latency_ms()));
        let loader = CustomerDetailsLoader::new(Arc::new(backend), config.cache().clone());

        info!(
            "Initialized CustomerDetailsLoader with caching (TTL: {}ms, enabled: {})",
            config.cache().default_ttl.num_milliseconds(),
            config.cache().enabled
        );

        Ok(Self::new(loader, config))
    }
}

pub type ContextPointer = Arc<Context>;
