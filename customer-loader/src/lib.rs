//! Customer detail loading for the shop back office, cached with [`request_cache`].

pub mod analytics;
pub mod backend;
pub mod config;
pub mod context;
mod error;
pub mod keys;
pub mod loader;
pub mod models;

pub use error::{BackendError, Error};
pub use loader::{CustomerDetails, CustomerDetailsLoader, LoaderStats};
