mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{Config, CoordinatorConfig, PersistenceConfig, TransportConfig};
