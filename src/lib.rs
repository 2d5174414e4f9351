//! Plugrack - typed plugin registry with category contracts and module discovery

pub mod config;
pub mod error;
pub mod plugins;

pub use config::DiscoveryConfig;
pub use error::{RackError, Result};
pub use plugins::{PluginLoader, Registry};
