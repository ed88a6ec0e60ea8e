//! Quire core library: site registrations, directory layout, registry
//! persistence, and global configuration.
//!
//! - [`types`]: [`HostName`], [`SiteRegistration`], [`PublishCredentials`]
//! - [`paths`]: the per-site directory triple and path filters
//! - [`registry`]: [`SiteRegistry`], the one shared mutable collection
//! - [`config`]: [`Config`] loading and credential resolution
//! - [`error`]: [`RegistryError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod registry;
pub mod types;

pub use config::{Config, GeneralConfig, StoreConfig};
pub use error::{ConfigError, RegistryError};
pub use paths::{is_hidden_or_temp, SiteDirs};
pub use registry::SiteRegistry;
pub use types::{HostName, PublishCredentials, SiteRegistration};
