//! Kiln - extension loading for the Furnace emulator host
//!
//! Kiln discovers extension modules on disk, registers the plugin
//! definitions they carry under their names, and activates configured
//! plugins against the host's execution context.
//!
//! # Modules
//!
//! - [`plugins`]: Discovery, registry, activation and the [`PluginsLoader`] entry point
//! - [`config`]: Configuration tree, document validation and three-layer merge
//! - [`context`]: Host services handed to plugins
//! - [`error`]: Error taxonomy shared by every stage
//!
//! # Example
//!
//! ```no_run
//! use kiln::config::HostConfig;
//! use kiln::context::ExecutionContext;
//! use kiln::plugins::{PluginsLoader, TracingSink};
//!
//! let config = HostConfig::load_default().unwrap();
//! let loader = PluginsLoader::from_dir(&config.plugins_dir);
//! let context = ExecutionContext::default();
//!
//! let plugins = loader
//!     .load_all(&config.document, &config.overrides, &context, &TracingSink)
//!     .unwrap();
//! context.publish_loaded(&plugins);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod plugins;

pub use error::{PluginError, Result};
pub use plugins::PluginsLoader;
