//! Error types for extension discovery and activation

use std::path::PathBuf;

/// Error type produced by plugin creation paths.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the loader
pub type Result<T, E = PluginError> = std::result::Result<T, E>;

/// Everything that can go wrong between scanning a directory and handing a
/// plugin instance back to the host.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The configuration document is missing a required section, or the
    /// section is not a mapping.
    #[error("invalid configuration document: {0}")]
    ConfigurationShape(String),

    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// The definition cannot satisfy the requested activation.
    #[error("plugin '{plugin}' violates its contract: {reason}")]
    ContractViolation { plugin: String, reason: String },

    /// The creation path itself failed.
    #[error("plugin '{plugin}' failed to activate: {reason}")]
    ActivationInvocation { plugin: String, reason: String },

    #[error("failed to load module {}: {reason}", .path.display())]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("failed to scan {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PluginError {
    pub(crate) fn contract(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invocation(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActivationInvocation {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn module(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
