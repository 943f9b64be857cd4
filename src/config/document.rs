//! Shape validation and active-set selection for the plugins document
//!
//! A document looks like:
//!
//! ```yaml
//! plugins:
//!   cpu-trace:
//!     active: true
//!     depth: 4
//!   screen-grab: {}
//! sharedPluginsConfig:
//!   output_dir: /tmp/emu
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::trace;

use super::ConfigTree;
use crate::error::{PluginError, Result};

pub const PLUGINS_KEY: &str = "plugins";
pub const SHARED_KEY: &str = "sharedPluginsConfig";
pub const ACTIVE_KEY: &str = "active";

static EMPTY_SECTION: Lazy<ConfigTree> = Lazy::new(ConfigTree::new);

/// Borrowed, validated view over a plugins document.
#[derive(Debug, Clone, Copy)]
pub struct PluginsDocument<'a> {
    /// Sections that are present but null (`plugins:` with no body) are
    /// treated as empty mappings
    plugins: Option<&'a ConfigTree>,
    shared: Option<&'a ConfigTree>,
}

impl<'a> PluginsDocument<'a> {
    /// Validate the document shape.
    ///
    /// # Errors
    /// Returns `PluginError::ConfigurationShape` if either section is missing
    /// or is neither a mapping nor null.
    pub fn parse(document: &'a ConfigTree) -> Result<Self> {
        let plugins = match document.get(PLUGINS_KEY) {
            None => return Err(missing(PLUGINS_KEY)),
            Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => return Err(not_a_mapping(PLUGINS_KEY, other)),
        };

        let shared = match document.get(SHARED_KEY) {
            None => return Err(missing(SHARED_KEY)),
            Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => return Err(not_a_mapping(SHARED_KEY, other)),
        };

        Ok(Self { plugins, shared })
    }

    /// Shared defaults applied to every plugin
    #[must_use]
    pub fn shared(&self) -> &'a ConfigTree {
        self.shared.unwrap_or(&EMPTY_SECTION)
    }

    /// Every candidate whose section is a mapping, in document order.
    ///
    /// Entries with any other kind of value are dropped without error.
    pub fn candidates(&self) -> impl Iterator<Item = (&'a str, &'a ConfigTree)> + 'a {
        self.plugins
            .into_iter()
            .flat_map(|plugins| plugins.iter())
            .filter_map(|(name, section)| match section {
                Value::Object(map) => Some((name.as_str(), map)),
                _ => {
                    trace!(plugin = %name, "Dropping plugin entry that is not a mapping");
                    None
                }
            })
    }

    /// Candidates that are switched on, in document order
    pub fn active(&self) -> impl Iterator<Item = (&'a str, &'a ConfigTree)> + 'a {
        self.candidates().filter(|(_, section)| is_active(section))
    }
}

/// A plugin is active when it has no `active` key, or the key is literally
/// `true`. Anything else, including `"true"` or `1`, switches it off.
#[must_use]
pub fn is_active(section: &ConfigTree) -> bool {
    match section.get(ACTIVE_KEY) {
        None => true,
        Some(value) => value == &Value::Bool(true),
    }
}

fn missing(key: &str) -> PluginError {
    PluginError::ConfigurationShape(format!("missing '{key}' section"))
}

fn not_a_mapping(key: &str, value: &Value) -> PluginError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    };
    PluginError::ConfigurationShape(format!("'{key}' must be a mapping, found {kind}"))
}
