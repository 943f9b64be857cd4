// Public entry point of the plugin system:
// - One strict path for a plugin that must fill a slot
// - One lenient path for the configured batch, where a broken plugin is
//   reported and skipped
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::activator::{activate, activate_slot, ActivationRequest, PluginInstance, SlotPlugin};
use super::registry::PluginRegistry;
use crate::config::{merge, ConfigTree, PluginsDocument};
use crate::context::ExecutionContext;
use crate::error::Result;

/// Message template used for per-plugin batch failures.
/// Arguments: plugin name, failure message.
pub const LOAD_FAILURE_TEMPLATE: &str = "Failed to load plugin {}: {}";

/// Receives per-plugin failures during batch loading
pub trait NotificationSink {
    fn report(&self, template: &str, args: &[&str]);
}

impl<F> NotificationSink for F
where
    F: Fn(&str, &[&str]),
{
    fn report(&self, template: &str, args: &[&str]) {
        self(template, args)
    }
}

/// Forwards reports to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn report(&self, template: &str, args: &[&str]) {
        warn!("{}", render(template, args));
    }
}

/// Substitute `{}` placeholders in order. Surplus placeholders stay as they
/// are, surplus arguments are ignored.
#[must_use]
pub fn render(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Plugin loader for resolving, configuring and activating plugins
#[derive(Debug)]
pub struct PluginsLoader {
    registry: PluginRegistry,
}

impl PluginsLoader {
    #[must_use]
    pub fn new(registry: PluginRegistry) -> Self {
        Self { registry }
    }

    /// Loader over native modules below `root`
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(PluginRegistry::new(root))
    }

    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Load the one plugin that must occupy a slot.
    ///
    /// `config` is used as-is. The plugin must declare the memory-reporting
    /// accessor.
    ///
    /// # Errors
    /// Any failure is returned: unknown name, registry build failure,
    /// contract violation, failing creation path, or a factory that returned
    /// nothing.
    pub fn load_for_slot(
        &self,
        name: &str,
        config: &ConfigTree,
        context: &ExecutionContext,
    ) -> Result<SlotPlugin> {
        let definition = self.registry.resolve(name)?;
        let slot = activate_slot(&definition, name, config, context)?;
        info!(plugin = %name, qualified = %slot.qualified_name(), "Loaded slot plugin");
        Ok(slot)
    }

    /// Load every active plugin in `document`.
    ///
    /// Each plugin gets its own section merged with `overrides` and the
    /// shared defaults. Plugins that fail are reported to `sink` and skipped.
    ///
    /// # Errors
    /// - `PluginError::ConfigurationShape` if the document is malformed
    /// - registry build errors (`Scan`, `ModuleLoad`); these are never
    ///   isolated per plugin
    pub fn load_all(
        &self,
        document: &ConfigTree,
        overrides: &ConfigTree,
        context: &ExecutionContext,
        sink: &dyn NotificationSink,
    ) -> Result<Vec<PluginInstance>> {
        let document = PluginsDocument::parse(document)?;
        let active: Vec<_> = document.active().collect();
        if active.is_empty() {
            debug!("No active plugins configured");
            return Ok(Vec::new());
        }

        self.registry.ensure_built()?;

        let mut loaded = Vec::with_capacity(active.len());
        for (name, section) in active {
            let config = merge(section, document.shared(), overrides);
            let request = ActivationRequest {
                name,
                config: &config,
                require_capability: false,
            };

            let outcome = self
                .registry
                .resolve(name)
                .and_then(|definition| activate(&definition, request, context));

            match outcome {
                Ok(Some(instance)) => {
                    info!(plugin = %name, qualified = %instance.qualified_name(), "Loaded plugin");
                    loaded.push(instance);
                }
                Ok(None) => {
                    debug!(plugin = %name, "Factory returned nothing, skipping plugin");
                }
                Err(e) => {
                    let message = e.to_string();
                    sink.report(LOAD_FAILURE_TEMPLATE, &[name, message.as_str()]);
                }
            }
        }

        Ok(loaded)
    }
}
