//! Host services handed to plugins at construction time

use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::plugins::PluginInstance;

/// Opaque handle to a host subsystem.
///
/// The loader never looks inside; plugins downcast to the concrete type they
/// were built against.
#[derive(Clone)]
pub struct HostHandle(Arc<dyn Any + Send + Sync>);

impl HostHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostHandle(..)")
    }
}

/// Summary of a plugin that made it through a batch load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    /// Name the plugin was requested under
    pub name: String,
    /// Fully-qualified name of the implementing type
    pub qualified_name: String,
}

/// Bundle of host collaborators passed unmodified to every activated plugin.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    processor: Option<HostHandle>,
    devices: Option<HostHandle>,
    display: Option<HostHandle>,
    input: Option<HostHandle>,
    loaded_plugins: OnceCell<Vec<LoadedPlugin>>,
}

impl ExecutionContext {
    #[must_use]
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    #[must_use]
    pub fn processor(&self) -> Option<&HostHandle> {
        self.processor.as_ref()
    }

    #[must_use]
    pub fn devices(&self) -> Option<&HostHandle> {
        self.devices.as_ref()
    }

    #[must_use]
    pub fn display(&self) -> Option<&HostHandle> {
        self.display.as_ref()
    }

    #[must_use]
    pub fn input(&self) -> Option<&HostHandle> {
        self.input.as_ref()
    }

    /// Plugins loaded by the last completed batch.
    ///
    /// Empty until the host calls [`ExecutionContext::publish_loaded`], so
    /// plugins constructed during a batch always see an empty slice.
    #[must_use]
    pub fn loaded_plugins(&self) -> &[LoadedPlugin] {
        self.loaded_plugins.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record the outcome of a batch load. Only the first call has an effect.
    ///
    /// Returns `false` if the list had already been published.
    pub fn publish_loaded(&self, instances: &[PluginInstance]) -> bool {
        let loaded = instances
            .iter()
            .map(|instance| LoadedPlugin {
                name: instance.name().to_string(),
                qualified_name: instance.qualified_name().to_string(),
            })
            .collect();
        self.loaded_plugins.set(loaded).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ExecutionContextBuilder {
    processor: Option<HostHandle>,
    devices: Option<HostHandle>,
    display: Option<HostHandle>,
    input: Option<HostHandle>,
}

impl ExecutionContextBuilder {
    #[must_use]
    pub fn processor(mut self, handle: HostHandle) -> Self {
        self.processor = Some(handle);
        self
    }

    #[must_use]
    pub fn devices(mut self, handle: HostHandle) -> Self {
        self.devices = Some(handle);
        self
    }

    #[must_use]
    pub fn display(mut self, handle: HostHandle) -> Self {
        self.display = Some(handle);
        self
    }

    #[must_use]
    pub fn input(mut self, handle: HostHandle) -> Self {
        self.input = Some(handle);
        self
    }

    #[must_use]
    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            processor: self.processor,
            devices: self.devices,
            display: self.display,
            input: self.input,
            loaded_plugins: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cpu {
        clock_hz: u64,
    }

    #[test]
    fn test_handles_downcast_to_host_types() {
        let ctx = ExecutionContext::builder()
            .processor(HostHandle::new(Cpu { clock_hz: 4_194_304 }))
            .build();

        let cpu = ctx.processor().and_then(|h| h.downcast_ref::<Cpu>()).unwrap();
        assert_eq!(cpu.clock_hz, 4_194_304);
        assert!(ctx.processor().unwrap().downcast_ref::<String>().is_none());
        assert!(ctx.display().is_none());
    }

    #[test]
    fn test_loaded_plugins_empty_until_published() {
        let ctx = ExecutionContext::default();
        assert!(ctx.loaded_plugins().is_empty());
        assert!(ctx.publish_loaded(&[]));
        assert!(!ctx.publish_loaded(&[]));
    }
}
