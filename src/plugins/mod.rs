// Extension loading pipeline:
// scanner -> native (extract) -> registry -> activator -> loader
pub mod activator;
pub mod api;
pub mod definition;
pub mod loader;
pub mod native;
pub mod registry;
pub mod scanner;

pub use activator::{activate, activate_slot, ActivationRequest, PluginInstance, SlotPlugin};
pub use api::{
    AddressableMemory, AsAny, FlatMemory, FromContext, MemoryPlugin, MemoryReporting, Plugin,
    PluginFactory, MEMORY_INTERFACE,
};
pub use definition::{
    Capabilities, CreationStrategy, DefinitionBuilder, Factory, MemoryAccessor, PluginDefinition,
};
pub use loader::{render, NotificationSink, PluginsLoader, TracingSink, LOAD_FAILURE_TEMPLATE};
pub use native::{
    DefinitionExtractor, DefinitionSet, ModuleHandle, NativeExtractor, PluginRegistrar,
    PLUGIN_ABI_VERSION,
};
pub use registry::PluginRegistry;
pub use scanner::{DirectoryScanner, ModuleScanner};
