//! Boot ROM plugin - fills the host's ROM slot from a file
//!
//! Build with `cargo build --release` and copy the library into the host's
//! plugins directory, then request it with
//! `loader.load_for_slot("boot-rom", &config, &context)`.

use kiln::config::ConfigTree;
use kiln::context::ExecutionContext;
use kiln::error::BoxError;
use kiln::plugins::{
    AddressableMemory, FlatMemory, FromContext, MemoryReporting, Plugin, PluginDefinition,
    PluginRegistrar,
};

/// ROM image read from `path`, or `size` zero bytes when no path is given
pub struct BootRom {
    memory: FlatMemory,
}

impl Plugin for BootRom {}

impl FromContext for BootRom {
    fn from_context(_: &ExecutionContext, config: ConfigTree) -> Result<Self, BoxError> {
        let memory = match config.get("path").and_then(|path| path.as_str()) {
            Some(path) => FlatMemory::new(std::fs::read(path)?),
            None => {
                let size = config.get("size").and_then(|size| size.as_u64()).unwrap_or(256);
                FlatMemory::zeroed(usize::try_from(size)?)
            }
        };
        Ok(Self { memory })
    }
}

impl MemoryReporting for BootRom {
    fn addressable_memory(&self) -> &dyn AddressableMemory {
        &self.memory
    }
}

fn register(registrar: &mut PluginRegistrar) {
    registrar.register(
        PluginDefinition::of::<BootRom>()
            .named("boot-rom")
            .constructor()
            .reports_memory()
            .build(),
    );
}

kiln::declare_plugin_module!(register);
