// Native extension modules:
// - Dynamic loading with libloading
// - Modules self-register through a single entry point
// - The library stays mapped for as long as any definition or instance
//   created from it is alive
use libloading::Library;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::definition::PluginDefinition;
use crate::error::{PluginError, Result};

/// Version of the registration interface between host and modules.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Symbol returning the module's [`PLUGIN_ABI_VERSION`]
pub const ABI_VERSION_SYMBOL: &[u8] = b"_kiln_abi_version";

/// Symbol receiving a [`PluginRegistrar`]
pub const REGISTER_SYMBOL: &[u8] = b"_kiln_register";

/// Function signature for the ABI version probe
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Function signature for the module entry point
pub type RegisterFn = unsafe fn(&mut PluginRegistrar);

/// Definitions found in one module, keyed by lookup name, in registration
/// order.
pub type DefinitionSet = Vec<(String, Arc<PluginDefinition>)>;

/// Inspects a module and yields the plugin definitions it carries.
pub trait DefinitionExtractor: Send + Sync {
    /// # Errors
    /// Returns `PluginError::ModuleLoad` if the module cannot be loaded or
    /// does not follow the registration protocol.
    fn extract(&self, path: &Path) -> Result<DefinitionSet>;
}

/// Collects the definitions a module registers.
#[derive(Debug, Default)]
pub struct PluginRegistrar {
    definitions: Vec<PluginDefinition>,
}

impl PluginRegistrar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: PluginDefinition) {
        self.definitions.push(definition);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Key every definition by its qualified name and, when present, by its
    /// explicit name. The explicit entry comes second so it wins if another
    /// definition in the same module uses the same string as a type name.
    #[must_use]
    pub fn finish(self) -> DefinitionSet {
        self.finish_with(None)
    }

    fn finish_with(self, module: Option<&Arc<ModuleHandle>>) -> DefinitionSet {
        let mut set = Vec::with_capacity(self.definitions.len() * 2);
        for mut definition in self.definitions {
            if let Some(module) = module {
                definition.attach_module(Arc::clone(module));
            }
            let definition = Arc::new(definition);
            set.push((definition.qualified_name().to_string(), Arc::clone(&definition)));
            if let Some(name) = definition.name() {
                set.push((name.to_string(), Arc::clone(&definition)));
            }
        }
        set
    }
}

/// A loaded native module
pub struct ModuleHandle {
    path: PathBuf,
    _library: Library,
}

impl ModuleHandle {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Loads modules as dynamic libraries and runs their entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeExtractor;

impl DefinitionExtractor for NativeExtractor {
    fn extract(&self, path: &Path) -> Result<DefinitionSet> {
        // Safety: loading a library runs its initialisers. Modules in the
        // plugins directory are trusted by the host.
        let library = unsafe { Library::new(path) }
            .map_err(|e| PluginError::module(path, format!("failed to load library: {e}")))?;

        let register = {
            // Safety: the symbol types match what `declare_plugin_module!`
            // exports, and the ABI version is checked before the entry point
            // is used.
            let version = unsafe { library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL) }
                .map_err(|e| PluginError::module(path, format!("not a plugin module: {e}")))?;
            let version = unsafe { version() };
            if version != PLUGIN_ABI_VERSION {
                return Err(PluginError::module(
                    path,
                    format!("plugin ABI version {version}, host expects {PLUGIN_ABI_VERSION}"),
                ));
            }

            let register = unsafe { library.get::<RegisterFn>(REGISTER_SYMBOL) }.map_err(|e| {
                PluginError::module(path, format!("failed to find plugin entry point: {e}"))
            })?;
            *register
        };

        let mut registrar = PluginRegistrar::new();
        // Safety: `register` points into `library`, which is alive here and is
        // moved into the module handle below.
        panic::catch_unwind(AssertUnwindSafe(|| unsafe { register(&mut registrar) }))
            .map_err(|_| PluginError::module(path, "entry point panicked"))?;

        debug!(
            module = %path.display(),
            definitions = registrar.len(),
            "Inspected extension module"
        );

        let module = Arc::new(ModuleHandle {
            path: path.to_path_buf(),
            _library: library,
        });
        Ok(registrar.finish_with(Some(&module)))
    }
}

/// Export the registration entry points from a plugin module.
///
/// ```rust,ignore
/// use kiln::plugins::{PluginDefinition, PluginRegistrar};
///
/// fn register(registrar: &mut PluginRegistrar) {
///     registrar.register(
///         PluginDefinition::of::<Tracer>().named("cpu-trace").constructor().build(),
///     );
/// }
///
/// kiln::declare_plugin_module!(register);
/// ```
#[macro_export]
macro_rules! declare_plugin_module {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn _kiln_abi_version() -> u32 {
            $crate::plugins::PLUGIN_ABI_VERSION
        }

        #[no_mangle]
        pub fn _kiln_register(registrar: &mut $crate::plugins::PluginRegistrar) {
            $register(registrar)
        }
    };
}
