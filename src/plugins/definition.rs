//! Registered, not-yet-instantiated plugin descriptions
//!
//! A definition is built once, when a module registers it, and never changes
//! afterwards. The creation strategy is decided at that point so activation
//! only has to follow it.

use bitflags::bitflags;
use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use super::api::{
    AddressableMemory, FromContext, MemoryPlugin, MemoryReporting, Plugin, PluginFactory,
    MEMORY_INTERFACE,
};
use super::native::ModuleHandle;
use crate::config::ConfigTree;
use crate::context::ExecutionContext;
use crate::error::BoxError;

bitflags! {
    /// What a definition declares it can do
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const FACTORY = 1 << 0;
        const CONSTRUCTOR = 1 << 1;
        const MEMORY = 1 << 2;
    }
}

pub(crate) type FactoryFn =
    fn(&ExecutionContext, ConfigTree) -> Result<Option<Box<dyn Plugin>>, BoxError>;
pub(crate) type ConstructorFn =
    fn(&ExecutionContext, ConfigTree) -> Result<Box<dyn Plugin>, BoxError>;
pub(crate) type SlotCastFn = fn(Box<dyn Plugin>) -> Option<Box<dyn MemoryPlugin>>;

/// Named factory operation and the type it produces
#[derive(Clone, Copy)]
pub struct Factory {
    produces: TypeId,
    produces_name: &'static str,
    invoke: FactoryFn,
}

impl Factory {
    #[must_use]
    pub fn of<P: PluginFactory>() -> Self {
        Self {
            produces: TypeId::of::<P>(),
            produces_name: type_name::<P>(),
            invoke: invoke_factory::<P>,
        }
    }

    #[must_use]
    pub fn produces_name(&self) -> &'static str {
        self.produces_name
    }
}

fn invoke_factory<P: PluginFactory>(
    context: &ExecutionContext,
    config: ConfigTree,
) -> Result<Option<Box<dyn Plugin>>, BoxError> {
    Ok(P::create(context, config)?.map(|plugin| Box::new(plugin) as Box<dyn Plugin>))
}

fn invoke_constructor<P: FromContext>(
    context: &ExecutionContext,
    config: ConfigTree,
) -> Result<Box<dyn Plugin>, BoxError> {
    Ok(Box::new(P::from_context(context, config)?))
}

/// Declared shape of the memory-reporting accessor.
#[derive(Clone, Copy)]
pub struct MemoryAccessor {
    owner: TypeId,
    interface: &'static str,
    result_type_name: &'static str,
    cast: SlotCastFn,
}

impl MemoryAccessor {
    #[must_use]
    pub fn of<P: MemoryPlugin>() -> Self {
        Self {
            owner: TypeId::of::<P>(),
            interface: MEMORY_INTERFACE,
            result_type_name: type_name::<dyn AddressableMemory>(),
            cast: cast_slot::<P>,
        }
    }

    /// Whether the accessor hands out this host's memory interface.
    ///
    /// Compared by identifier: the module's copy of the trait has its own
    /// type id even when it is the same revision.
    #[must_use]
    pub fn returns_host_memory(&self) -> bool {
        self.interface == MEMORY_INTERFACE
    }

    /// Interface identifier the module was built against
    #[must_use]
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    #[must_use]
    pub fn result_type_name(&self) -> &'static str {
        self.result_type_name
    }

    pub(crate) fn owner(&self) -> TypeId {
        self.owner
    }

    pub(crate) fn cast(&self) -> SlotCastFn {
        self.cast
    }

    #[cfg(test)]
    pub(crate) fn with_interface<R: ?Sized>(mut self, interface: &'static str) -> Self {
        self.interface = interface;
        self.result_type_name = type_name::<R>();
        self
    }
}

fn cast_slot<P: MemoryPlugin>(plugin: Box<dyn Plugin>) -> Option<Box<dyn MemoryPlugin>> {
    plugin
        .into_any()
        .downcast::<P>()
        .ok()
        .map(|plugin| plugin as Box<dyn MemoryPlugin>)
}

/// How instances of a definition get created
#[derive(Clone)]
pub enum CreationStrategy {
    Factory(FactoryFn),
    Constructor(ConstructorFn),
    /// No usable creation path; the reason is reported on activation
    Unavailable(String),
}

impl CreationStrategy {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Factory(_) => "factory",
            Self::Constructor(_) => "constructor",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl fmt::Debug for CreationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
            other => f.write_str(other.label()),
        }
    }
}

pub struct PluginDefinition {
    name: Option<String>,
    qualified_name: String,
    plugin_type: TypeId,
    creation: CreationStrategy,
    capabilities: Capabilities,
    memory: Option<MemoryAccessor>,
    // Last field: dropped after everything that points into the library
    module: Option<Arc<ModuleHandle>>,
}

impl PluginDefinition {
    /// Start describing plugin type `P`
    #[must_use]
    pub fn of<P: Plugin>() -> DefinitionBuilder<P> {
        DefinitionBuilder {
            name: None,
            factory: None,
            constructor: None,
            memory: None,
            _plugin: PhantomData,
        }
    }

    /// Explicit logical name, if the module gave one
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fully-qualified name of the implementing type
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Name the definition is canonically looked up under
    #[must_use]
    pub fn key(&self) -> &str {
        self.name().unwrap_or(&self.qualified_name)
    }

    #[must_use]
    pub fn plugin_type(&self) -> TypeId {
        self.plugin_type
    }

    #[must_use]
    pub fn creation(&self) -> &CreationStrategy {
        &self.creation
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub fn memory_accessor(&self) -> Option<&MemoryAccessor> {
        self.memory.as_ref()
    }

    /// Module the definition came from, `None` for in-process definitions
    #[must_use]
    pub fn module_path(&self) -> Option<&Path> {
        self.module.as_deref().map(ModuleHandle::path)
    }

    pub(crate) fn attach_module(&mut self, module: Arc<ModuleHandle>) {
        self.module = Some(module);
    }

    #[cfg(test)]
    pub(crate) fn set_memory_accessor(&mut self, accessor: Option<MemoryAccessor>) {
        self.capabilities
            .set(Capabilities::MEMORY, accessor.is_some());
        self.memory = accessor;
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.name)
            .field("qualified_name", &self.qualified_name)
            .field("creation", &self.creation)
            .field("capabilities", &self.capabilities)
            .field("module", &self.module_path())
            .finish()
    }
}

/// Builder returned by [`PluginDefinition::of`]
pub struct DefinitionBuilder<P> {
    name: Option<String>,
    factory: Option<Factory>,
    constructor: Option<ConstructorFn>,
    memory: Option<MemoryAccessor>,
    _plugin: PhantomData<fn() -> P>,
}

impl<P: Plugin> DefinitionBuilder<P> {
    /// Register under an explicit logical name as well as the type name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use `P`'s own [`PluginFactory`] implementation
    #[must_use]
    pub fn factory(self) -> Self
    where
        P: PluginFactory,
    {
        self.with_factory(Factory::of::<P>())
    }

    /// Declare a factory that may produce some other type. It is only used
    /// when it produces `P`.
    #[must_use]
    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub fn constructor(mut self) -> Self
    where
        P: FromContext,
    {
        self.constructor = Some(invoke_constructor::<P>);
        self
    }

    #[must_use]
    pub fn reports_memory(self) -> Self
    where
        P: MemoryReporting,
    {
        self.with_memory_accessor(MemoryAccessor::of::<P>())
    }

    #[must_use]
    pub fn with_memory_accessor(mut self, accessor: MemoryAccessor) -> Self {
        self.memory = Some(accessor);
        self
    }

    /// Freeze the definition and decide its creation strategy.
    #[must_use]
    pub fn build(self) -> PluginDefinition {
        let plugin_type = TypeId::of::<P>();
        let mut capabilities = Capabilities::empty();

        let compatible_factory = self.factory.filter(|f| f.produces == plugin_type);
        if compatible_factory.is_some() {
            capabilities |= Capabilities::FACTORY;
        }
        if self.constructor.is_some() {
            capabilities |= Capabilities::CONSTRUCTOR;
        }
        if self.memory.is_some() {
            capabilities |= Capabilities::MEMORY;
        }

        let creation = match (compatible_factory, self.constructor) {
            (Some(factory), _) => CreationStrategy::Factory(factory.invoke),
            (None, Some(constructor)) => CreationStrategy::Constructor(constructor),
            (None, None) => CreationStrategy::Unavailable(match self.factory {
                Some(factory) => format!(
                    "factory produces {}, not {}, and no constructor is declared",
                    factory.produces_name,
                    type_name::<P>()
                ),
                None => "neither a factory nor a constructor is declared".to_string(),
            }),
        };

        PluginDefinition {
            name: self.name,
            qualified_name: type_name::<P>().to_string(),
            plugin_type,
            creation,
            capabilities,
            memory: self.memory,
            module: None,
        }
    }
}
