//! Turning a definition plus configuration into a live plugin

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

use super::api::{AddressableMemory, MemoryPlugin, Plugin, MEMORY_INTERFACE};
use super::definition::{CreationStrategy, PluginDefinition};
use crate::config::ConfigTree;
use crate::context::ExecutionContext;
use crate::error::{BoxError, PluginError, Result};

/// What the caller asks the activator to produce
#[derive(Debug, Clone, Copy)]
pub struct ActivationRequest<'a> {
    /// Name the plugin was requested under, used in errors and reports
    pub name: &'a str,
    pub config: &'a ConfigTree,
    /// Require the memory-reporting accessor
    pub require_capability: bool,
}

/// A plugin handed back to the host.
///
/// Holds on to its definition so the module that implements it stays loaded
/// for as long as the instance exists.
pub struct PluginInstance {
    plugin: Box<dyn Plugin>,
    name: String,
    definition: Arc<PluginDefinition>,
}

impl PluginInstance {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn qualified_name(&self) -> &str {
        self.definition.qualified_name()
    }

    #[must_use]
    pub fn definition(&self) -> &Arc<PluginDefinition> {
        &self.definition
    }

    #[must_use]
    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn Plugin {
        self.plugin.as_mut()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.plugin.as_ref().as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("qualified_name", &self.qualified_name())
            .finish_non_exhaustive()
    }
}

/// A plugin occupying a required slot; always reports its memory.
pub struct SlotPlugin {
    plugin: Box<dyn MemoryPlugin>,
    name: String,
    definition: Arc<PluginDefinition>,
}

impl SlotPlugin {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn qualified_name(&self) -> &str {
        self.definition.qualified_name()
    }

    #[must_use]
    pub fn definition(&self) -> &Arc<PluginDefinition> {
        &self.definition
    }

    #[must_use]
    pub fn addressable_memory(&self) -> &dyn AddressableMemory {
        self.plugin.addressable_memory()
    }

    #[must_use]
    pub fn plugin(&self) -> &dyn MemoryPlugin {
        self.plugin.as_ref()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.plugin.as_ref().as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for SlotPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPlugin")
            .field("name", &self.name)
            .field("qualified_name", &self.qualified_name())
            .field("memory_size", &self.addressable_memory().size())
            .finish_non_exhaustive()
    }
}

/// Create an instance of `definition`.
///
/// The creation path receives its own copy of the configuration. `Ok(None)`
/// means a factory ran successfully but produced nothing.
///
/// # Errors
/// - `PluginError::ContractViolation` if there is no creation path, or the
///   memory capability is required and not declared with the right shape
/// - `PluginError::ActivationInvocation` if the creation path fails or panics
pub fn activate(
    definition: &Arc<PluginDefinition>,
    request: ActivationRequest<'_>,
    context: &ExecutionContext,
) -> Result<Option<PluginInstance>> {
    if request.require_capability {
        check_memory_capability(definition, request.name)?;
    }

    let config = request.config.clone();
    let created = match definition.creation() {
        CreationStrategy::Factory(create) => invoke(request.name, || create(context, config))?,
        CreationStrategy::Constructor(construct) => {
            invoke(request.name, || construct(context, config).map(Some))?
        }
        CreationStrategy::Unavailable(reason) => {
            return Err(PluginError::contract(
                request.name,
                format!("no creation path: {reason}"),
            ));
        }
    };

    debug!(
        plugin = %request.name,
        strategy = definition.creation().label(),
        created = created.is_some(),
        "Activated plugin"
    );

    Ok(created.map(|plugin| PluginInstance {
        plugin,
        name: request.name.to_string(),
        definition: Arc::clone(definition),
    }))
}

/// Create an instance for a required slot. The capability check is always
/// performed and an empty factory result is an error.
///
/// # Errors
/// Everything [`activate`] reports, plus `PluginError::ActivationInvocation`
/// when the factory returns nothing.
pub fn activate_slot(
    definition: &Arc<PluginDefinition>,
    name: &str,
    config: &ConfigTree,
    context: &ExecutionContext,
) -> Result<SlotPlugin> {
    let request = ActivationRequest {
        name,
        config,
        require_capability: true,
    };
    let instance = activate(definition, request, context)?
        .ok_or_else(|| PluginError::invocation(name, "factory returned nothing usable"))?;

    let accessor = definition
        .memory_accessor()
        .ok_or_else(|| PluginError::contract(name, "no memory-reporting accessor declared"))?;
    let PluginInstance {
        plugin, definition, ..
    } = instance;
    let plugin = (accessor.cast())(plugin).ok_or_else(|| {
        PluginError::contract(
            name,
            format!("created instance is not a {}", definition.qualified_name()),
        )
    })?;

    Ok(SlotPlugin {
        plugin,
        name: name.to_string(),
        definition,
    })
}

fn check_memory_capability(definition: &PluginDefinition, name: &str) -> Result<()> {
    let accessor = definition
        .memory_accessor()
        .ok_or_else(|| PluginError::contract(name, "no memory-reporting accessor declared"))?;

    if accessor.owner() != definition.plugin_type() {
        return Err(PluginError::contract(
            name,
            format!(
                "memory-reporting accessor is declared on another type than {}",
                definition.qualified_name()
            ),
        ));
    }

    if !accessor.returns_host_memory() {
        return Err(PluginError::contract(
            name,
            format!(
                "memory-reporting accessor returns {} ({}), host expects {}",
                accessor.result_type_name(),
                accessor.interface(),
                MEMORY_INTERFACE
            ),
        ));
    }

    Ok(())
}

fn invoke<F>(name: &str, create: F) -> Result<Option<Box<dyn Plugin>>>
where
    F: FnOnce() -> Result<Option<Box<dyn Plugin>>, BoxError>,
{
    match panic::catch_unwind(AssertUnwindSafe(create)) {
        Ok(Ok(created)) => Ok(created),
        Ok(Err(e)) => Err(PluginError::invocation(name, e.to_string())),
        Err(payload) => Err(PluginError::invocation(
            name,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::api::{FlatMemory, FromContext, MemoryReporting, PluginFactory};
    use crate::plugins::definition::MemoryAccessor;
    use serde_json::{json, Value};

    struct Rom {
        memory: FlatMemory,
        config: ConfigTree,
    }

    impl Plugin for Rom {}

    impl FromContext for Rom {
        fn from_context(_: &ExecutionContext, config: ConfigTree) -> Result<Self, BoxError> {
            let size = config.get("size").and_then(Value::as_u64).unwrap_or(4) as usize;
            Ok(Rom {
                memory: FlatMemory::zeroed(size),
                config,
            })
        }
    }

    impl MemoryReporting for Rom {
        fn addressable_memory(&self) -> &dyn AddressableMemory {
            &self.memory
        }
    }

    struct Mutating;
    impl Plugin for Mutating {}
    impl FromContext for Mutating {
        fn from_context(_: &ExecutionContext, mut config: ConfigTree) -> Result<Self, BoxError> {
            config.insert("touched".to_string(), json!(true));
            Ok(Mutating)
        }
    }

    struct Empty;
    impl Plugin for Empty {}
    impl PluginFactory for Empty {
        fn create(_: &ExecutionContext, _: ConfigTree) -> Result<Option<Self>, BoxError> {
            Ok(None)
        }
    }
    impl MemoryReporting for Empty {
        fn addressable_memory(&self) -> &dyn AddressableMemory {
            unreachable!("never constructed")
        }
    }

    struct Failing;
    impl Plugin for Failing {}
    impl FromContext for Failing {
        fn from_context(_: &ExecutionContext, _: ConfigTree) -> Result<Self, BoxError> {
            Err("video device unavailable".into())
        }
    }

    struct Panicking;
    impl Plugin for Panicking {}
    impl FromContext for Panicking {
        fn from_context(_: &ExecutionContext, _: ConfigTree) -> Result<Self, BoxError> {
            panic!("bad opcode table")
        }
    }

    fn request<'a>(config: &'a ConfigTree, require_capability: bool) -> ActivationRequest<'a> {
        ActivationRequest {
            name: "test",
            config,
            require_capability,
        }
    }

    #[test]
    fn test_constructor_receives_config() {
        let def = Arc::new(PluginDefinition::of::<Rom>().constructor().build());
        let mut config = ConfigTree::new();
        config.insert("size".to_string(), json!(8));

        let instance = activate(&def, request(&config, false), &ExecutionContext::default())
            .unwrap()
            .unwrap();
        let rom = instance.downcast_ref::<Rom>().unwrap();
        assert_eq!(rom.memory.size(), 8);
        assert_eq!(rom.config, config);
        assert_eq!(instance.name(), "test");
    }

    #[test]
    fn test_creation_path_cannot_mutate_callers_config() {
        let def = Arc::new(PluginDefinition::of::<Mutating>().constructor().build());
        let config = ConfigTree::new();

        activate(&def, request(&config, false), &ExecutionContext::default()).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_no_creation_path_is_contract_violation() {
        let def = Arc::new(PluginDefinition::of::<Rom>().build());
        let config = ConfigTree::new();

        let err = activate(&def, request(&config, false), &ExecutionContext::default())
            .unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation { .. }));
    }

    #[test]
    fn test_failure_and_panic_become_invocation_errors() {
        let config = ConfigTree::new();
        let ctx = ExecutionContext::default();

        let def = Arc::new(PluginDefinition::of::<Failing>().constructor().build());
        match activate(&def, request(&config, false), &ctx) {
            Err(PluginError::ActivationInvocation { reason, .. }) => {
                assert_eq!(reason, "video device unavailable");
            }
            other => panic!("unexpected result {other:?}"),
        }

        let def = Arc::new(PluginDefinition::of::<Panicking>().constructor().build());
        match activate(&def, request(&config, false), &ctx) {
            Err(PluginError::ActivationInvocation { reason, .. }) => {
                assert!(reason.contains("bad opcode table"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_capability_checked_before_invocation() {
        // Panicking would fail invocation; the contract check must fire first
        let def = Arc::new(PluginDefinition::of::<Panicking>().constructor().build());
        let config = ConfigTree::new();

        let err = activate(&def, request(&config, true), &ExecutionContext::default())
            .unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation { .. }));
    }

    #[test]
    fn test_accessor_with_wrong_interface_is_rejected() {
        let mut def = PluginDefinition::of::<Rom>().constructor().reports_memory().build();
        def.set_memory_accessor(Some(
            MemoryAccessor::of::<Rom>().with_interface::<FlatMemory>("kiln.addressable-memory/0"),
        ));
        let def = Arc::new(def);
        let config = ConfigTree::new();

        let err = activate_slot(&def, "rom", &config, &ExecutionContext::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("FlatMemory"));
        assert!(message.contains("kiln.addressable-memory/0"));
        assert!(message.contains(MEMORY_INTERFACE));
    }

    #[test]
    fn test_accessor_declared_on_other_type_is_rejected() {
        let def = Arc::new(
            PluginDefinition::of::<Mutating>()
                .constructor()
                .with_memory_accessor(MemoryAccessor::of::<Rom>())
                .build(),
        );
        let config = ConfigTree::new();

        let err = activate_slot(&def, "rom", &config, &ExecutionContext::default()).unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation { .. }));
    }

    #[test]
    fn test_slot_activation_reports_memory() {
        let def = Arc::new(PluginDefinition::of::<Rom>().constructor().reports_memory().build());
        let config = ConfigTree::new();

        let slot = activate_slot(&def, "rom", &config, &ExecutionContext::default()).unwrap();
        assert_eq!(slot.addressable_memory().size(), 4);
        assert!(slot.downcast_ref::<Rom>().is_some());
    }

    #[test]
    fn test_empty_factory_result() {
        let def = Arc::new(PluginDefinition::of::<Empty>().factory().reports_memory().build());
        let config = ConfigTree::new();
        let ctx = ExecutionContext::default();

        assert!(activate(&def, request(&config, false), &ctx).unwrap().is_none());
        let err = activate_slot(&def, "empty", &config, &ctx).unwrap_err();
        assert!(err.to_string().contains("nothing usable"));
    }
}
