//! Plugin API definitions
use std::any::Any;

use crate::config::ConfigTree;
use crate::context::ExecutionContext;
use crate::error::BoxError;

/// Type-erasure helpers every plugin gets for free.
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Marker trait for anything the loader can hand back to the host.
///
/// What a plugin does once activated is between the plugin and the host.
pub trait Plugin: AsAny {}

/// Named factory creation path.
///
/// Preferred over [`FromContext`] when a definition offers both. Returning
/// `Ok(None)` means the factory had nothing usable to give.
pub trait PluginFactory: Plugin + Sized {
    fn create(context: &ExecutionContext, config: ConfigTree) -> Result<Option<Self>, BoxError>;
}

/// Constructor-like creation path taking the same two arguments
pub trait FromContext: Plugin + Sized {
    fn from_context(context: &ExecutionContext, config: ConfigTree) -> Result<Self, BoxError>;
}

/// Identifier of the [`AddressableMemory`] interface.
///
/// Modules carry their own build of this crate, so type ids taken inside a
/// module never match the host's. Bump the revision whenever the trait
/// changes shape.
pub const MEMORY_INTERFACE: &str = "kiln.addressable-memory/1";

/// Memory interface a slot plugin must expose
pub trait AddressableMemory {
    /// Number of addressable bytes
    fn size(&self) -> usize;

    /// Read one byte, `None` when out of range
    fn read(&self, address: usize) -> Option<u8>;
}

/// Zero-argument accessor reporting the plugin's addressable memory.
pub trait MemoryReporting {
    fn addressable_memory(&self) -> &dyn AddressableMemory;
}

/// A plugin that can occupy a memory slot
pub trait MemoryPlugin: Plugin + MemoryReporting {}

impl<T: Plugin + MemoryReporting> MemoryPlugin for T {}

/// Flat byte buffer, the simplest memory a plugin can report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl FlatMemory {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }
}

impl AddressableMemory for FlatMemory {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, address: usize) -> Option<u8> {
        self.bytes.get(address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rom {
        memory: FlatMemory,
    }

    impl Plugin for Rom {}

    impl MemoryReporting for Rom {
        fn addressable_memory(&self) -> &dyn AddressableMemory {
            &self.memory
        }
    }

    #[test]
    fn test_memory_plugin_upcast() {
        let rom: Box<dyn MemoryPlugin> = Box::new(Rom {
            memory: FlatMemory::new(vec![0xC3, 0x50]),
        });
        let memory = rom.addressable_memory();
        assert_eq!(memory.size(), 2);
        assert_eq!(memory.read(0), Some(0xC3));
        assert_eq!(memory.read(2), None);
    }

    #[test]
    fn test_boxed_plugin_downcasts() {
        let boxed: Box<dyn Plugin> = Box::new(Rom {
            memory: FlatMemory::zeroed(16),
        });
        assert!((*boxed).as_any().is::<Rom>());
        let rom = boxed.into_any().downcast::<Rom>().unwrap();
        assert_eq!(rom.memory.size(), 16);
    }
}
