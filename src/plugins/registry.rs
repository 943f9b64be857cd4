//! Name to definition registry
//!
//! The registry scans its root directory the first time a name is resolved
//! and keeps the resulting map for the rest of its life. Later changes on
//! disk are not picked up.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::definition::PluginDefinition;
use super::native::{DefinitionExtractor, NativeExtractor};
use super::scanner::{DirectoryScanner, ModuleScanner};
use crate::error::{PluginError, Result};

type DefinitionMap = HashMap<String, Arc<PluginDefinition>>;

pub struct PluginRegistry {
    root: PathBuf,
    scanner: Box<dyn ModuleScanner>,
    extractor: Box<dyn DefinitionExtractor>,
    definitions: OnceCell<DefinitionMap>,
}

impl PluginRegistry {
    /// Registry over native modules below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_sources(root, DirectoryScanner::new(), NativeExtractor)
    }

    /// Registry with a custom discovery and inspection step
    pub fn with_sources(
        root: impl Into<PathBuf>,
        scanner: impl ModuleScanner + 'static,
        extractor: impl DefinitionExtractor + 'static,
    ) -> Self {
        Self {
            root: root.into(),
            scanner: Box::new(scanner),
            extractor: Box::new(extractor),
            definitions: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a definition by logical or qualified name.
    ///
    /// # Errors
    /// - `PluginError::NotFound` if nothing is registered under `name`
    /// - `PluginError::Scan` / `PluginError::ModuleLoad` if this call had to
    ///   build the registry and the build failed
    pub fn resolve(&self, name: &str) -> Result<Arc<PluginDefinition>> {
        self.definitions()?
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Every registered lookup key with its definition, sorted by key
    ///
    /// # Errors
    /// Same build errors as [`PluginRegistry::resolve`].
    pub fn entries(&self) -> Result<Vec<(&str, &Arc<PluginDefinition>)>> {
        let mut entries: Vec<_> = self
            .definitions()?
            .iter()
            .map(|(key, definition)| (key.as_str(), definition))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(entries)
    }

    /// Build the registry now instead of on the first lookup.
    ///
    /// # Errors
    /// Same build errors as [`PluginRegistry::resolve`].
    pub fn ensure_built(&self) -> Result<()> {
        self.definitions().map(|_| ())
    }

    /// Whether the registry has been built
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.definitions.get().is_some()
    }

    // Concurrent first callers block on one build; a failed build caches
    // nothing.
    fn definitions(&self) -> Result<&DefinitionMap> {
        self.definitions.get_or_try_init(|| self.build())
    }

    fn build(&self) -> Result<DefinitionMap> {
        let modules = self.scanner.scan(&self.root)?;
        let mut definitions = DefinitionMap::new();

        for module in &modules {
            for (key, definition) in self.extractor.extract(module)? {
                if let Some(previous) = definitions.insert(key.clone(), Arc::clone(&definition)) {
                    if !Arc::ptr_eq(&previous, &definition) {
                        warn!(
                            plugin = %key,
                            module = %module.display(),
                            previous = ?previous.module_path(),
                            "Plugin name registered by more than one module, last scanned wins"
                        );
                    }
                }
            }
        }

        info!(
            root = %self.root.display(),
            modules = modules.len(),
            names = definitions.len(),
            "Built plugin registry"
        );
        Ok(definitions)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("root", &self.root)
            .field("built", &self.is_built())
            .finish_non_exhaustive()
    }
}
