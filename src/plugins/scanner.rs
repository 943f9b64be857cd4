//! Extension module discovery

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PluginError, Result};

/// Enumerates module files below a root directory.
pub trait ModuleScanner: Send + Sync {
    /// # Errors
    /// Returns `PluginError::Scan` if the root does not exist or a directory
    /// cannot be read.
    fn scan(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Finds native libraries directly in the root and directly inside each
/// immediate subdirectory. Deeper levels are ignored.
///
/// Order is deterministic: root files by name, then each subdirectory by
/// name with its files by name.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    extension: String,
}

impl DirectoryScanner {
    /// Scanner for the platform's dynamic library extension
    #[must_use]
    pub fn new() -> Self {
        Self::with_extension(std::env::consts::DLL_EXTENSION)
    }

    #[must_use]
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    fn is_module(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleScanner for DirectoryScanner {
    fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let entries = sorted_entries(root)?;

        let mut modules: Vec<PathBuf> = entries
            .iter()
            .filter(|path| self.is_module(path))
            .cloned()
            .collect();

        for subdir in entries.iter().filter(|path| path.is_dir()) {
            modules.extend(
                sorted_entries(subdir)?
                    .into_iter()
                    .filter(|path| self.is_module(path)),
            );
        }

        debug!(root = %root.display(), modules = modules.len(), "Scanned for extension modules");
        Ok(modules)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let scan_error = |source| PluginError::Scan {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir)
        .map_err(scan_error)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(scan_error)?;
    entries.sort();
    Ok(entries)
}
