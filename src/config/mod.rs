use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub mod document;
pub mod merge;

pub use document::{is_active, PluginsDocument, ACTIVE_KEY, PLUGINS_KEY, SHARED_KEY};
pub use merge::{merge, merge_into};

/// Generic, untyped configuration tree handed to plugins.
///
/// Keys keep document order so batch activation order follows the file.
pub type ConfigTree = Map<String, Value>;

/// Host-side settings for the extension loader.
///
/// Everything that is not a loader setting (`plugins`, `sharedPluginsConfig`,
/// ...) is kept verbatim in `document` and validated only when a batch is
/// loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Root directory scanned for extension modules
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// Values written into every active plugin's config before activation
    #[serde(default)]
    pub overrides: ConfigTree,

    #[serde(flatten)]
    pub document: ConfigTree,
}

fn default_plugins_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".kiln").join("plugins"))
        .unwrap_or_else(|| PathBuf::from("plugins"))
}

impl Default for HostConfig {
    fn default() -> Self {
        let mut document = ConfigTree::new();
        document.insert(PLUGINS_KEY.to_string(), Value::Object(ConfigTree::new()));
        document.insert(SHARED_KEY.to_string(), Value::Object(ConfigTree::new()));

        Self {
            plugins_dir: default_plugins_dir(),
            overrides: ConfigTree::new(),
            document,
        }
    }
}

impl HostConfig {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Failed to parse config file")
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".kiln").join("plugins.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_default_document_is_well_formed() {
        let config = HostConfig::default();
        let doc = PluginsDocument::parse(&config.document).unwrap();
        assert_eq!(doc.active().count(), 0);
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
plugins_dir: /opt/emu/plugins
overrides:
  trace: true
plugins:
  cpu-trace:
    active: true
    depth: 4
  screen-grab: {}
sharedPluginsConfig:
  output_dir: /tmp/emu
"#;
        let config = HostConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.plugins_dir, PathBuf::from("/opt/emu/plugins"));
        assert_eq!(config.overrides.get("trace"), Some(&json!(true)));

        let plugins = config.document.get(PLUGINS_KEY).unwrap();
        assert_eq!(plugins["cpu-trace"]["depth"], json!(4));
        // Document order survives parsing
        let names: Vec<_> = plugins.as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["cpu-trace", "screen-grab"]);
        assert!(!config.document.contains_key("plugins_dir"));
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("plugins.yaml");
        std::fs::write(
            &config_path,
            "plugins:\n  a: {}\nsharedPluginsConfig:\n  x: 1\n",
        )
        .unwrap();

        let config = HostConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.document[SHARED_KEY]["x"], json!(1));
    }

    #[test]
    fn test_config_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(HostConfig::load_from_file(dir.path().join("absent.yaml")).is_err());
    }
}
