//! Loading real extension modules
//!
//! The demo modules under `demos/plugins` are built once per test run with
//! the same toolchain as the host, then copied into scratch plugin
//! directories.

#[cfg(test)]
mod native_module_tests {
    use kiln::config::ConfigTree;
    use kiln::context::ExecutionContext;
    use kiln::error::PluginError;
    use kiln::plugins::{Capabilities, PluginsLoader, MEMORY_INTERFACE};
    use once_cell::sync::Lazy;
    use serde_json::json;
    use std::cell::RefCell;
    use std::env::consts::{DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX};
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tempfile::{tempdir, TempDir};

    /// Output directory of the demo plugins workspace
    static DEMO_MODULES: Lazy<PathBuf> = Lazy::new(|| {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/plugins/Cargo.toml");
        let target = Path::new(env!("CARGO_TARGET_TMPDIR")).join("demo-plugins");

        let status = Command::new(env!("CARGO"))
            .arg("build")
            .arg("--quiet")
            .arg("--manifest-path")
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&target)
            .status()
            .expect("failed to run cargo for the demo plugins");
        assert!(status.success(), "building the demo plugins failed");

        target.join("debug")
    });

    /// Scratch plugins directory holding `crate_name` under `subdir`
    fn plugins_dir_with(crate_name: &str, subdir: &str) -> (TempDir, PathBuf) {
        let built = DEMO_MODULES.join(format!("{DLL_PREFIX}{crate_name}{DLL_SUFFIX}"));
        let dir = tempdir().unwrap();
        let module = dir
            .path()
            .join(subdir)
            .join(format!("{crate_name}.{DLL_EXTENSION}"));
        std::fs::create_dir_all(module.parent().unwrap()).unwrap();
        std::fs::copy(&built, &module).unwrap();
        (dir, module)
    }

    fn tree(value: serde_json::Value) -> ConfigTree {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not a mapping: {other}"),
        }
    }

    #[test]
    fn test_native_module_registers_its_definition() {
        let (dir, module) = plugins_dir_with("kiln_plugin_boot_rom", "roms");
        let loader = PluginsLoader::from_dir(dir.path());

        let definition = loader.registry().resolve("boot-rom").unwrap();
        assert!(definition.qualified_name().ends_with("BootRom"));
        assert_eq!(definition.module_path(), Some(module.as_path()));
        assert_eq!(
            definition.capabilities(),
            Capabilities::CONSTRUCTOR | Capabilities::MEMORY
        );

        let accessor = definition.memory_accessor().unwrap();
        assert!(accessor.returns_host_memory());
        assert_eq!(accessor.interface(), MEMORY_INTERFACE);

        // Reachable under the qualified name too, as the same definition
        let by_type = loader
            .registry()
            .resolve(definition.qualified_name())
            .unwrap();
        assert!(std::sync::Arc::ptr_eq(&definition, &by_type));
    }

    #[test]
    fn test_slot_load_from_native_module() {
        let (dir, _module) = plugins_dir_with("kiln_plugin_boot_rom", "roms");
        let loader = PluginsLoader::from_dir(dir.path());
        let config = tree(json!({ "size": 16 }));

        let slot = loader
            .load_for_slot("boot-rom", &config, &ExecutionContext::default())
            .unwrap();
        assert_eq!(slot.name(), "boot-rom");
        assert_eq!(slot.addressable_memory().size(), 16);

        // The instance keeps the library mapped after the registry is gone
        drop(loader);
        assert_eq!(slot.addressable_memory().read(0), Some(0));
        assert_eq!(slot.addressable_memory().read(16), None);
    }

    #[test]
    fn test_slot_load_reads_rom_image() {
        let (dir, _module) = plugins_dir_with("kiln_plugin_boot_rom", "roms");
        let image = dir.path().join("boot.bin");
        std::fs::write(&image, [0xC3, 0x00, 0x10]).unwrap();
        let loader = PluginsLoader::from_dir(dir.path());
        let config = tree(json!({ "path": image.to_str().unwrap() }));

        let slot = loader
            .load_for_slot("boot-rom", &config, &ExecutionContext::default())
            .unwrap();
        assert_eq!(slot.addressable_memory().size(), 3);
        assert_eq!(slot.addressable_memory().read(0), Some(0xC3));
    }

    #[test]
    fn test_failing_native_constructor_is_invocation_error() {
        let (dir, _module) = plugins_dir_with("kiln_plugin_boot_rom", "roms");
        let loader = PluginsLoader::from_dir(dir.path());
        let missing = dir.path().join("absent.bin");
        let config = tree(json!({ "path": missing.to_str().unwrap() }));

        let err = loader
            .load_for_slot("boot-rom", &config, &ExecutionContext::default())
            .unwrap_err();
        assert!(matches!(err, PluginError::ActivationInvocation { .. }));
    }

    #[test]
    fn test_batch_load_from_native_module() {
        let (dir, _module) = plugins_dir_with("kiln_plugin_boot_rom", "roms");
        let loader = PluginsLoader::from_dir(dir.path());
        let document = tree(json!({
            "plugins": { "boot-rom": { "size": 8 }, "ghost": {} },
            "sharedPluginsConfig": {}
        }));
        let reports = RefCell::new(Vec::new());
        let sink = |_: &str, args: &[&str]| reports.borrow_mut().push(args[0].to_string());

        let plugins = loader
            .load_all(&document, &ConfigTree::new(), &ExecutionContext::default(), &sink)
            .unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "boot-rom");
        assert_eq!(reports.into_inner(), vec!["ghost".to_string()]);
    }

    #[test]
    fn test_stale_abi_module_is_rejected() {
        let (dir, module) = plugins_dir_with("kiln_plugin_stale_abi", "legacy");
        let loader = PluginsLoader::from_dir(dir.path());

        let err = loader
            .load_for_slot("boot-rom", &ConfigTree::new(), &ExecutionContext::default())
            .unwrap_err();
        match err {
            PluginError::ModuleLoad { path, reason } => {
                assert_eq!(path, module);
                assert!(reason.contains("ABI version 0"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
