//! Plugin install and uninstall orchestration.
//!
//! Installing runs the artifact categories in a fixed order: files, config,
//! libraries, manifest, then the plugin's own hook. Uninstalling runs them in
//! reverse. A file that fails validation rolls back everything the failing
//! call installed. Other failures leave earlier phases in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    ConfigMerger, FileDeclaration, ManifestStore, Plugin, PluginDescriptor, PluginError,
    PluginResult, RequirementBlocks,
};
use crate::config::RuntimeConfig;
use crate::contract::{self, ContractRegistry};

/// Where a plugin is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Not recorded in the manifest.
    Uninstalled,
    /// Install in progress.
    Installing,
    /// Recorded in the manifest.
    Installed,
    /// Uninstall in progress.
    Uninstalling,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Uninstalling => "uninstalling",
        };
        f.write_str(name)
    }
}

fn transition(plugin: &str, from: PluginState, to: PluginState) {
    tracing::debug!(plugin = plugin, from = %from, to = %to, "Plugin state changed");
}

/// Installs and uninstalls plugins against a runtime configuration.
#[derive(Debug, Clone)]
pub struct PluginLifecycle {
    config: RuntimeConfig,
    contracts: Arc<ContractRegistry>,
}

impl PluginLifecycle {
    /// Create an orchestrator with an already populated contract registry.
    pub fn new(config: RuntimeConfig, contracts: Arc<ContractRegistry>) -> Self {
        Self { config, contracts }
    }

    /// Create an orchestrator, loading contracts from the configured modules
    /// and creating an empty manifest if there is none yet.
    pub fn from_config(config: RuntimeConfig) -> PluginResult<Self> {
        let contracts = ContractRegistry::from_modules(config.modules.as_slice())?;
        tracing::debug!(contracts = contracts.len(), "Loaded contract registry");
        ManifestStore::open(&config.file_paths.manifest)?;
        Ok(Self::new(config, Arc::new(contracts)))
    }

    /// Current configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Mutable configuration. Changes apply from the next call.
    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    /// Contract registry used for validation and file hooks.
    pub fn contracts(&self) -> &Arc<ContractRegistry> {
        &self.contracts
    }

    /// Manifest of the current configuration.
    pub fn manifest(&self) -> ManifestStore {
        ManifestStore::new(&self.config.file_paths.manifest)
    }

    /// Load the descriptor of a plugin living in the plugins root.
    pub fn load_plugin(&self, name: &str) -> PluginResult<PluginDescriptor> {
        PluginDescriptor::from_plugin_dir(&self.config.file_paths.plugin_dir(name))
    }

    /// Load a plugin's descriptor by name, from the package directory the
    /// manifest records for it, else from the plugins root.
    pub fn find_plugin(&self, name: &str) -> PluginResult<PluginDescriptor> {
        match self.manifest().entry(name)?.and_then(|entry| entry.source) {
            Some(source) => PluginDescriptor::from_plugin_dir(&source),
            None => self.load_plugin(name),
        }
    }

    /// Lifecycle state of a plugin, as recorded in the manifest.
    pub fn state(&self, name: &str) -> PluginResult<PluginState> {
        Ok(if self.manifest().contains_plugin(name)? {
            PluginState::Installed
        } else {
            PluginState::Uninstalled
        })
    }

    /// Install a plugin with the current configuration.
    pub fn install<P: Plugin + ?Sized>(&self, plugin: &P) -> PluginResult<()> {
        self.install_with(plugin, &self.config)
    }

    /// Install a plugin with an overriding configuration.
    pub fn install_with<P: Plugin + ?Sized>(
        &self,
        plugin: &P,
        config: &RuntimeConfig,
    ) -> PluginResult<()> {
        let descriptor = plugin.descriptor();
        descriptor.validate()?;

        let paths = &config.file_paths;
        let manifest = ManifestStore::new(&paths.manifest);

        for dependency in &descriptor.dependencies {
            if !manifest.contains_plugin(dependency)? {
                return Err(PluginError::UnmetDependency {
                    plugin: descriptor.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        transition(&descriptor.name, PluginState::Uninstalled, PluginState::Installing);

        if config.allow.files {
            self.install_files(plugin, config)?;
        }

        if config.allow.config {
            ConfigMerger::new(&paths.config, config.sandbox_configuration_keys)
                .install(descriptor)?;
        }

        if config.allow.libraries {
            RequirementBlocks::new(&paths.libraries).install(descriptor)?;
        }

        manifest.add_plugin(descriptor, paths)?;

        if config.allow.callbacks {
            plugin.on_install();
        }

        transition(&descriptor.name, PluginState::Installing, PluginState::Installed);
        tracing::info!(plugin = descriptor.name, version = descriptor.version, "Installed plugin");

        Ok(())
    }

    /// Uninstall a plugin with the current configuration.
    pub fn uninstall<P: Plugin + ?Sized>(&self, plugin: &P) -> PluginResult<()> {
        self.uninstall_with(plugin, &self.config)
    }

    /// Uninstall a plugin with an overriding configuration.
    pub fn uninstall_with<P: Plugin + ?Sized>(
        &self,
        plugin: &P,
        config: &RuntimeConfig,
    ) -> PluginResult<()> {
        let descriptor = plugin.descriptor();
        let manifest = ManifestStore::new(&config.file_paths.manifest);
        let from = if manifest.contains_plugin(&descriptor.name)? {
            PluginState::Installed
        } else {
            PluginState::Uninstalled
        };

        transition(&descriptor.name, from, PluginState::Uninstalling);
        self.teardown(plugin, config, &descriptor.files)?;
        transition(&descriptor.name, PluginState::Uninstalling, PluginState::Uninstalled);
        tracing::info!(plugin = descriptor.name, "Uninstalled plugin");

        Ok(())
    }

    fn install_files<P: Plugin + ?Sized>(
        &self,
        plugin: &P,
        config: &RuntimeConfig,
    ) -> PluginResult<()> {
        let descriptor = plugin.descriptor();
        let paths = &config.file_paths;

        if !paths.plugins.is_dir() {
            return Err(PluginError::MissingTarget {
                plugin: descriptor.name.clone(),
                artifact: "files",
                path: paths.plugins.clone(),
            });
        }

        for (index, file) in descriptor.files.iter().enumerate() {
            let source = descriptor.source_file(file, paths);
            let result = contract::validate(&self.contracts, &source, &file.contract);

            if !result.is_valid() {
                tracing::warn!(
                    plugin = descriptor.name,
                    file = file.path,
                    contract = file.contract,
                    "File failed validation, rolling back"
                );
                self.rollback(plugin, config, &descriptor.files[..index]);

                return Err(PluginError::Validation {
                    plugin: descriptor.name.clone(),
                    file: file.path.clone(),
                    messages: result.messages,
                });
            }

            let destination = paths.installed_file(&descriptor.name, &file.path);
            if !same_file(&source, &destination) {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&source, &destination)?;
                tracing::debug!(source = ?source, destination = ?destination, "Copied plugin file");
            }

            if config.allow.callbacks {
                if let Some(hooks) = self.contracts.hooks(&file.contract) {
                    hooks.on_file_install(&file.path, &file.contract);
                }
            }
        }

        Ok(())
    }

    fn rollback<P: Plugin + ?Sized>(
        &self,
        plugin: &P,
        config: &RuntimeConfig,
        installed: &[FileDeclaration],
    ) {
        let name = &plugin.descriptor().name;

        if let Err(e) = self.teardown(plugin, config, installed) {
            tracing::warn!(plugin = name, error = %e, "Rollback did not complete");
        }

        transition(name, PluginState::Installing, PluginState::Uninstalled);
    }

    /// Undo each category in reverse install order.
    fn teardown<P: Plugin + ?Sized>(
        &self,
        plugin: &P,
        config: &RuntimeConfig,
        files: &[FileDeclaration],
    ) -> PluginResult<()> {
        let descriptor = plugin.descriptor();
        let paths = &config.file_paths;

        if config.allow.files {
            for file in files {
                let source = descriptor.source_file(file, paths);
                let installed = paths.installed_file(&descriptor.name, &file.path);

                if installed.is_file() && !same_file(&source, &installed) {
                    std::fs::remove_file(&installed)?;
                    tracing::debug!(path = ?installed, "Removed plugin file");
                }

                if config.allow.callbacks {
                    if let Some(hooks) = self.contracts.hooks(&file.contract) {
                        hooks.on_file_uninstall(&file.path, &file.contract);
                    }
                }
            }
        }

        if config.allow.config {
            ConfigMerger::new(&paths.config, config.sandbox_configuration_keys)
                .uninstall(descriptor)?;
        }

        if config.allow.libraries {
            RequirementBlocks::new(&paths.libraries).uninstall(descriptor)?;
        }

        ManifestStore::new(&paths.manifest).remove_plugin(&descriptor.name)?;

        if config.allow.callbacks {
            plugin.on_uninstall();
        }

        Ok(())
    }
}

/// Whether two paths name the same file. Paths that do not exist yet are
/// compared as written.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }

    let canonical = |p: &Path| -> Option<PathBuf> { p.canonicalize().ok() };
    matches!((canonical(a), canonical(b)), (Some(x), Some(y)) if x == y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowConfig;
    use crate::contract::Contract;
    use tempfile::TempDir;

    const CIRCLE: &str = "pub struct Circle;\n\nimpl Shape for Circle {\n    fn area(&self) -> f64 { 3.14 }\n    fn draw(&self) {}\n}\n";
    const BROKEN: &str = "pub struct Blob;\n\nimpl Shape for Blob {\n    fn draw(&self) {}\n    fn rofl(&self) {}\n}\n";

    struct Fixture {
        root: TempDir,
        lifecycle: PluginLifecycle,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let config = RuntimeConfig::rooted_at(root.path());
            std::fs::create_dir_all(&config.file_paths.plugins).unwrap();
            std::fs::create_dir_all(config.file_paths.config.parent().unwrap()).unwrap();

            let mut contracts = ContractRegistry::new();
            contracts.register(
                Contract::builder("Shape")
                    .required(["area", "draw"])
                    .optional(["shape_is_a_polygon"])
                    .forbidden(["rofl"])
                    .build()
                    .unwrap(),
            );

            Self { root, lifecycle: PluginLifecycle::new(config, Arc::new(contracts)) }
        }

        /// Write a plugin package outside the plugins root.
        fn package(&self, name: &str, files: &[(&str, &str)]) -> PluginDescriptor {
            let dir = self.root.path().join("packages").join(name);
            let mut descriptor = PluginDescriptor::new(name, "0.1.0").with_source_dir(&dir);

            for (path, content) in files {
                let source = dir.join("files").join(path);
                std::fs::create_dir_all(source.parent().unwrap()).unwrap();
                std::fs::write(&source, content).unwrap();
                descriptor = descriptor.with_file(*path, "Shape");
            }

            descriptor
        }

        fn paths(&self) -> &crate::config::FilePaths {
            &self.lifecycle.config().file_paths
        }
    }

    #[test]
    fn test_install_and_uninstall() {
        let fixture = Fixture::new();
        let plugin = fixture
            .package("CirclePlugin", &[("circle.rs", CIRCLE)])
            .with_config("count", 12345)
            .with_library("invoke");

        fixture.lifecycle.install(&plugin).unwrap();

        let installed = fixture.paths().installed_file("CirclePlugin", "circle.rs");
        assert_eq!(std::fs::read_to_string(&installed).unwrap(), CIRCLE);
        assert_eq!(fixture.lifecycle.state("CirclePlugin").unwrap(), PluginState::Installed);
        assert!(std::fs::read_to_string(&fixture.paths().config).unwrap().contains("CirclePlugin"));
        assert!(std::fs::read_to_string(&fixture.paths().libraries).unwrap().contains("invoke"));

        fixture.lifecycle.uninstall(&plugin).unwrap();

        assert!(!installed.exists());
        assert_eq!(fixture.lifecycle.state("CirclePlugin").unwrap(), PluginState::Uninstalled);
        assert!(!std::fs::read_to_string(&fixture.paths().libraries).unwrap().contains("invoke"));
    }

    #[test]
    fn test_unmet_dependency_has_no_side_effects() {
        let fixture = Fixture::new();
        let plugin = fixture.package("Second", &[("circle.rs", CIRCLE)]).with_dependency("First");

        let result = fixture.lifecycle.install(&plugin);

        assert!(matches!(result, Err(PluginError::UnmetDependency { ref dependency, .. }) if dependency == "First"));
        assert!(!fixture.paths().manifest.exists());
        assert!(!fixture.paths().installed_file("Second", "circle.rs").exists());
    }

    #[test]
    fn test_dependency_satisfied_after_install() {
        let fixture = Fixture::new();
        let first = fixture.package("First", &[]);
        let second = fixture.package("Second", &[]).with_dependency("First");

        fixture.lifecycle.install(&first).unwrap();
        fixture.lifecycle.install(&second).unwrap();

        assert_eq!(fixture.lifecycle.state("Second").unwrap(), PluginState::Installed);
    }

    #[test]
    fn test_validation_failure_rolls_back() {
        let fixture = Fixture::new();
        let plugin = fixture
            .package("Mixed", &[("circle.rs", CIRCLE), ("blob.rs", BROKEN)])
            .with_library("invoke");

        let err = fixture.lifecycle.install(&plugin).unwrap_err();

        match &err {
            PluginError::Validation { file, messages, .. } => {
                assert_eq!(file, "blob.rs");
                assert!(messages.iter().any(|m| m.contains("area")));
                assert!(messages.iter().any(|m| m.contains("rofl")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!fixture.paths().installed_file("Mixed", "circle.rs").exists());
        assert!(!fixture.paths().libraries.exists());
        assert_eq!(fixture.lifecycle.state("Mixed").unwrap(), PluginState::Uninstalled);
    }

    #[test]
    fn test_unknown_contract_fails_validation() {
        let fixture = Fixture::new();
        let dir = fixture.root.path().join("packages").join("Odd");
        std::fs::create_dir_all(dir.join("files")).unwrap();
        std::fs::write(dir.join("files").join("odd.rs"), CIRCLE).unwrap();
        let plugin = PluginDescriptor::new("Odd", "0.1.0")
            .with_source_dir(&dir)
            .with_file("odd.rs", "Nope");

        let err = fixture.lifecycle.install(&plugin).unwrap_err();
        assert!(err.messages().iter().any(|m| m.contains("unknown contract 'Nope'")));
    }

    #[test]
    fn test_missing_plugins_root() {
        let fixture = Fixture::new();
        let plugin = fixture.package("CirclePlugin", &[("circle.rs", CIRCLE)]);
        std::fs::remove_dir_all(&fixture.paths().plugins).unwrap();

        assert!(matches!(
            fixture.lifecycle.install(&plugin),
            Err(PluginError::MissingTarget { artifact: "files", .. })
        ));
    }

    #[test]
    fn test_nothing_allowed_still_records_manifest() {
        let mut fixture = Fixture::new();
        fixture.lifecycle.config_mut().allow = AllowConfig::none();
        let plugin = fixture
            .package("CirclePlugin", &[("circle.rs", CIRCLE)])
            .with_config("count", 1)
            .with_library("invoke");

        fixture.lifecycle.install(&plugin).unwrap();

        assert_eq!(fixture.lifecycle.state("CirclePlugin").unwrap(), PluginState::Installed);
        assert!(!fixture.paths().installed_file("CirclePlugin", "circle.rs").exists());
        assert!(!fixture.paths().config.exists());
        assert!(!fixture.paths().libraries.exists());
    }

    #[test]
    fn test_plugin_in_place_is_not_copied_or_deleted() {
        let fixture = Fixture::new();
        let installed = fixture.paths().installed_file("InPlace", "circle.rs");
        std::fs::create_dir_all(installed.parent().unwrap()).unwrap();
        std::fs::write(&installed, CIRCLE).unwrap();
        let plugin = PluginDescriptor::new("InPlace", "0.1.0").with_file("circle.rs", "Shape");

        fixture.lifecycle.install(&plugin).unwrap();
        fixture.lifecycle.uninstall(&plugin).unwrap();

        assert!(installed.is_file());
    }

    #[test]
    fn test_install_with_override() {
        let fixture = Fixture::new();
        let plugin = fixture.package("CirclePlugin", &[]).with_library("invoke");

        let mut config = fixture.lifecycle.config().clone();
        config.allow.libraries = false;
        fixture.lifecycle.install_with(&plugin, &config).unwrap();

        assert!(!fixture.paths().libraries.exists());
        assert!(fixture.lifecycle.config().allow.libraries);
    }

    #[test]
    fn test_uninstall_with_missing_target_directories() {
        let fixture = Fixture::new();
        let plugin = fixture
            .package("CirclePlugin", &[("circle.rs", CIRCLE)])
            .with_config("count", 1)
            .with_library("invoke");

        let mut config = fixture.lifecycle.config().clone();
        config.allow.config = false;
        config.file_paths.libraries = fixture.root.path().join("absent").join("requirements.txt");
        config.allow.libraries = false;
        fixture.lifecycle.install_with(&plugin, &config).unwrap();
        std::fs::remove_dir_all(fixture.paths().config.parent().unwrap()).unwrap();

        config.allow = AllowConfig::all();
        fixture.lifecycle.uninstall_with(&plugin, &config).unwrap();

        assert_eq!(fixture.lifecycle.state("CirclePlugin").unwrap(), PluginState::Uninstalled);
        assert!(!fixture.paths().installed_file("CirclePlugin", "circle.rs").exists());
    }

    #[test]
    fn test_uninstall_twice() {
        let fixture = Fixture::new();
        let plugin = fixture.package("CirclePlugin", &[("circle.rs", CIRCLE)]).with_library("invoke");

        fixture.lifecycle.install(&plugin).unwrap();
        fixture.lifecycle.uninstall(&plugin).unwrap();
        fixture.lifecycle.uninstall(&plugin).unwrap();

        assert_eq!(fixture.lifecycle.state("CirclePlugin").unwrap(), PluginState::Uninstalled);
    }

    #[test]
    fn test_find_plugin_uses_recorded_package() {
        let fixture = Fixture::new();
        let dir = fixture.root.path().join("packages").join("Outside");
        std::fs::create_dir_all(dir.join("files")).unwrap();
        std::fs::write(dir.join("files").join("circle.rs"), CIRCLE).unwrap();
        std::fs::write(
            dir.join(crate::plugin::DESCRIPTOR_FILE),
            "name = \"Outside\"\nversion = \"1.0.0\"\n\n[[files]]\npath = \"circle.rs\"\ncontract = \"Shape\"\n",
        )
        .unwrap();

        assert!(fixture.lifecycle.find_plugin("Outside").is_err());

        fixture.lifecycle.install(&PluginDescriptor::from_plugin_dir(&dir).unwrap()).unwrap();
        let found = fixture.lifecycle.find_plugin("Outside").unwrap();
        assert_eq!(found.source_dir.as_deref(), Some(dir.as_path()));

        fixture.lifecycle.uninstall(&found).unwrap();
        assert!(!fixture.paths().installed_file("Outside", "circle.rs").exists());
    }

    #[test]
    fn test_from_config_creates_manifest() {
        let root = TempDir::new().unwrap();
        let config = RuntimeConfig::rooted_at(root.path());

        let lifecycle = PluginLifecycle::from_config(config).unwrap();

        assert!(lifecycle.config().file_paths.manifest.is_file());
        assert!(lifecycle.manifest().list_plugins().unwrap().is_empty());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PluginState::Installing.to_string(), "installing");
        assert_eq!(PluginState::Uninstalled.to_string(), "uninstalled");
    }
}
