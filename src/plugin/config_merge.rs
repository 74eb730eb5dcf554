//! Merge plugin config keys into the shared YAML config file.
//!
//! With sandboxing, a plugin's keys live under a sub-mapping named after the
//! plugin. Without it, they are written at the top level and overwrite any
//! existing key of the same name.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use super::{PluginDescriptor, PluginError, PluginResult};

/// Config merger bound to one config file.
#[derive(Debug, Clone, Copy)]
pub struct ConfigMerger<'a> {
    path: &'a Path,
    sandbox: bool,
}

impl<'a> ConfigMerger<'a> {
    /// Create a merger for the config file at `path`.
    pub fn new(path: &'a Path, sandbox: bool) -> Self {
        Self { path, sandbox }
    }

    /// Merge the plugin's config keys into the file.
    pub fn install(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        if descriptor.config.is_empty() {
            return Ok(());
        }

        self.require_parent(descriptor)?;
        let mut document = self.load()?;

        if self.sandbox {
            document.insert(
                Value::String(descriptor.name.clone()),
                Value::Mapping(descriptor.config.clone()),
            );
        } else {
            for (key, value) in &descriptor.config {
                document.insert(key.clone(), value.clone());
            }
        }

        self.save(&document)?;
        tracing::debug!(
            plugin = descriptor.name,
            keys = descriptor.config.len(),
            sandboxed = self.sandbox,
            "Installed config keys"
        );

        Ok(())
    }

    /// Remove the plugin's config keys from the file.
    ///
    /// Without sandboxing, each declared key is removed whatever its current
    /// value, even if something else wrote it. A missing file, or a missing
    /// directory, leaves nothing to remove.
    pub fn uninstall(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        if descriptor.config.is_empty() || !self.path.exists() {
            return Ok(());
        }

        let mut document = self.load()?;

        if self.sandbox {
            document.remove(&Value::String(descriptor.name.clone()));
        } else {
            for key in descriptor.config.keys() {
                document.remove(key);
            }
        }

        self.save(&document)?;
        tracing::debug!(plugin = descriptor.name, sandboxed = self.sandbox, "Removed config keys");

        Ok(())
    }

    fn require_parent(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                Err(PluginError::MissingTarget {
                    plugin: descriptor.name.clone(),
                    artifact: "config",
                    path: parent.to_path_buf(),
                })
            }
            _ => Ok(()),
        }
    }

    fn load(&self) -> PluginResult<Mapping> {
        if !self.path.exists() {
            return Ok(Mapping::new());
        }

        let content = std::fs::read_to_string(self.path)?;
        let value: Value = serde_yaml::from_str(&content).map_err(|e| {
            PluginError::Config(format!("Invalid config file {}: {e}", self.path.display()))
        })?;

        match value {
            Value::Mapping(mapping) => Ok(mapping),
            Value::Null => Ok(Mapping::new()),
            _ => Err(PluginError::Config(format!(
                "Config file {} is not a mapping",
                self.path.display()
            ))),
        }
    }

    fn save(&self, document: &Mapping) -> PluginResult<()> {
        let content =
            serde_yaml::to_string(document).map_err(|e| PluginError::Config(e.to_string()))?;
        std::fs::write(self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_plugin() -> PluginDescriptor {
        PluginDescriptor::new("TestPlugin", "0.1.0").with_config("is_test", true)
    }

    fn read(path: &Path) -> Mapping {
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn key(name: &str) -> Value {
        Value::String(name.to_string())
    }

    #[test]
    fn test_no_config_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("config.yml");
        let merger = ConfigMerger::new(&path, true);

        let plugin = PluginDescriptor::new("Empty", "0.1.0");
        merger.install(&plugin).unwrap();
        merger.uninstall(&plugin).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_directory_fails_install_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("config.plugins.yml");
        let merger = ConfigMerger::new(&path, true);

        assert!(matches!(
            merger.install(&test_plugin()),
            Err(PluginError::MissingTarget { artifact: "config", .. })
        ));
        merger.uninstall(&test_plugin()).unwrap();
        ConfigMerger::new(&path, false).uninstall(&test_plugin()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_unsandboxed_keys_written_as_is() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yml");

        ConfigMerger::new(&path, false).install(&test_plugin()).unwrap();

        let document = read(&path);
        assert_eq!(document.get(&key("is_test")), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_unsandboxed_merge_preserves_existing_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yml");
        std::fs::write(&path, "is_extra: true\nis_test: false\n").unwrap();
        let merger = ConfigMerger::new(&path, false);

        merger.install(&test_plugin()).unwrap();
        let document = read(&path);
        assert_eq!(document.get(&key("is_test")), Some(&Value::Bool(true)));
        assert_eq!(document.get(&key("is_extra")), Some(&Value::Bool(true)));

        merger.uninstall(&test_plugin()).unwrap();
        let document = read(&path);
        assert!(document.get(&key("is_test")).is_none());
        assert_eq!(document.get(&key("is_extra")), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_sandboxed_keys_nested_under_plugin_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yml");
        std::fs::write(&path, "is_extra: true\n").unwrap();
        let merger = ConfigMerger::new(&path, true);

        merger.install(&test_plugin()).unwrap();
        let document = read(&path);
        let sandbox = document.get(&key("TestPlugin")).and_then(Value::as_mapping).unwrap();
        assert_eq!(sandbox.get(&key("is_test")), Some(&Value::Bool(true)));
        assert!(document.get(&key("is_test")).is_none());

        merger.uninstall(&test_plugin()).unwrap();
        let document = read(&path);
        assert!(document.get(&key("TestPlugin")).is_none());
        assert_eq!(document.get(&key("is_extra")), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_sandboxed_install_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yml");
        let merger = ConfigMerger::new(&path, true);

        merger.install(&test_plugin()).unwrap();
        let once = read(&path);
        merger.install(&test_plugin()).unwrap();
        let twice = read(&path);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_uninstall_without_file_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yml");

        ConfigMerger::new(&path, false).uninstall(&test_plugin()).unwrap();
        assert!(!path.exists());
    }
}
