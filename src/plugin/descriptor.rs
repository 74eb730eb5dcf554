//! Plugin descriptor parsing and validation.
//!
//! A descriptor declares what a plugin delivers: files checked against a
//! contract, config keys, library requirements and the plugins it depends on.
//! It is read from `plugin.toml` in the plugin's directory or built in code.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{PluginError, PluginResult};
use crate::config::FilePaths;

/// Plugin descriptor file name.
pub const DESCRIPTOR_FILE: &str = "plugin.toml";

/// A file delivered by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeclaration {
    /// Path relative to the plugin's `files` directory.
    pub path: String,
    /// Contract the file must satisfy.
    pub contract: String,
}

/// Everything a plugin declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Plugin name (unique identifier).
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Files to validate and install, in order.
    #[serde(default)]
    pub files: Vec<FileDeclaration>,
    /// Keys merged into the shared config file.
    #[serde(default)]
    pub config: serde_yaml::Mapping,
    /// Library requirements, in order.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Plugins that must be installed first.
    #[serde(default, rename = "plugins")]
    pub dependencies: Vec<String>,
    /// Directory the plugin package lives in.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

impl PluginDescriptor {
    /// Create an empty descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            files: Vec::new(),
            config: serde_yaml::Mapping::new(),
            libraries: Vec::new(),
            dependencies: Vec::new(),
            source_dir: None,
        }
    }

    /// Declare a file.
    pub fn with_file(mut self, path: impl Into<String>, contract: impl Into<String>) -> Self {
        self.files.push(FileDeclaration { path: path.into(), contract: contract.into() });
        self
    }

    /// Declare a config key.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.config.insert(serde_yaml::Value::String(key.into()), value.into());
        self
    }

    /// Declare a library requirement.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.libraries.push(library.into());
        self
    }

    /// Declare a plugin dependency.
    pub fn with_dependency(mut self, plugin: impl Into<String>) -> Self {
        self.dependencies.push(plugin.into());
        self
    }

    /// Set the directory the plugin package lives in.
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// Parse a descriptor from TOML.
    pub fn from_toml(content: &str) -> PluginResult<Self> {
        let descriptor: Self =
            toml::from_str(content).map_err(|e| PluginError::InvalidDescriptor(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Parse a descriptor file. Its directory becomes the source directory.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Err(PluginError::InvalidDescriptor(format!(
                "{} not found",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut descriptor = Self::from_toml(&content)?;
        descriptor.source_dir = path.parent().map(Path::to_path_buf);

        Ok(descriptor)
    }

    /// Load `plugin.toml` from a plugin directory.
    pub fn from_plugin_dir(dir: &Path) -> PluginResult<Self> {
        Self::from_file(&dir.join(DESCRIPTOR_FILE))
    }

    /// Validate the descriptor.
    pub fn validate(&self) -> PluginResult<()> {
        if self.name.is_empty() {
            return Err(PluginError::InvalidDescriptor("Plugin name is required".to_string()));
        }

        if !self.name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(PluginError::InvalidDescriptor(
                "Plugin name must contain only alphanumeric characters, hyphens, and underscores"
                    .to_string(),
            ));
        }

        if self.version.is_empty() {
            return Err(PluginError::InvalidDescriptor("Plugin version is required".to_string()));
        }

        for file in &self.files {
            let path = Path::new(&file.path);
            if file.path.is_empty()
                || path.is_absolute()
                || path.components().any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(PluginError::InvalidDescriptor(format!(
                    "File path '{}' must be relative to the plugin's files directory",
                    file.path
                )));
            }
            if file.contract.is_empty() {
                return Err(PluginError::InvalidDescriptor(format!(
                    "File '{}' does not name a contract",
                    file.path
                )));
            }
        }

        Ok(())
    }

    /// Where a declared file is read from before installation.
    ///
    /// Without a source directory the plugin is assumed to already live in
    /// the plugins root, so source and installed location coincide.
    pub fn source_file(&self, file: &FileDeclaration, paths: &FilePaths) -> PathBuf {
        self.source_dir
            .clone()
            .unwrap_or_else(|| paths.plugin_dir(&self.name))
            .join("files")
            .join(&file.path)
    }

    /// Config keys as strings, in declaration order.
    pub fn config_keys(&self) -> Vec<String> {
        self.config.keys().map(yaml_key).collect()
    }
}

/// Render a YAML mapping key as a string.
pub(crate) fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// A plugin the lifecycle can install.
///
/// Plugins built purely from data use [`PluginDescriptor`] directly; types
/// that need install hooks implement this trait.
pub trait Plugin {
    /// What the plugin declares.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Called after a successful install.
    fn on_install(&self) {}

    /// Called at the end of an uninstall or rollback.
    fn on_uninstall(&self) {}
}

impl Plugin for PluginDescriptor {
    fn descriptor(&self) -> &PluginDescriptor {
        self
    }
}
