//! Runtime configuration for Graft.
//!
//! Handles loading and saving the `graft.yml` file that controls which
//! artifact categories may be installed and where they are written.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::plugin::{PluginError, PluginResult};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "graft.yml";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Contract definition files or directories to load at startup
    pub modules: Vec<PathBuf>,

    /// Where plugin artifacts are read from and written to
    pub file_paths: FilePaths,

    /// Which artifact categories may be installed
    pub allow: AllowConfig,

    /// Nest each plugin's config keys under its own name
    pub sandbox_configuration_keys: bool,
}

/// Artifact locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePaths {
    /// Root of installed plugins (`<plugins>/<Name>/files/...`)
    pub plugins: PathBuf,

    /// Manifest of installed plugins (JSON)
    pub manifest: PathBuf,

    /// Shared plugin configuration file (YAML)
    pub config: PathBuf,

    /// Shared library requirement file
    pub libraries: PathBuf,
}

/// Per-category allow flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowConfig {
    pub files: bool,
    pub config: bool,
    pub libraries: bool,
    pub callbacks: bool,
}

impl RuntimeConfig {
    /// Load configuration from a file, falling back to defaults if it does not exist.
    pub fn load_from_file(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            tracing::debug!(path = ?path, "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| PluginError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> PluginResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            serde_yaml::to_string(self).map_err(|e| PluginError::Config(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Write the default configuration to `path`.
    pub fn generate(path: &Path) -> PluginResult<Self> {
        let config = Self::default();
        config.save(path)?;
        tracing::info!(path = ?path, "Generated configuration file");
        Ok(config)
    }

    /// Default configuration with every artifact path placed under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self { file_paths: FilePaths::rooted_at(root), ..Self::default() }
    }
}

impl FilePaths {
    /// Default paths joined onto `root`.
    pub fn rooted_at(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            plugins: root.join(defaults.plugins),
            manifest: root.join(defaults.manifest),
            config: root.join(defaults.config),
            libraries: root.join(defaults.libraries),
        }
    }

    /// Installed location of a plugin file.
    pub fn installed_file(&self, plugin: &str, relative: &str) -> PathBuf {
        self.plugin_dir(plugin).join("files").join(relative)
    }

    /// Directory of an installed plugin.
    pub fn plugin_dir(&self, plugin: &str) -> PathBuf {
        self.plugins.join(plugin)
    }
}

impl AllowConfig {
    /// Every category allowed.
    pub fn all() -> Self {
        Self { files: true, config: true, libraries: true, callbacks: true }
    }

    /// Every category disabled. Only the manifest is still written.
    pub fn none() -> Self {
        Self { files: false, config: false, libraries: false, callbacks: false }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            file_paths: FilePaths::default(),
            allow: AllowConfig::default(),
            sandbox_configuration_keys: true,
        }
    }
}

impl Default for FilePaths {
    fn default() -> Self {
        Self {
            plugins: PathBuf::from("plugins"),
            manifest: PathBuf::from("graft.manifest.json"),
            config: PathBuf::from("config/config.plugins.yml"),
            libraries: PathBuf::from("requirements.plugins.txt"),
        }
    }
}

impl Default for AllowConfig {
    fn default() -> Self {
        Self::all()
    }
}
