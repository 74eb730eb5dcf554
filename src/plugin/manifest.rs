//! Manifest of installed plugins.
//!
//! The manifest is a JSON file recording, for every installed plugin, the
//! artifacts it declared. Every operation reads the file, applies one change
//! and rewrites it in full. There is no locking: concurrent writers race and
//! the last one wins, so callers must serialize access.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{PluginDescriptor, PluginError, PluginResult};
use crate::config::FilePaths;

/// An installed file and the contract it was installed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    pub path: String,
    pub contract: String,
}

/// Manifest record for one installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Installed files, in declaration order.
    #[serde(default)]
    pub files: Vec<InstalledFile>,
    /// Config keys the plugin declared.
    #[serde(default)]
    pub config: Vec<String>,
    /// Libraries the plugin declared.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Package directory the plugin was installed from, when outside the
    /// plugins root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl ManifestEntry {
    /// Build an entry from a descriptor's declared artifacts.
    pub fn from_descriptor(descriptor: &PluginDescriptor, paths: &FilePaths) -> Self {
        let files = descriptor
            .files
            .iter()
            .map(|file| InstalledFile {
                path: paths.installed_file(&descriptor.name, &file.path).to_string_lossy().into_owned(),
                contract: file.contract.clone(),
            })
            .collect();

        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            files,
            config: descriptor.config_keys(),
            libraries: descriptor.libraries.clone(),
            source: descriptor
                .source_dir
                .clone()
                .filter(|dir| *dir != paths.plugin_dir(&descriptor.name)),
        }
    }
}

/// Manifest file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    plugins: IndexMap<String, ManifestEntry>,
}

/// Persistent registry of installed plugins.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Refer to the manifest at `path` without touching the disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the manifest at `path`, creating an empty one if absent.
    pub fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let store = Self::new(path);

        if !store.path.exists() {
            store.save(&ManifestFile::default())?;
            tracing::debug!(path = ?store.path, "Created manifest");
        }

        Ok(store)
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a plugin's declared artifacts, replacing any earlier entry.
    pub fn add_plugin(&self, descriptor: &PluginDescriptor, paths: &FilePaths) -> PluginResult<()> {
        let mut manifest = self.load()?;
        let entry = ManifestEntry::from_descriptor(descriptor, paths);

        manifest.plugins.insert(entry.name.clone(), entry);
        self.save(&manifest)?;

        tracing::debug!(plugin = descriptor.name, "Added manifest entry");
        Ok(())
    }

    /// Remove a plugin's entry. Absent entries are ignored.
    pub fn remove_plugin(&self, name: &str) -> PluginResult<()> {
        let mut manifest = self.load()?;

        if manifest.plugins.shift_remove(name).is_some() {
            self.save(&manifest)?;
            tracing::debug!(plugin = name, "Removed manifest entry");
        }

        Ok(())
    }

    /// Snapshot of every installed plugin, in install order.
    pub fn list_plugins(&self) -> PluginResult<IndexMap<String, ManifestEntry>> {
        Ok(self.load()?.plugins)
    }

    /// Entry of one installed plugin.
    pub fn entry(&self, name: &str) -> PluginResult<Option<ManifestEntry>> {
        Ok(self.load()?.plugins.shift_remove(name))
    }

    /// Whether a plugin is installed.
    pub fn contains_plugin(&self, name: &str) -> PluginResult<bool> {
        Ok(self.load()?.plugins.contains_key(name))
    }

    /// Installed plugins as `"<name> - <version>"`.
    pub fn installed_plugins(&self) -> PluginResult<Vec<String>> {
        Ok(self
            .load()?
            .plugins
            .values()
            .map(|entry| format!("{} - {}", entry.name, entry.version))
            .collect())
    }

    /// Installed files delivered under `contract`, as `(path, contract)` pairs.
    ///
    /// Ordered by plugin install order, then declaration order within a plugin.
    pub fn files_for_contract(&self, contract: &str) -> PluginResult<Vec<(PathBuf, String)>> {
        Ok(self
            .load()?
            .plugins
            .values()
            .flat_map(|entry| entry.files.iter())
            .filter(|file| file.contract == contract)
            .map(|file| (PathBuf::from(&file.path), file.contract.clone()))
            .collect())
    }

    fn load(&self) -> PluginResult<ManifestFile> {
        if !self.path.exists() {
            return Ok(ManifestFile::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            PluginError::Config(format!("Invalid manifest {}: {e}", self.path.display()))
        })
    }

    fn save(&self, manifest: &ManifestFile) -> PluginResult<()> {
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| PluginError::Config(e.to_string()))?;

        std::fs::write(&self.path, content)?;

        Ok(())
    }
}
