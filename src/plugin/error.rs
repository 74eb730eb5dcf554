//! Plugin system error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::contract::DefinitionError;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur during plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A declared plugin dependency is not installed.
    #[error("Plugin '{plugin}' depends on '{dependency}', which is not installed")]
    UnmetDependency { plugin: String, dependency: String },

    /// The directory an artifact should be written to does not exist.
    #[error("Plugin '{plugin}': target directory for {artifact} does not exist: {}", path.display())]
    MissingTarget { plugin: String, artifact: &'static str, path: PathBuf },

    /// A plugin file does not satisfy its contract.
    #[error("Plugin '{plugin}': '{file}' failed validation: {}", messages.join("; "))]
    Validation { plugin: String, file: String, messages: Vec<String> },

    /// A file declaration names a contract nobody registered.
    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    /// Invalid plugin descriptor.
    #[error("Invalid plugin descriptor: {0}")]
    InvalidDescriptor(String),

    /// Contract definition error.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Malformed manifest, config or requirement file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Validation messages attached to this error, if any.
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Validation { messages, .. } => messages,
            _ => &[],
        }
    }
}
