//! Contracts that plugin files must satisfy.
//!
//! A contract is a named set of method names split into three partitions:
//!
//! - **Required**: every one must be declared by the file
//! - **Optional**: may be declared, never affects validity
//! - **Forbidden**: must not be declared
//!
//! Files are checked by reading their text only. Nothing is compiled or
//! loaded during validation.
//!
//! # Example Definition
//!
//! ```toml
//! [[contract]]
//! name = "Shape"
//! required = ["area", "draw"]
//! optional = ["shape_is_a_polygon"]
//! forbidden = ["rofl"]
//! ```

mod registry;
pub mod scanner;
mod validator;

use std::path::PathBuf;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use registry::ContractRegistry;
pub use validator::{file_implements_contract, validate, ValidationResult};

/// Errors raised while defining contracts.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// A method name was placed in two partitions of the same contract.
    #[error("Contract '{contract}': method '{method}' is both {first} and {second}")]
    OverlappingDirective {
        contract: String,
        method: String,
        first: MethodKind,
        second: MethodKind,
    },

    /// Contract name is empty.
    #[error("Contract name is required")]
    EmptyName,

    /// A contract module listed in the configuration does not exist.
    #[error("Contract module not found: {}", .0.display())]
    MissingModule(PathBuf),

    /// A contract definition file could not be read.
    #[error("Failed to read contract definitions from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A contract definition file is malformed.
    #[error("Invalid contract definitions in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Partition a method name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Must be declared.
    Required,
    /// May be declared.
    Optional,
    /// Must not be declared.
    Forbidden,
}

impl MethodKind {
    /// Get the display name for this partition.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Forbidden => "forbidden",
        }
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The three method partitions of a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    pub required: IndexSet<String>,
    pub optional: IndexSet<String>,
    pub forbidden: IndexSet<String>,
}

impl Directives {
    /// Get one partition.
    pub fn tagged(&self, kind: MethodKind) -> &IndexSet<String> {
        match kind {
            MethodKind::Required => &self.required,
            MethodKind::Optional => &self.optional,
            MethodKind::Forbidden => &self.forbidden,
        }
    }

    /// Partition a method belongs to, if any.
    pub fn kind_of(&self, method: &str) -> Option<MethodKind> {
        [MethodKind::Required, MethodKind::Optional, MethodKind::Forbidden]
            .into_iter()
            .find(|kind| self.tagged(*kind).contains(method))
    }

    /// Every method named by the contract, required first.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .chain(self.forbidden.iter())
            .map(String::as_str)
    }
}

/// A named contract. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    name: String,
    directives: Directives,
}

impl Contract {
    /// Start building a contract.
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder { name: name.into(), entries: Vec::new() }
    }

    /// Contract name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All three partitions.
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// Methods in one partition.
    pub fn methods_tagged(&self, kind: MethodKind) -> &IndexSet<String> {
        self.directives.tagged(kind)
    }
}

/// Builder for [`Contract`]. Overlaps are reported by [`ContractBuilder::build`].
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    name: String,
    entries: Vec<(String, MethodKind)>,
}

impl ContractBuilder {
    /// Add required methods.
    pub fn required<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag(MethodKind::Required, methods)
    }

    /// Add optional methods.
    pub fn optional<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag(MethodKind::Optional, methods)
    }

    /// Add forbidden methods.
    pub fn forbidden<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag(MethodKind::Forbidden, methods)
    }

    /// Add methods to the given partition.
    pub fn tag<I, S>(mut self, kind: MethodKind, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.extend(methods.into_iter().map(|m| (m.into(), kind)));
        self
    }

    /// Build the contract, rejecting names that sit in two partitions.
    pub fn build(self) -> Result<Contract, DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }

        let mut directives = Directives::default();

        for (method, kind) in self.entries {
            match directives.kind_of(&method) {
                Some(existing) if existing != kind => {
                    return Err(DefinitionError::OverlappingDirective {
                        contract: self.name,
                        method,
                        first: existing,
                        second: kind,
                    });
                }
                Some(_) => {}
                None => {
                    let partition = match kind {
                        MethodKind::Required => &mut directives.required,
                        MethodKind::Optional => &mut directives.optional,
                        MethodKind::Forbidden => &mut directives.forbidden,
                    };
                    partition.insert(method);
                }
            }
        }

        Ok(Contract { name: self.name, directives })
    }
}

/// Callbacks fired when files delivered under a contract are installed or removed.
///
/// `path` is the file path relative to the plugin's `files` directory.
pub trait ContractHooks: Send + Sync {
    /// Called after a file has been validated and copied.
    fn on_file_install(&self, _path: &str, _contract: &str) {}

    /// Called when a file is removed.
    fn on_file_uninstall(&self, _path: &str, _contract: &str) {}
}
