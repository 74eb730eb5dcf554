//! Discovery of installed implementations.
//!
//! Discovery maps the files installed under a contract back to the types that
//! implement it. Nothing is compiled or loaded: each file is scanned for an
//! `impl <Contract> for <Type>` block and yields an [`ImplementationHandle`].
//! Hosts that link the implementations in can register constructors in
//! [`Factories`] so handles can build instances.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::contract::file_implements_contract;
use crate::plugin::ManifestStore;

/// Constructor for a discovered type.
pub type Factory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Constructors registered by the host, keyed by type name.
#[derive(Clone, Default)]
pub struct Factories {
    constructors: HashMap<String, Factory>,
}

impl Factories {
    /// Create an empty set of constructors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `type_name`, replacing any earlier one.
    pub fn register<F, T>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Any + Send,
    {
        let factory: Factory = Arc::new(move || Box::new(constructor()) as Box<dyn Any + Send>);
        self.constructors.insert(type_name.into(), factory);
    }

    /// Constructor for `type_name`.
    pub fn get(&self, type_name: &str) -> Option<&Factory> {
        self.constructors.get(type_name)
    }

    /// Whether a constructor exists for `type_name`.
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }
}

impl fmt::Debug for Factories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("Factories").field("types", &names).finish()
    }
}

/// A discovered implementation of a contract.
#[derive(Clone)]
pub struct ImplementationHandle {
    /// Name of the implementing type.
    pub type_name: String,
    /// Contract the type implements.
    pub contract: String,
    /// Installed file declaring the type.
    pub path: PathBuf,
    factory: Option<Factory>,
}

impl ImplementationHandle {
    /// Whether a constructor is bound to this handle.
    pub fn is_bound(&self) -> bool {
        self.factory.is_some()
    }

    /// Build an instance with the bound constructor.
    pub fn instantiate(&self) -> Option<Box<dyn Any + Send>> {
        self.factory.as_ref().map(|factory| factory())
    }

    /// Build an instance and downcast it to `T`.
    pub fn instantiate_as<T: Any>(&self) -> Option<Box<T>> {
        self.instantiate()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for ImplementationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationHandle")
            .field("type_name", &self.type_name)
            .field("contract", &self.contract)
            .field("path", &self.path)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl PartialEq for ImplementationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.contract == other.contract
            && self.path == other.path
            && self.is_bound() == other.is_bound()
    }
}

/// Type names to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A single type name.
    One(String),
    /// Any of several type names.
    Many(Vec<String>),
}

impl Selection {
    /// Whether `type_name` is selected.
    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            Self::One(name) => name == type_name,
            Self::Many(names) => names.iter().any(|name| name == type_name),
        }
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<String> for Selection {
    fn from(name: String) -> Self {
        Self::One(name)
    }
}

impl From<Vec<String>> for Selection {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(names: [&str; N]) -> Self {
        Self::Many(names.iter().map(ToString::to_string).collect())
    }
}

/// Discovered handles keyed by type name.
pub type Implementations = BTreeMap<String, ImplementationHandle>;

/// Resolves installed files into implementation handles.
#[derive(Debug, Clone)]
pub struct Discovery {
    manifest: ManifestStore,
    factories: Factories,
}

impl Discovery {
    /// Discover from the given manifest.
    pub fn new(manifest: ManifestStore) -> Self {
        Self { manifest, factories: Factories::default() }
    }

    /// Discover from the manifest of a runtime configuration. Queries never
    /// create the manifest; a missing one holds no plugins.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(ManifestStore::new(&config.file_paths.manifest))
    }

    /// Bind discovered types to these constructors.
    pub fn with_factories(mut self, factories: Factories) -> Self {
        self.factories = factories;
        self
    }

    /// Find the implementations of `contract` among installed files.
    ///
    /// With a `selection`, only the named types are kept; names that match
    /// nothing are ignored. With a `scope`, handles are inserted into it
    /// instead and the returned map is empty.
    ///
    /// Never fails: an unreadable manifest or file contributes nothing.
    pub fn discover(
        &self,
        contract: &str,
        scope: Option<&mut Implementations>,
        selection: Option<&Selection>,
    ) -> Implementations {
        let files = match self.manifest.files_for_contract(contract) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    manifest = ?self.manifest.path(),
                    error = %e,
                    "Could not read manifest for discovery"
                );
                return Implementations::new();
            }
        };

        let mut found = Implementations::new();

        for (path, contract) in files {
            let (implements, type_name) = file_implements_contract(&path, &contract);
            let Some(type_name) = type_name.filter(|_| implements) else {
                tracing::debug!(path = ?path, contract = contract, "No implementation found");
                continue;
            };

            if selection.is_some_and(|s| !s.matches(&type_name)) {
                continue;
            }

            let handle = ImplementationHandle {
                factory: self.factories.get(&type_name).cloned(),
                type_name: type_name.clone(),
                contract,
                path,
            };
            found.insert(type_name, handle);
        }

        tracing::debug!(contract = contract, count = found.len(), "Discovered implementations");

        match scope {
            Some(scope) => {
                scope.extend(found);
                Implementations::new()
            }
            None => found,
        }
    }
}
