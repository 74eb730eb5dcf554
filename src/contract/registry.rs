//! Contract registry.
//!
//! Maps contract names to their method partitions and optional file hooks.
//! Contracts are registered in code or loaded from the TOML definition files
//! listed in the runtime configuration's `modules`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use serde::Deserialize;
use walkdir::WalkDir;

use super::{Contract, ContractHooks, DefinitionError, Directives, MethodKind};

/// Contract definition file format.
#[derive(Debug, Default, Deserialize)]
struct ContractFile {
    #[serde(default)]
    contract: Vec<ContractDefinition>,
}

/// One `[[contract]]` table.
#[derive(Debug, Deserialize)]
struct ContractDefinition {
    name: String,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    optional: Vec<String>,
    #[serde(default)]
    forbidden: Vec<String>,
}

/// Registry of known contracts.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, Contract>,
    hooks: HashMap<String, Arc<dyn ContractHooks>>,
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("contracts", &self.contracts.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContractRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from contract modules.
    ///
    /// Each module is a TOML definition file or a directory searched
    /// recursively for `*.toml` files.
    pub fn from_modules<P: AsRef<Path>>(modules: &[P]) -> Result<Self, DefinitionError> {
        let mut registry = Self::new();

        for module in modules {
            let module = module.as_ref();
            for file in definition_files(module)? {
                registry.load_file(&file)?;
            }
        }

        tracing::debug!(count = registry.len(), "Loaded contracts");
        Ok(registry)
    }

    /// Load every contract defined in one TOML file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, DefinitionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| DefinitionError::Read { path: path.to_path_buf(), source })?;
        let file: ContractFile = toml::from_str(&content).map_err(|e| DefinitionError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let count = file.contract.len();
        for definition in file.contract {
            self.register_methods(
                definition.name,
                definition.required,
                definition.optional,
                definition.forbidden,
            )?;
        }

        Ok(count)
    }

    /// Register a built contract, replacing any earlier one with the same name.
    pub fn register(&mut self, contract: Contract) {
        tracing::debug!(contract = contract.name(), "Registered contract");
        self.contracts.insert(contract.name().to_string(), contract);
    }

    /// Build and register a contract from its three partitions.
    pub fn register_methods<I, R, O, F>(
        &mut self,
        name: impl Into<String>,
        required: R,
        optional: O,
        forbidden: F,
    ) -> Result<(), DefinitionError>
    where
        I: Into<String>,
        R: IntoIterator<Item = I>,
        O: IntoIterator<Item = I>,
        F: IntoIterator<Item = I>,
    {
        let contract = Contract::builder(name)
            .required(required)
            .optional(optional)
            .forbidden(forbidden)
            .build()?;
        self.register(contract);
        Ok(())
    }

    /// Attach file hooks to a contract.
    pub fn register_hooks(&mut self, name: impl Into<String>, hooks: Arc<dyn ContractHooks>) {
        self.hooks.insert(name.into(), hooks);
    }

    /// Get a contract by name.
    pub fn get(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    /// Whether a contract is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    /// Partitions of a contract.
    pub fn directives(&self, name: &str) -> Option<&Directives> {
        self.get(name).map(Contract::directives)
    }

    /// One partition of a contract.
    pub fn methods_tagged(&self, name: &str, kind: MethodKind) -> Option<&IndexSet<String>> {
        self.get(name).map(|c| c.methods_tagged(kind))
    }

    /// File hooks attached to a contract.
    pub fn hooks(&self, name: &str) -> Option<&Arc<dyn ContractHooks>> {
        self.hooks.get(name)
    }

    /// Registered contract names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contracts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Definition files for one module entry, sorted for stable load order.
fn definition_files(module: &Path) -> Result<Vec<PathBuf>, DefinitionError> {
    if module.is_file() {
        return Ok(vec![module.to_path_buf()]);
    }
    if !module.is_dir() {
        return Err(DefinitionError::MissingModule(module.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(module)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SHAPES: &str = r#"
[[contract]]
name = "Shape"
required = ["area", "draw"]
optional = ["shape_is_a_polygon"]
forbidden = ["rofl"]

[[contract]]
name = "Renderer"
required = ["render"]
"#;

    #[test]
    fn test_empty_modules_give_empty_registry() {
        let modules: Vec<PathBuf> = Vec::new();
        let registry = ContractRegistry::from_modules(modules.as_slice()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_from_file_module() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shapes.toml");
        std::fs::write(&path, SHAPES).unwrap();

        let registry = ContractRegistry::from_modules(&[&path]).unwrap();

        assert_eq!(registry.names(), vec!["Renderer", "Shape"]);
        let directives = registry.directives("Shape").unwrap();
        assert!(directives.required.contains("draw"));
        assert!(directives.optional.contains("shape_is_a_polygon"));
        assert!(directives.forbidden.contains("rofl"));
    }

    #[test]
    fn test_load_from_directory_module() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("contracts").join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("shapes.toml"), SHAPES).unwrap();
        std::fs::write(nested.join("README.md"), "not a contract").unwrap();

        let registry = ContractRegistry::from_modules(&[temp_dir.path().join("contracts")]).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_module_is_an_error() {
        let result = ContractRegistry::from_modules(&["no/such/contracts.toml"]);
        assert!(matches!(result, Err(DefinitionError::MissingModule(_))));
    }

    #[test]
    fn test_overlapping_definition_in_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[[contract]]\nname = \"Shape\"\nrequired = [\"draw\"]\noptional = [\"draw\"]\n",
        )
        .unwrap();

        let result = ContractRegistry::from_modules(&[&path]);
        assert!(matches!(result, Err(DefinitionError::OverlappingDirective { .. })));
    }

    #[test]
    fn test_malformed_definition_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[[contract]]\nrequired = 3\n").unwrap();

        let result = ContractRegistry::from_modules(&[&path]);
        assert!(matches!(result, Err(DefinitionError::Parse { .. })));
    }

    #[test]
    fn test_methods_tagged() {
        let mut registry = ContractRegistry::new();
        registry.register_methods("Shape", ["area", "draw"], ["shape_is_a_polygon"], ["rofl"]).unwrap();

        let required = registry.methods_tagged("Shape", MethodKind::Required).unwrap();
        assert!(required.contains("area"));
        assert!(!required.contains("rofl"));
        assert!(registry.methods_tagged("Unknown", MethodKind::Required).is_none());
    }

    #[test]
    fn test_register_hooks() {
        struct Counter(AtomicUsize);

        impl ContractHooks for Counter {
            fn on_file_install(&self, _path: &str, _contract: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut registry = ContractRegistry::new();
        registry.register_hooks("Shape", counter.clone());

        registry.hooks("Shape").unwrap().on_file_install("shapes/star.rs", "Shape");
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(registry.hooks("Renderer").is_none());
    }
}
