//! Contract validation.
//!
//! A file satisfies a contract when it declares every required method and
//! none of the forbidden ones. Optional methods never matter.

use std::path::Path;

use super::{scanner, ContractRegistry};

/// Outcome of validating one file against one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the file satisfies the contract.
    pub valid: bool,
    /// Diagnostics, empty when valid.
    pub messages: Vec<String>,
}

impl ValidationResult {
    /// Create a passing result.
    pub fn ok() -> Self {
        Self { valid: true, messages: Vec::new() }
    }

    /// Create a failing result with a single message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self { valid: false, messages: vec![message.into()] }
    }

    /// Add a failure message.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.messages.push(message.into());
    }

    /// Whether the file satisfies the contract.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Validate the file at `path` against the named contract.
///
/// Never fails: an unknown contract or an unreadable file produce an invalid
/// result with an explanatory message.
pub fn validate(registry: &ContractRegistry, path: &Path, contract: &str) -> ValidationResult {
    let Some(directives) = registry.directives(contract) else {
        return ValidationResult::failed(format!("unknown contract '{contract}'"));
    };

    let Ok(source) = std::fs::read_to_string(path) else {
        return ValidationResult::failed(format!(
            "file '{}' does not exist or is not readable",
            path.display()
        ));
    };

    let declared = scanner::declared_methods_in(&source);
    let mut result = ValidationResult::ok();

    let missing: Vec<&str> = directives
        .required
        .iter()
        .filter(|m| !declared.contains(*m))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        result.add_error(format!("expected methods are missing: {}", missing.join(", ")));
    }

    for method in directives.forbidden.iter().filter(|m| declared.contains(*m)) {
        result.add_error(format!("forbidden method '{method}' should not appear in the file"));
    }

    tracing::debug!(
        path = ?path,
        contract = contract,
        valid = result.valid,
        "Validated file against contract"
    );

    result
}

/// Find the type in the file at `path` that implements `contract`.
///
/// Returns `(false, None)` when the file is missing, unparseable or has no
/// matching `impl` block.
pub fn file_implements_contract(path: &Path, contract: &str) -> (bool, Option<String>) {
    let Ok(source) = std::fs::read_to_string(path) else {
        return (false, None);
    };

    scanner::implementing_types(&source)
        .into_iter()
        .find(|block| block.contract == contract)
        .map_or((false, None), |block| (true, Some(block.type_name)))
}
