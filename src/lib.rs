//! # Graft
//!
//! Plugin packaging with static contract checks.
//!
//! Graft installs plugins into a host project. A plugin declares source files,
//! config keys, library requirements and the plugins it depends on. Each file
//! names a contract (a set of required, optional and forbidden methods) and is
//! checked against it by reading its text before anything is installed.
//!
//! ## Features
//!
//! - **Contracts**: Defined in code or TOML, validated without compiling
//! - **Transactional installs**: A file that fails its contract rolls back the plugin
//! - **Shared artifacts**: Config keys merged into YAML, library blocks in a requirement file
//! - **Discovery**: Maps installed files back to the types implementing a contract
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a default graft.yml
//! graft init
//!
//! # Install a plugin from plugins/CirclePlugin/plugin.toml
//! graft install CirclePlugin
//!
//! # Find installed implementations of a contract
//! graft discover Shape
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod config;
pub mod contract;
pub mod discovery;
pub mod plugin;

// Re-export commonly used types
pub use config::{AllowConfig, FilePaths, RuntimeConfig, DEFAULT_CONFIG_FILE};
pub use contract::{
    file_implements_contract, validate, Contract, ContractHooks, ContractRegistry,
    DefinitionError, MethodKind, ValidationResult,
};
pub use discovery::{Discovery, Factories, ImplementationHandle, Implementations, Selection};
pub use plugin::{
    Plugin, PluginDescriptor, PluginError, PluginLifecycle, PluginResult, PluginState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "graft";
