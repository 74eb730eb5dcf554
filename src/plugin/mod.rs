//! Plugin packaging for Graft.
//!
//! A plugin is a named, versioned package declaring four kinds of artifacts:
//!
//! - **Files**: source files checked against a contract, then copied into
//!   `<plugins>/<Name>/files/`
//! - **Config**: keys merged into a shared YAML file
//! - **Libraries**: lines written into a delimited block of a shared
//!   requirement file
//! - **Dependencies**: plugins that must already be installed
//!
//! Installed plugins are recorded in a JSON manifest.
//!
//! # Example Descriptor
//!
//! ```toml
//! name = "CirclePlugin"
//! version = "0.1.0"
//! libraries = ["invoke"]
//!
//! [[files]]
//! path = "shapes/circle.rs"
//! contract = "Shape"
//!
//! [config]
//! count = 12345
//! ```

mod config_merge;
mod descriptor;
mod error;
mod lifecycle;
mod manifest;
mod requirements;

pub use config_merge::ConfigMerger;
pub use descriptor::{FileDeclaration, Plugin, PluginDescriptor, DESCRIPTOR_FILE};
pub use error::{PluginError, PluginResult};
pub use lifecycle::{PluginLifecycle, PluginState};
pub use manifest::{InstalledFile, ManifestEntry, ManifestStore};
pub use requirements::{
    block_header, extract_blocks, generate_block, RequirementBlocks, BLOCK_FOOTER,
};
