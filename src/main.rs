//! Graft - plugin packaging with static contract checks.
//!
//! Installs plugins into the current project, validating each plugin file
//! against its contract first.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use graft::plugin::{PluginDescriptor, DESCRIPTOR_FILE};
use graft::{
    ContractRegistry, Discovery, PluginError, PluginLifecycle, RuntimeConfig, Selection,
    DEFAULT_CONFIG_FILE,
};

/// Plugin packaging with static contract checks
#[derive(Parser)]
#[command(name = "graft")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Runtime configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and create the plugin directories
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Install a plugin by name or from a plugin directory
    Install {
        /// Plugin name (looked up in the plugins root) or directory containing plugin.toml
        plugin: String,
    },

    /// Uninstall a plugin
    Uninstall {
        /// Plugin name or directory containing plugin.toml
        plugin: String,
    },

    /// List installed plugins
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check a source file against a contract
    Validate {
        /// Source file to check
        file: PathBuf,

        /// Contract name
        contract: String,
    },

    /// Find installed implementations of a contract
    Discover {
        /// Contract name
        contract: String,

        /// Only report these type names
        #[arg(short, long = "select")]
        select: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    match cli.command {
        Commands::Init { force } => cmd_init(&cli.config, force),
        Commands::Install { plugin } => cmd_install(&cli.config, &plugin),
        Commands::Uninstall { plugin } => cmd_uninstall(&cli.config, &plugin),
        Commands::List { format } => cmd_list(&cli.config, &format),
        Commands::Validate { file, contract } => cmd_validate(&cli.config, &file, &contract),
        Commands::Discover { contract, select } => cmd_discover(&cli.config, &contract, select),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Load the runtime configuration and build an orchestrator from it.
fn lifecycle(config_path: &Path) -> Result<PluginLifecycle> {
    let config = RuntimeConfig::load_from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    Ok(PluginLifecycle::from_config(config)?)
}

/// Resolve a plugin argument to its descriptor: a package directory, or the
/// name of a plugin in the manifest or the plugins root.
fn resolve_plugin(lifecycle: &PluginLifecycle, plugin: &str) -> Result<PluginDescriptor> {
    let dir = Path::new(plugin);

    let descriptor = if dir.join(DESCRIPTOR_FILE).is_file() {
        PluginDescriptor::from_plugin_dir(dir)?
    } else {
        lifecycle.find_plugin(plugin)?
    };

    Ok(descriptor)
}

/// Write the default configuration.
fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    let config = RuntimeConfig::generate(config_path)?;
    let paths = &config.file_paths;

    std::fs::create_dir_all(&paths.plugins)?;
    if let Some(parent) = paths.config.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    println!("Created {}", config_path.display());
    println!("Plugins directory: {}", paths.plugins.display());
    Ok(())
}

/// Install a plugin.
fn cmd_install(config_path: &Path, plugin: &str) -> Result<()> {
    let lifecycle = lifecycle(config_path)?;
    let descriptor = resolve_plugin(&lifecycle, plugin)?;

    if let Err(e) = lifecycle.install(&descriptor) {
        for message in e.messages() {
            eprintln!("  - {message}");
        }
        return Err(e.into());
    }

    println!("Installed {} {}", descriptor.name, descriptor.version);
    Ok(())
}

/// Uninstall a plugin.
fn cmd_uninstall(config_path: &Path, plugin: &str) -> Result<()> {
    let lifecycle = lifecycle(config_path)?;
    let descriptor = resolve_plugin(&lifecycle, plugin)?;

    lifecycle.uninstall(&descriptor)?;

    println!("Uninstalled {}", descriptor.name);
    Ok(())
}

/// List installed plugins.
fn cmd_list(config_path: &Path, format: &str) -> Result<()> {
    let config = RuntimeConfig::load_from_file(config_path)?;
    let manifest = graft::plugin::ManifestStore::open(&config.file_paths.manifest)?;

    match format {
        "json" => {
            let plugins = manifest.list_plugins()?;
            let json = serde_json::to_string_pretty(&plugins)?;
            println!("{json}");
        }
        _ => {
            let plugins = manifest.installed_plugins()?;
            if plugins.is_empty() {
                println!("No plugins installed.");
            } else {
                for plugin in &plugins {
                    println!("{plugin}");
                }
                println!("\nTotal: {} plugins", plugins.len());
            }
        }
    }

    Ok(())
}

/// Validate a single file against a contract.
fn cmd_validate(config_path: &Path, file: &Path, contract: &str) -> Result<()> {
    let config = RuntimeConfig::load_from_file(config_path)?;
    let registry = ContractRegistry::from_modules(config.modules.as_slice())?;

    if !registry.contains(contract) {
        return Err(PluginError::UnknownContract(contract.to_string()).into());
    }

    let result = graft::validate(&registry, file, contract);

    if result.is_valid() {
        println!("{} satisfies {contract}", file.display());
        return Ok(());
    }

    for message in &result.messages {
        eprintln!("  - {message}");
    }
    anyhow::bail!("{} does not satisfy {contract}", file.display())
}

/// Discover installed implementations of a contract.
fn cmd_discover(config_path: &Path, contract: &str, select: Vec<String>) -> Result<()> {
    let config = RuntimeConfig::load_from_file(config_path)?;
    let selection = (!select.is_empty()).then(|| Selection::from(select));

    let found = Discovery::from_config(&config).discover(contract, None, selection.as_ref());

    if found.is_empty() {
        println!("No implementations of {contract} installed.");
        return Ok(());
    }

    for (name, handle) in &found {
        println!("{name}  {}", handle.path.display());
    }

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "graft", &mut io::stdout());
}
