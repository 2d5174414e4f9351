use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use plugrack::plugins::{DylibLoader, ManifestLoader, ModuleDiscovery};
use plugrack::{DiscoveryConfig, PluginLoader, Registry};

#[derive(Parser)]
#[command(name = "plugrack")]
#[command(about = "Inspect and load plugrack plugin packages", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.plugrack/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the plugin module identifiers of a package without loading them
    ///
    /// Both `plugin_*.json` manifests and `plugin_*` dynamic libraries are listed.
    Modules {
        /// A file inside the package directory, or the directory itself
        marker: PathBuf,
    },
    /// Load the dynamic-library modules of one or more packages and print the catalog
    ///
    /// Manifest modules are not loaded: their classes must be compiled into
    /// the host application, and this binary has none.
    Discover {
        /// Package markers; defaults to the configured plugin directories
        markers: Vec<PathBuf>,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective discovery configuration
    Config,
    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init(),
    }

    let config = match &cli.config {
        Some(path) => DiscoveryConfig::load(path),
        None => DiscoveryConfig::load_default(),
    }
    .context("failed to load discovery config")?;

    match cli.command {
        Some(Commands::Version) | None => {
            println!("plugrack {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(Commands::Modules { marker }) => {
            let discovery = ModuleDiscovery::from_config(Registry::new(), &config)
                .with_loader(ManifestLoader::default())
                .with_loader(DylibLoader::new());
            for name in discovery.list_plugin_module_names(&marker)? {
                println!("{name}");
            }
        }
        Some(Commands::Discover { markers, json }) => {
            let registry = Registry::new();
            let discovery =
                ModuleDiscovery::from_config(registry.clone(), &config).with_loader(DylibLoader::new());

            let markers = if markers.is_empty() {
                config.resolved_plugin_dirs()
            } else {
                markers
            };
            let modules = discovery
                .discover_dirs(&markers)
                .context("plugin discovery failed")?;

            let mut loader = PluginLoader::new(registry.clone());
            if json {
                let catalog = json!({
                    "modules": registry.modules(),
                    "categories": loader.list_categories(),
                    "plugins": loader.list(),
                });
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                println!("Loaded {} module(s)", modules.len());
                for fqn in loader.list_fqns() {
                    let class = loader.get_class(&fqn)?;
                    println!("  {fqn}  ({class})");
                }
            }
        }
    }

    Ok(())
}
