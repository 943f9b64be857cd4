use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use kiln::config::HostConfig;
use kiln::context::ExecutionContext;
use kiln::plugins::{PluginsLoader, TracingSink};

/// Kiln - inspect and load Furnace emulator extensions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to scan for extension modules (overrides the config file)
    #[arg(short, long)]
    plugins_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every registered plugin name
    List,
    /// Load all active plugins from the configuration
    Load,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let mut config = if let Some(config_path) = args.config {
        HostConfig::load_from_file(&config_path)?
    } else {
        HostConfig::load_default()?
    };

    if let Some(dir) = args.plugins_dir {
        config.plugins_dir = dir;
    }

    let loader = PluginsLoader::from_dir(&config.plugins_dir);

    match args.command {
        Command::List => {
            let entries = loader
                .registry()
                .entries()
                .with_context(|| format!("Failed to scan {}", config.plugins_dir.display()))?;

            for (key, definition) in entries {
                println!(
                    "{key}\t{}\t{}\t{:?}",
                    definition.qualified_name(),
                    definition.creation().label(),
                    definition.capabilities()
                );
            }
        }
        Command::Load => {
            let context = ExecutionContext::default();
            let plugins = loader
                .load_all(&config.document, &config.overrides, &context, &TracingSink)
                .context("Failed to load plugins")?;
            context.publish_loaded(&plugins);

            for plugin in context.loaded_plugins() {
                println!("{}\t{}", plugin.name, plugin.qualified_name);
            }
        }
    }

    Ok(())
}
