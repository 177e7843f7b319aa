//! Config commands

use clap::{Args, Subcommand};
use std::collections::BTreeMap;

use crate::config::{config_file_path, Config};
use crate::output::{format_output, OutputFormat};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a config value
    Get {
        /// Config key name
        key: String,
    },
    /// Change a config value
    Set {
        /// Config key name
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
    /// Write a config file with default values
    Init {
        /// Service URI to store right away
        #[arg(long)]
        uri: Option<String>,
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommands::Get { key } => {
            let config = Config::load();
            let value = config.get(key).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown config key: {} (available: {})",
                    key,
                    Config::keys().join(", ")
                )
            })?;
            println!("{}", value);
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load();
            config.set(key, value)?;
            config.save()?;
            println!("{} = {}", key, value);
        }
        ConfigCommands::List => {
            let config = Config::load();
            if format == OutputFormat::Json {
                let values: BTreeMap<&str, String> = Config::keys()
                    .iter()
                    .map(|k| (*k, config.get(k).unwrap_or_default()))
                    .collect();
                println!("{}", format_output(&values, format));
            } else {
                println!("# {}", config_file_path().display());
                for key in Config::keys() {
                    let value = config.get(key).unwrap_or_default();
                    let shown = if value.is_empty() { "(not set)" } else { value.as_str() };
                    println!("{} = {}", key, shown);
                }
            }
        }
        ConfigCommands::Path => println!("{}", config_file_path().display()),
        ConfigCommands::Init { uri, force } => {
            let path = config_file_path();
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            let mut config = Config::default();
            if let Some(uri) = uri {
                config.uri = uri.clone();
            }
            config.save()?;
            println!("Created config file at {}", path.display());
        }
    }
    Ok(())
}
