//! Geocatalog CLI - Operate a spatial catalog index from the command line

use clap::{Parser, Subcommand};
use geocatalog_index::{IndexContext, SpatialIndex, Transaction};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, document, query, service};
use config::Config;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "geocatalog")]
#[command(author, version, about = "Spatial catalog index backed by a remote spatial service")]
pub struct Cli {
    /// Spatial service URI, overriding the config file
    #[arg(long, global = true)]
    pub uri: Option<String>,

    /// Environment variable holding the service URI
    #[arg(long = "uri-env", global = true)]
    pub uri_env: Option<String>,

    /// Index id, the attribute indexed documents carry
    #[arg(short, long, global = true)]
    pub index: Option<String>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show service statistics
    Info,
    /// Index a GeoJSON document
    Index(document::IndexArgs),
    /// Remove a document from the index
    Unindex(document::DocumentIdArgs),
    /// Show what the service stores for a document
    Entry(document::DocumentIdArgs),
    /// Search the index
    Query(query::QueryArgs),
    /// Remove every document from the index
    Clear(service::ClearArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with the index the commands operate on
pub struct AppContext {
    pub index: SpatialIndex,
}

impl AppContext {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let file_config = Config::load();
        let index_config = file_config.index_config(
            cli.index.as_deref(),
            cli.uri.as_deref(),
            cli.uri_env.as_deref(),
        );
        // Surface a missing URI before any command runs
        let uri = index_config.effective_uri()?;
        tracing::debug!("Using index {} at {}", index_config.id, uri);

        Ok(Self {
            index: SpatialIndex::new(index_config),
        })
    }

    /// Fresh context for one command, in its own transaction
    pub fn index_context(&self) -> IndexContext {
        IndexContext::new(Transaction::begin())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let format = OutputFormat::from(cli.format.as_str());

    match &cli.command {
        Commands::Config(args) => return commands::config::run(args, format),
        Commands::Completions(args) => return completions::run(args),
        _ => {}
    }

    let ctx = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Info => service::run_info(&ctx, format).await?,
        Commands::Index(args) => document::run_index(args, &ctx).await?,
        Commands::Unindex(args) => document::run_unindex(args, &ctx).await?,
        Commands::Entry(args) => document::run_entry(args, &ctx, format).await?,
        Commands::Query(args) => query::run(args, &ctx, format).await?,
        Commands::Clear(args) => service::run_clear(args, &ctx).await?,
        Commands::Config(_) | Commands::Completions(_) => {}
    }

    Ok(())
}
