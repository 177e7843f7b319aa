//! Service-wide commands

use clap::Args;
use geocatalog_client::SpatialService;
use geocatalog_index::PluggableIndex;
use serde_json::json;

use crate::output::{format_output, OutputFormat};
use crate::AppContext;

#[derive(Args)]
pub struct ClearArgs {
    /// Clear without asking
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn run_info(ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    let index_ctx = ctx.index_context();
    let manager = ctx.index.connection_manager(&index_ctx)?;
    let stats = manager.connection()?.info().await?;

    if format == OutputFormat::Json {
        let out = json!({
            "index": ctx.index.config()?.id,
            "uri": manager.uri(),
            "stats": stats,
        });
        println!("{}", format_output(&out, format));
        return Ok(());
    }

    println!("Index:   {}", ctx.index.config()?.id);
    println!("Service: {}", manager.uri());
    println!("Items:   {}", stats.num_items);
    for (key, value) in &stats.extra {
        println!("{}: {}", key, value);
    }
    Ok(())
}

pub async fn run_clear(args: &ClearArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let uri = ctx.index.config()?.effective_uri()?;
    if !args.yes {
        anyhow::bail!("Refusing to clear {} without --yes", uri);
    }

    let index_ctx = ctx.index_context();
    let cleared = ctx.index.clear(&index_ctx).await?;
    index_ctx.transaction.commit().await?;

    if !cleared {
        anyhow::bail!("Index at {} was not cleared", uri);
    }
    println!("Cleared {}", uri);
    Ok(())
}
