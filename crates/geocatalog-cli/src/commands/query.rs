//! Query command

use clap::Args;
use geocatalog_core::{CriterionParameters, IndexRequest, Predicate};
use geocatalog_index::PluggableIndex;
use serde::Serialize;

use crate::output::{format_output, format_table, OutputFormat};
use crate::AppContext;

#[derive(Args)]
pub struct QueryArgs {
    /// Lower-left corner or search point, as "lon,lat"
    #[arg(allow_hyphen_values = true)]
    pub lower_left: String,

    /// Upper-right corner, as "lon,lat"
    #[arg(long, allow_hyphen_values = true)]
    pub upper_right: Option<String>,

    /// Predicate: intersection, within, distance, nearest
    #[arg(short = 'p', long, default_value = "intersection")]
    pub predicate: Predicate,

    /// Search radius in meters (distance)
    #[arg(short, long)]
    pub tolerance: Option<f64>,

    /// Number of results (nearest)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Show stored paths and titles instead of scores
    #[arg(long)]
    pub raw: bool,
}

impl QueryArgs {
    fn criterion(&self) -> CriterionParameters {
        let mut criterion = CriterionParameters::new(&self.lower_left, self.predicate);
        criterion.upper_right = self.upper_right.clone();
        criterion.tolerance = self.tolerance;
        criterion.limit = self.limit;
        criterion
    }
}

#[derive(Serialize)]
struct ScoredRow {
    id: u64,
    score: u32,
}

pub async fn run(args: &QueryArgs, ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    let field = ctx.index.config()?.id;
    let (field, query) = args.criterion().criteria_item(&field)?;
    // Fail early on malformed input; the index would only log it
    let spec = query.resolve()?;
    tracing::debug!("Querying {} with {:?}", field, spec);

    let request = IndexRequest::new().with_field(field, query);
    let index_ctx = ctx.index_context();

    if args.raw {
        let Some(hits) = ctx.index.apply_index_raw(&index_ctx, &request).await? else {
            anyhow::bail!("Spatial service could not answer the query");
        };
        if format == OutputFormat::Json {
            println!("{}", format_output(&hits, format));
        } else {
            let rows: Vec<Vec<String>> = hits
                .iter()
                .map(|hit| {
                    vec![
                        hit.id.clone(),
                        hit.properties.path.clone(),
                        hit.properties.title.clone(),
                    ]
                })
                .collect();
            println!("{}", format_table(&["id", "path", "title"], &rows));
        }
        return Ok(());
    }

    let Some(applied) = ctx.index.apply_index(&index_ctx, &request).await? else {
        anyhow::bail!("Spatial service could not answer the query");
    };

    let mut rows: Vec<ScoredRow> = applied
        .results
        .ids()
        .into_iter()
        .map(|id| ScoredRow {
            id,
            score: applied.results.score(id).unwrap_or(0),
        })
        .collect();
    rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

    if format == OutputFormat::Json {
        println!("{}", format_output(&rows, format));
    } else if rows.is_empty() {
        println!("No results");
    } else {
        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|r| vec![r.id.to_string(), r.score.to_string()])
            .collect();
        println!("{}", format_table(&["id", "score"], &cells));
    }
    Ok(())
}
