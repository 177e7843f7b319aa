//! Document commands: index, unindex and inspect single documents

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use geocatalog_core::{Bbox, DocumentId, Feature, GeoDocument, Geometry};
use geocatalog_index::PluggableIndex;
use serde::Deserialize;

use crate::output::{format_output, format_table, OutputFormat};
use crate::AppContext;

#[derive(Args)]
pub struct IndexArgs {
    /// Document id
    pub id: DocumentId,

    /// GeoJSON Feature or geometry file (`-` for stdin)
    pub file: PathBuf,

    /// Physical path of the document [default: <site root>/<id>]
    #[arg(long)]
    pub path: Option<String>,

    /// Document title [default: the feature's "title" property]
    #[arg(long)]
    pub title: Option<String>,

    /// Document description
    #[arg(long)]
    pub description: Option<String>,

    /// Id of the containing document
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Args)]
pub struct DocumentIdArgs {
    /// Document id
    pub id: DocumentId,
}

/// GeoJSON input: either a Feature or a bare geometry
#[derive(Deserialize)]
#[serde(untagged)]
enum GeoJsonInput {
    Feature {
        geometry: Geometry,
        #[serde(default)]
        bbox: Option<Bbox>,
        #[serde(default)]
        properties: serde_json::Map<String, serde_json::Value>,
    },
    Geometry(Geometry),
}

fn read_input(file: &Path) -> anyhow::Result<String> {
    if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Build the document to index from command-line input
fn load_document(args: &IndexArgs, field: &str, site_root: &str) -> anyhow::Result<GeoDocument> {
    let text = read_input(&args.file)?;
    let input: GeoJsonInput =
        serde_json::from_str(&text).context("Input is neither a GeoJSON Feature nor a geometry")?;

    let (geometry, bbox, properties) = match input {
        GeoJsonInput::Feature {
            geometry,
            bbox,
            properties,
        } => (geometry, bbox, properties),
        GeoJsonInput::Geometry(geometry) => (geometry, None, Default::default()),
    };

    let feature = match bbox {
        Some(bbox) => Feature::with_bbox(geometry, bbox),
        None => Feature::new(geometry)
            .ok_or_else(|| anyhow::anyhow!("Cannot compute a bounding box for the geometry"))?,
    };

    let text_property = |name: &str| {
        properties
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let path = args
        .path
        .clone()
        .unwrap_or_else(|| format!("{}/{}", site_root.trim_end_matches('/'), args.id));
    let mut document = GeoDocument::new(path).with_feature(field, feature);
    document.title = args
        .title
        .clone()
        .or_else(|| text_property("title"))
        .unwrap_or_default();
    document.description = args
        .description
        .clone()
        .or_else(|| text_property("description"))
        .unwrap_or_default();
    if let Some(parent) = &args.parent {
        document = document.with_parent(parent);
    }
    Ok(document)
}

pub async fn run_index(args: &IndexArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let config = ctx.index.config()?;
    let document = load_document(args, &config.id, &config.site_root)?;

    let index_ctx = ctx.index_context();
    let indexed = ctx.index.index_object(&index_ctx, args.id, &document).await?;
    index_ctx.transaction.commit().await?;

    if !indexed {
        anyhow::bail!("Document {} was not indexed", args.id);
    }
    println!("Indexed document {} at {}", args.id, document.path);
    Ok(())
}

pub async fn run_unindex(args: &DocumentIdArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let index_ctx = ctx.index_context();
    let removed = ctx.index.unindex_object(&index_ctx, args.id).await?;
    index_ctx.transaction.commit().await?;

    if !removed {
        anyhow::bail!("Document {} was not unindexed", args.id);
    }
    println!("Unindexed document {}", args.id);
    Ok(())
}

pub async fn run_entry(
    args: &DocumentIdArgs,
    ctx: &AppContext,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let index_ctx = ctx.index_context();
    let Some(entries) = ctx.index.entry_for_object(&index_ctx, args.id).await? else {
        anyhow::bail!("Spatial service could not be reached");
    };

    if format == OutputFormat::Json {
        println!("{}", format_output(&entries, format));
        return Ok(());
    }
    if entries.is_empty() {
        println!("Document {} is not indexed", args.id);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry
                    .geometry
                    .as_ref()
                    .map(|g| g.kind.clone())
                    .unwrap_or_default(),
                entry.bbox.map(|b| b.to_param()).unwrap_or_default(),
            ]
        })
        .collect();
    println!("{}", format_table(&["type", "bbox"], &rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(file: PathBuf) -> IndexArgs {
        IndexArgs {
            id: 42,
            file,
            path: None,
            title: None,
            description: None,
            parent: Some("places".to_string()),
        }
    }

    #[test]
    fn test_load_feature() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type": "Feature",
                "geometry": {{"type": "LineString", "coordinates": [[1.0, 2.0], [3.0, 0.5]]}},
                "properties": {{"title": "Via Appia"}}}}"#
        )
        .unwrap();

        let args = args_for(file.path().to_path_buf());
        let doc = load_document(&args, "geolocation", "/plone").unwrap();
        assert_eq!(doc.path, "/plone/42");
        assert_eq!(doc.title, "Via Appia");
        assert_eq!(doc.parent_id.as_deref(), Some("places"));
        assert_eq!(doc.features["geolocation"].bbox, Bbox::new(1.0, 0.5, 3.0, 2.0));
    }

    #[test]
    fn test_load_bare_geometry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"type": "Point", "coordinates": [12.5, 41.9]}}"#).unwrap();

        let mut args = args_for(file.path().to_path_buf());
        args.title = Some("Roma".to_string());
        let doc = load_document(&args, "geolocation", "").unwrap();
        assert_eq!(doc.path, "/42");
        assert_eq!(doc.title, "Roma");
        assert_eq!(doc.features["geolocation"].bbox, Bbox::new(12.5, 41.9, 12.5, 41.9));
    }

    #[test]
    fn test_load_invalid_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "nowhere"}}"#).unwrap();
        assert!(load_document(&args_for(file.path().to_path_buf()), "geolocation", "").is_err());
    }
}
