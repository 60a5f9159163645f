use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Table};
use dealmind_ai::{EntryMetadata, MemoryEntry};
use serde_json::json;

use super::{parse_domain, parse_pair};
use crate::cli::{IngestArgs, SearchArgs};
use crate::output::table::{preview_text, print_table};
use crate::output::{OutputFormat, json::print_json};
use crate::setup::Runtime;

pub async fn ingest(runtime: &Runtime, args: IngestArgs, format: OutputFormat) -> Result<()> {
    let domain = parse_domain(&args.domain)?;
    let text = match (args.text, &args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Provide --text or --file"),
    };

    let mut metadata = EntryMetadata::document(domain);
    if let Some(path) = &args.file {
        metadata = metadata.with_extra("source", path.display().to_string());
    }
    for pair in &args.meta {
        let (key, value) = parse_pair(pair)?;
        metadata = metadata.with_extra(key, value);
    }

    let id = runtime
        .manager
        .add_knowledge_document(&text, metadata, domain)
        .await?;

    if format.is_json() {
        return print_json(&json!({ "id": id, "domain": domain }));
    }

    println!("Stored {} in {}", id, domain);
    Ok(())
}

pub async fn search(runtime: &Runtime, args: SearchArgs, format: OutputFormat) -> Result<()> {
    let domain = parse_domain(&args.domain)?;
    let hits = runtime
        .manager
        .search_knowledge(&args.query, domain, args.k)
        .await;

    if format.is_json() {
        return print_json(&hits);
    }

    if hits.is_empty() {
        println!("No matches in {}", domain);
        return Ok(());
    }
    render_hits_table(&hits)
}

fn render_hits_table(hits: &[MemoryEntry]) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Distance", "Type", "Created", "Preview"]);

    for hit in hits {
        table.add_row(vec![
            Cell::new(hit.id.to_string()),
            Cell::new(
                hit.distance
                    .map(|d| format!("{d:.4}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(hit.metadata.entry_type.clone()),
            Cell::new(hit.metadata.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(preview_text(&hit.text, 60)),
        ]);
    }

    print_table(table)
}
