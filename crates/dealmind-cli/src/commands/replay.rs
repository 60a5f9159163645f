use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use dealmind_ai::{
    Budget, Domain, Event, EventKind, EventPayload, MemoryConfig, Role, SessionInfo, SessionKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::parse_domain;
use crate::cli::ReplayArgs;
use crate::config::CliConfig;
use crate::output::table::{preview_text, print_table};
use crate::output::{OutputFormat, json::print_json};
use crate::setup::Runtime;

/// One transcript line.
#[derive(Debug, Deserialize)]
struct Turn {
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    /// Cited earlier turns, by position in the transcript
    #[serde(default)]
    references: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct CondensationLine {
    turn: usize,
    condenser: String,
    summarized: usize,
    offloaded: usize,
    fallback: bool,
    units_before: usize,
    units_after: usize,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    session: SessionInfo,
    appended: usize,
    condensations: Vec<CondensationLine>,
    history: Vec<Event>,
    persisted: usize,
}

/// Configured memory settings with the command's budget override.
pub fn memory_config(config: &CliConfig, args: &ReplayArgs) -> Result<MemoryConfig> {
    let mut memory = config.memory.clone();
    if let Some(limit) = args.max_events {
        memory = memory.with_budget(Budget::MaxEvents(limit));
    }
    if let Some(limit) = args.max_bytes {
        memory = memory.with_budget(Budget::MaxBytes(limit));
    }
    memory.validate()?;
    Ok(memory)
}

pub async fn run(runtime: &Runtime, args: ReplayArgs, format: OutputFormat) -> Result<()> {
    let domain = parse_domain(&args.domain)?;
    let content = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("Failed to read {}", args.transcript.display()))?;
    let turns: Vec<Turn> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid transcript {}", args.transcript.display()))?;

    let key = SessionKey::new(args.session, args.user);
    runtime.manager.open_session(&key, Some(domain))?;

    let mut ids = Vec::with_capacity(turns.len());
    let mut condensations = Vec::new();
    for (index, turn) in turns.into_iter().enumerate() {
        let event = build_event(&turn, domain, &ids)
            .with_context(|| format!("Transcript turn {index} is invalid"))?;
        let outcome = runtime.manager.append_event(&key, domain, event).await?;
        ids.push(outcome.event_id);

        if let Some(report) = outcome.condensation.filter(|r| r.changed()) {
            condensations.push(CondensationLine {
                turn: index,
                condenser: report.condenser,
                summarized: report.summarized.len(),
                offloaded: report.offloaded.len(),
                fallback: report.fallback,
                units_before: report.units_before,
                units_after: report.units_after,
            });
        }
    }

    let session = runtime
        .manager
        .session_info(&key)
        .context("Session closed during replay")?;
    let history = runtime.manager.history(&key);
    let persisted = runtime.manager.end_session(&key, args.persist).await?;

    let report = ReplayReport {
        session,
        appended: ids.len(),
        condensations,
        history,
        persisted,
    };

    if format.is_json() {
        return print_json(&report);
    }
    print_report(&report)
}

fn build_event(turn: &Turn, domain: Domain, ids: &[dealmind_ai::EventId]) -> Result<Event> {
    let references = turn
        .references
        .iter()
        .map(|&index| {
            ids.get(index)
                .copied()
                .with_context(|| format!("reference to turn {index}, which is not earlier"))
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = EventPayload::text(turn.content.clone())
        .with_fields(turn.fields.clone())
        .with_references(references);
    let kind = match domain {
        Domain::General => EventKind::Message,
        other => EventKind::Domain(other),
    };
    Ok(Event::new(turn.role, kind, payload)?)
}

fn print_report(report: &ReplayReport) -> Result<()> {
    println!(
        "Session {} ({}, {} via {}, budget {})",
        report.session.session_id,
        report.session.domain,
        report.session.strategy,
        report.session.condenser,
        report.session.budget
    );
    println!(
        "Appended {} events, {} condensations",
        report.appended,
        report.condensations.len()
    );
    for line in &report.condensations {
        println!(
            "  after turn {}: {} summarized, {} offloaded, {} -> {} units{}",
            line.turn,
            line.summarized,
            line.offloaded,
            line.units_before,
            line.units_after,
            if line.fallback { " (fallback)" } else { "" }
        );
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Role", "Kind", "Content"]);
    for (index, event) in report.history.iter().enumerate() {
        let kind = if event.is_condensation() {
            format!("summary of {}", event.source_event_ids().len())
        } else {
            match event.kind().domain() {
                Some(domain) => domain.to_string(),
                None => "message".to_string(),
            }
        };
        table.add_row(vec![
            Cell::new(index),
            Cell::new(event.role().as_str()),
            Cell::new(kind),
            Cell::new(preview_text(&event.render_line(), 80)),
        ]);
    }
    print_table(table)?;

    if report.persisted > 0 {
        println!("Persisted {} events to long-term memory", report.persisted);
    }
    Ok(())
}
