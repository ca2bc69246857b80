//! Template subcommands for the stepwise CLI.
//!
//! Provides `stepwise template load|list|show` for registering and
//! inspecting versioned workflow templates.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepwise_types::error::WorkflowError;
use stepwise_types::template::LoadReport;

use crate::cli::engine_error;
use crate::state::AppState;

/// Template management subcommands.
#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Load templates from a YAML/JSON file or a directory
    Load {
        /// File or directory to load
        path: PathBuf,
    },

    /// List registered templates
    List,

    /// Show a template's steps
    Show {
        /// Template id
        id: String,

        /// Exact version (defaults to the latest)
        #[arg(long)]
        template_version: Option<String>,
    },
}

pub async fn handle_template_command(
    cmd: TemplateCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        TemplateCommand::Load { path } => handle_load(&path, state, json).await,
        TemplateCommand::List => handle_list(state, json).await,
        TemplateCommand::Show {
            id,
            template_version,
        } => handle_show(&id, template_version.as_deref(), state, json).await,
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

async fn handle_load(path: &PathBuf, state: &AppState, json: bool) -> Result<()> {
    let report = state
        .engine
        .registry()
        .load_path(path)
        .await
        .with_context(|| format!("Failed to load templates from {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    ensure_nothing_rejected(&report)
}

/// A load that rejected any template fails the command after the report is shown.
fn ensure_nothing_rejected(report: &LoadReport) -> Result<()> {
    match report.rejected.len() {
        0 => Ok(()),
        1 => Err(engine_error(WorkflowError::InvalidRequest(format!(
            "template rejected: {}",
            report.rejected[0].1
        )))),
        n => Err(engine_error(WorkflowError::InvalidRequest(format!(
            "{n} templates rejected"
        )))),
    }
}

fn print_report(report: &LoadReport) {
    println!();
    for (id, version) in &report.registered {
        println!(
            "  {} Registered {} {}",
            style("*").green().bold(),
            style(id).cyan(),
            style(version).dim()
        );
    }
    for (id, version) in &report.unchanged {
        println!("  {} Unchanged  {} {}", style("=").dim(), id, style(version).dim());
    }
    for (id, version) in &report.ignored_changed {
        println!(
            "  {} Ignored    {} {} (content differs from the stored version; bump the version)",
            style("!").yellow().bold(),
            style(id).cyan(),
            style(version).dim()
        );
    }
    for (source, reason) in &report.rejected {
        println!("  {} Rejected   {}: {}", style("x").red().bold(), source, reason);
    }
    if report.registered.is_empty()
        && report.unchanged.is_empty()
        && report.ignored_changed.is_empty()
        && report.rejected.is_empty()
    {
        println!("  {}", style("No templates found.").dim());
    }
    println!();
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let templates = state
        .engine
        .registry()
        .list_templates()
        .await
        .map_err(|e| engine_error(e.into()))?;

    if json {
        let out: Vec<serde_json::Value> = templates
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "version": t.version,
                    "title": t.title,
                    "category": t.category,
                    "steps": t.steps.len(),
                    "hash": t.hash,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if templates.is_empty() {
        println!();
        println!("  {}", style("No templates registered.").dim());
        println!(
            "  {}",
            style(format!(
                "Load some with 'stepwise template load <path>' or place them in {}",
                state.config.templates_path(&state.data_dir).display()
            ))
            .dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Id").fg(Color::Cyan),
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Title").fg(Color::Cyan),
            Cell::new("Steps").fg(Color::Cyan),
            Cell::new("Hash").fg(Color::Cyan),
        ]);

    for t in &templates {
        table.add_row(vec![
            Cell::new(&t.id),
            Cell::new(&t.version),
            Cell::new(&t.title),
            Cell::new(t.steps.len()),
            Cell::new(t.hash.get(..12).unwrap_or(&t.hash)),
        ]);
    }

    println!("{table}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(id: &str, version: Option<&str>, state: &AppState, json: bool) -> Result<()> {
    let registry = state.engine.registry();
    let template = match version {
        Some(v) => registry.get_template_version(id, v).await,
        None => registry.get_template(id).await,
    }
    .map_err(|e| engine_error(e.into()))?
    .ok_or_else(|| {
        engine_error(WorkflowError::TemplateNotFound {
            id: id.to_string(),
            version: version.map(str::to_string),
        })
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&template)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} {}",
        style(&template.title).bold(),
        style(&template.id).cyan(),
        style(&template.version).dim()
    );
    if let Some(desc) = &template.description {
        println!("  {desc}");
    }
    println!("  Hash: {}", style(&template.hash).dim());
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Title").fg(Color::Cyan),
            Cell::new("Depends on").fg(Color::Cyan),
            Cell::new("Required flags").fg(Color::Cyan),
        ]);

    for step in &template.steps {
        let deps: Vec<&str> = step.depends_on.iter().map(String::as_str).collect();
        let flags: Vec<&str> = step
            .validation
            .required_flags
            .iter()
            .map(String::as_str)
            .collect();
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.title),
            Cell::new(deps.join(", ")),
            Cell::new(flags.join(", ")),
        ]);
    }

    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_load_succeeds() {
        let report = LoadReport {
            registered: vec![("two-step".into(), "1.0.0".into())],
            unchanged: vec![("review".into(), "1.0.0".into())],
            ignored_changed: vec![("review".into(), "0.9.0".into())],
            ..LoadReport::default()
        };
        assert!(ensure_nothing_rejected(&report).is_ok());
    }

    #[test]
    fn test_rejected_template_fails_the_load() {
        let report = LoadReport {
            registered: vec![("two-step".into(), "1.0.0".into())],
            rejected: vec![(
                "cyclic.yaml".into(),
                "dependency cycle between steps: a, b".into(),
            )],
            ..LoadReport::default()
        };
        let err = ensure_nothing_rejected(&report).unwrap_err();
        assert_eq!(err.to_string(), "bad request");
        assert!(err.root_cause().to_string().contains("dependency cycle"));
    }

    #[test]
    fn test_several_rejections_are_counted() {
        let report = LoadReport {
            rejected: vec![
                ("a.yaml".into(), "missing title".into()),
                ("b.yaml".into(), "no steps".into()),
            ],
            ..LoadReport::default()
        };
        let err = ensure_nothing_rejected(&report).unwrap_err();
        assert!(err.root_cause().to_string().contains("2 templates rejected"));
    }
}
