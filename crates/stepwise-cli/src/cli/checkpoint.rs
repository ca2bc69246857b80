//! Checkpoint subcommands for the stepwise CLI.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepwise_types::checkpoint::CreateCheckpointRequest;

use crate::cli::{engine_error, parse_step_data, validate_workflow_id};
use crate::state::AppState;

/// Checkpoint subcommands.
#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// Record a checkpoint against a step
    Create {
        /// Workflow id
        id: String,

        /// Step id
        step: String,

        /// Checkpoint data as a JSON object
        #[arg(long)]
        data: Option<String>,

        /// Free-form notes
        #[arg(long, default_value = "")]
        notes: String,

        /// Idempotency key; repeating it returns the original checkpoint
        #[arg(long)]
        request_id: Option<String>,

        /// Also complete the step, merging the data as its outputs
        #[arg(long)]
        complete: bool,
    },

    /// List a workflow's checkpoints
    List {
        /// Workflow id
        id: String,
    },
}

pub async fn handle_checkpoint_command(
    cmd: CheckpointCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        CheckpointCommand::Create {
            id,
            step,
            data,
            notes,
            request_id,
            complete,
        } => {
            validate_workflow_id(&id)?;
            let data = parse_step_data("--data", data.as_deref())?;
            let mut request = CreateCheckpointRequest::new(step, data, notes);
            if let Some(request_id) = request_id {
                request = request.with_request_id(request_id);
            }
            if complete {
                request = request.completing();
            }
            handle_create(&id, request, state, json).await
        }
        CheckpointCommand::List { id } => handle_list(&id, state, json).await,
    }
}

async fn handle_create(
    id: &str,
    request: CreateCheckpointRequest,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let completing = request.complete_step;
    let outcome = state
        .engine
        .record_checkpoint(id, request)
        .await
        .map_err(engine_error)?;
    let created = outcome.is_created();
    let checkpoint = outcome.into_checkpoint();

    if json {
        let out = serde_json::json!({
            "checkpoint": checkpoint,
            "created": created,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if created {
        println!(
            "  {} Checkpoint #{} on step {}",
            style("*").green().bold(),
            checkpoint.sequence,
            style(&checkpoint.step_id).cyan()
        );
    } else {
        println!(
            "  {} Checkpoint #{} on step {} already recorded for this request; nothing written",
            style("=").dim(),
            checkpoint.sequence,
            style(&checkpoint.step_id).cyan()
        );
    }
    println!("  ID: {}", checkpoint.id);
    if let Some(request_id) = &checkpoint.source_request_id {
        println!("  Request: {}", style(request_id).dim());
    }
    if completing && created {
        println!("  Step completed in the same commit");
    }
    println!();
    Ok(())
}

async fn handle_list(id: &str, state: &AppState, json: bool) -> Result<()> {
    validate_workflow_id(id)?;
    let checkpoints = state
        .engine
        .list_checkpoints(id)
        .await
        .map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!();
        println!("  {}", style("No checkpoints recorded.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Timestamp").fg(Color::Cyan),
            Cell::new("Notes").fg(Color::Cyan),
            Cell::new("Request").fg(Color::Cyan),
        ]);

    for cp in &checkpoints {
        table.add_row(vec![
            Cell::new(cp.sequence),
            Cell::new(&cp.step_id),
            Cell::new(cp.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(&cp.notes),
            Cell::new(cp.source_request_id.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    Ok(())
}
