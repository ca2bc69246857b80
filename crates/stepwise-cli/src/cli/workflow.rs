//! Workflow subcommands for the stepwise CLI.
//!
//! Provides `stepwise workflow start|status|next|complete|action|list|steps`.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepwise_types::workflow::{
    NextStep, StartWorkflowRequest, StepStatus, WorkflowAction, WorkflowState, WorkflowStatus,
};

use crate::cli::{engine_error, parse_step_data, validate_workflow_id};
use crate::state::AppState;

/// Workflow subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Start a workflow from a template
    Start {
        /// Template id
        template: String,

        /// Pin a template version (defaults to the latest)
        #[arg(long)]
        template_version: Option<String>,

        /// Initial step data as a JSON object
        #[arg(long)]
        data: Option<String>,

        /// Who is starting the workflow
        #[arg(long, default_value = "cli")]
        created_by: String,
    },

    /// Show a workflow's state
    Status {
        /// Workflow id
        id: String,
    },

    /// Show the next eligible step and progress
    Next {
        /// Workflow id
        id: String,
    },

    /// Complete an eligible step
    Complete {
        /// Workflow id
        id: String,

        /// Step id
        step: String,

        /// Step outputs as a JSON object
        #[arg(long)]
        outputs: Option<String>,
    },

    /// Pause, resume, or fail a workflow
    Action {
        /// Workflow id
        id: String,

        /// pause, resume, or fail (case-insensitive)
        action: WorkflowAction,

        /// Failure reason (recorded for fail)
        #[arg(long)]
        reason: Option<String>,
    },

    /// List workflows, newest first
    List {
        /// Filter by status (active, paused, completed, failed)
        #[arg(long)]
        status: Option<WorkflowStatus>,

        /// Maximum rows (defaults to the configured list limit)
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show per-step progress of a workflow
    Steps {
        /// Workflow id
        id: String,
    },
}

pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Start {
            template,
            template_version,
            data,
            created_by,
        } => {
            handle_start(&template, template_version, data.as_deref(), created_by, state, json)
                .await
        }
        WorkflowCommand::Status { id } => handle_status(&id, state, json).await,
        WorkflowCommand::Next { id } => handle_next(&id, state, json).await,
        WorkflowCommand::Complete { id, step, outputs } => {
            handle_complete(&id, &step, outputs.as_deref(), state, json).await
        }
        WorkflowCommand::Action { id, action, reason } => {
            handle_action(&id, action, reason, state, json).await
        }
        WorkflowCommand::List { status, limit } => handle_list(status, limit, state, json).await,
        WorkflowCommand::Steps { id } => handle_steps(&id, state, json).await,
    }
}

fn styled_status(status: WorkflowStatus) -> console::StyledObject<&'static str> {
    match status {
        WorkflowStatus::Active => style(status.as_str()).green(),
        WorkflowStatus::Paused => style(status.as_str()).yellow(),
        WorkflowStatus::Completed => style(status.as_str()).cyan(),
        WorkflowStatus::Failed => style(status.as_str()).red(),
    }
}

fn print_state(state: &WorkflowState) {
    println!("  ID:       {}", style(&state.workflow_id).cyan());
    println!(
        "  Template: {} {}",
        state.template_id,
        style(&state.template_version).dim()
    );
    println!("  Status:   {}", styled_status(state.status));
    println!(
        "  Current:  {}",
        state.current_step_id.as_deref().unwrap_or("-")
    );
    println!("  Created:  {} by {}", state.created_at.format("%Y-%m-%d %H:%M:%S"), state.created_by);
    println!("  Updated:  {}", state.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if !state.step_data.is_empty() {
        println!("  Data:     {}", serde_json::Value::Object(state.step_data.clone()));
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

async fn handle_start(
    template_id: &str,
    version: Option<String>,
    data: Option<&str>,
    created_by: String,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let initial_data = parse_step_data("--data", data)?;
    let mut request = StartWorkflowRequest::new(template_id, initial_data, created_by);
    if let Some(version) = version {
        request = request.with_version(version);
    }

    let workflow = state
        .engine
        .start_workflow(request)
        .await
        .map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Started workflow {}",
        style("*").green().bold(),
        style(&workflow.id).cyan()
    );
    println!(
        "  Template: {} {}",
        workflow.template_id,
        style(&workflow.template_version).dim()
    );
    if let Some(step) = &workflow.current_step_id {
        println!("  First step: {}", style(step).bold());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn handle_status(id: &str, state: &AppState, json: bool) -> Result<()> {
    validate_workflow_id(id)?;
    let wf_state = state
        .engine
        .get_workflow_state(id)
        .await
        .map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf_state)?);
        return Ok(());
    }

    println!();
    print_state(&wf_state);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

async fn handle_next(id: &str, state: &AppState, json: bool) -> Result<()> {
    validate_workflow_id(id)?;
    let next = state.engine.get_next_step(id).await.map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&next)?);
        return Ok(());
    }

    print_next(&next);
    Ok(())
}

fn print_next(next: &NextStep) {
    println!();
    println!(
        "  Progress: {}% ({}/{} steps)",
        next.progress.percentage, next.progress.completed, next.progress.total
    );
    if next.is_complete {
        println!("  {} All steps completed", style("*").green().bold());
    } else if let Some(step) = &next.step {
        println!("  Next:     {} {}", style(&step.id).cyan().bold(), step.title);
        if let Some(desc) = &step.description {
            println!("            {}", style(desc).dim());
        }
        for action in &step.actions {
            println!("            - {action}");
        }
        if !step.validation.required_flags.is_empty() {
            let flags: Vec<&str> = step
                .validation
                .required_flags
                .iter()
                .map(String::as_str)
                .collect();
            println!("  Requires: {}", flags.join(", "));
        }
    } else if next.stalled {
        println!(
            "  {} No step is eligible; the workflow is stalled",
            style("!").yellow().bold()
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Complete
// ---------------------------------------------------------------------------

async fn handle_complete(
    id: &str,
    step_id: &str,
    outputs: Option<&str>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    validate_workflow_id(id)?;
    let outputs = parse_step_data("--outputs", outputs)?;
    let wf_state = state
        .engine
        .complete_step(id, step_id, outputs)
        .await
        .map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf_state)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Completed step {}",
        style("*").green().bold(),
        style(step_id).cyan()
    );
    print_state(&wf_state);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

async fn handle_action(
    id: &str,
    action: WorkflowAction,
    reason: Option<String>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    validate_workflow_id(id)?;
    let wf_state = state
        .engine
        .apply_action(id, action, reason)
        .await
        .map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf_state)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow {} is {}",
        style("*").green().bold(),
        style(id).cyan(),
        styled_status(wf_state.status)
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(
    status: Option<WorkflowStatus>,
    limit: Option<u32>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(state.config.default_list_limit);
    let workflows = state
        .engine
        .list_workflows(status, limit)
        .await
        .map_err(engine_error)?;

    if json {
        let out: Vec<WorkflowState> = workflows.iter().map(WorkflowState::from).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  {}", style("No workflows found.").dim());
        println!(
            "  {}",
            style("Start one with 'stepwise workflow start <template>'").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Template").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Current step").fg(Color::Cyan),
            Cell::new("Updated").fg(Color::Cyan),
        ]);

    for wf in &workflows {
        let status_color = match wf.status {
            WorkflowStatus::Active => Color::Green,
            WorkflowStatus::Paused => Color::Yellow,
            WorkflowStatus::Completed => Color::Cyan,
            WorkflowStatus::Failed => Color::Red,
        };
        table.add_row(vec![
            Cell::new(&wf.id),
            Cell::new(format!("{} {}", wf.template_id, wf.template_version)),
            Cell::new(wf.status.as_str()).fg(status_color),
            Cell::new(wf.current_step_id.as_deref().unwrap_or("-")),
            Cell::new(wf.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

async fn handle_steps(id: &str, state: &AppState, json: bool) -> Result<()> {
    validate_workflow_id(id)?;
    let steps = state.engine.list_steps(id).await.map_err(engine_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Completed at").fg(Color::Cyan),
        ]);

    for step in &steps {
        let status_cell = match step.status {
            StepStatus::Completed => Cell::new(step.status.to_string()).fg(Color::Green),
            _ => Cell::new(step.status.to_string()),
        };
        table.add_row(vec![
            Cell::new(step.sequence),
            Cell::new(&step.step_id),
            status_cell,
            Cell::new(
                step.completed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!("{table}");
    Ok(())
}
