//! CLI command definitions and shared argument handling.

pub mod checkpoint;
pub mod template;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stepwise_types::error::{ErrorKind, WorkflowError};
use stepwise_types::workflow::StepData;

/// Stepwise - durable multi-step workflow engine.
#[derive(Parser)]
#[command(name = "stepwise", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding config.toml, the database, and templates
    #[arg(long, global = true, env = "STEPWISE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage workflow templates
    Template {
        #[command(subcommand)]
        command: template::TemplateCommand,
    },

    /// Start, inspect, and drive workflows
    Workflow {
        #[command(subcommand)]
        command: workflow::WorkflowCommand,
    },

    /// Record and list workflow checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: checkpoint::CheckpointCommand,
    },
}

const MAX_WORKFLOW_ID_LEN: usize = 128;

/// Short label for an error kind, used as the error context line.
pub fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not found",
        ErrorKind::Unprocessable => "unprocessable",
        ErrorKind::BadRequest => "bad request",
        ErrorKind::Internal => "internal error",
    }
}

/// Wrap an engine error so the CLI reports its kind first.
pub fn engine_error(err: WorkflowError) -> anyhow::Error {
    let label = kind_label(err.kind());
    anyhow::Error::new(err).context(label)
}

/// Reject workflow ids that could never have been generated.
pub fn validate_workflow_id(id: &str) -> anyhow::Result<()> {
    let well_formed = !id.is_empty()
        && id.len() <= MAX_WORKFLOW_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(engine_error(WorkflowError::InvalidRequest(format!(
            "malformed workflow id '{id}'"
        ))))
    }
}

/// Parse a `--data`/`--outputs` argument. Absent means an empty object.
pub fn parse_step_data(flag: &str, raw: Option<&str>) -> anyhow::Result<StepData> {
    let Some(raw) = raw else {
        return Ok(StepData::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(engine_error(WorkflowError::InvalidRequest(format!(
            "{flag} must be a JSON object"
        )))),
        Err(e) => Err(engine_error(WorkflowError::InvalidRequest(format!(
            "{flag} is not valid JSON: {e}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_accepts_generated_ids() {
        validate_workflow_id("wf_1760000000000_a1b2c3d4e").unwrap();
        validate_workflow_id("custom-id-7").unwrap();
    }

    #[test]
    fn test_rejects_malformed_ids() {
        let too_long = "x".repeat(MAX_WORKFLOW_ID_LEN + 1);
        for id in ["", "wf 1", "../etc", "wf;drop", too_long.as_str()] {
            let err = validate_workflow_id(id).unwrap_err();
            assert_eq!(err.to_string(), "bad request", "id {id:?}");
        }
    }

    #[test]
    fn test_parse_step_data_object() {
        let data = parse_step_data("--data", Some(r#"{"approved": true, "n": 2}"#)).unwrap();
        assert_eq!(data.get("approved"), Some(&serde_json::json!(true)));
        assert_eq!(data.get("n"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_parse_step_data_absent_is_empty() {
        assert!(parse_step_data("--data", None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_step_data_rejects_non_objects() {
        for raw in ["[1, 2]", "\"text\"", "{not json"] {
            let err = parse_step_data("--outputs", Some(raw)).unwrap_err();
            assert_eq!(err.to_string(), "bad request");
            let cause = err.root_cause().to_string();
            assert!(cause.contains("--outputs"), "{cause}");
        }
    }

    #[test]
    fn test_start_pins_template_version() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "workflow",
            "start",
            "two-step",
            "--template-version",
            "1.0.0",
        ])
        .unwrap();
        match cli.command {
            Commands::Workflow {
                command:
                    workflow::WorkflowCommand::Start {
                        template,
                        template_version,
                        created_by,
                        ..
                    },
            } => {
                assert_eq!(template, "two-step");
                assert_eq!(template_version.as_deref(), Some("1.0.0"));
                assert_eq!(created_by, "cli");
            }
            _ => panic!("expected workflow start"),
        }
    }

    #[test]
    fn test_start_without_version_uses_latest() {
        let cli = Cli::try_parse_from(["stepwise", "workflow", "start", "two-step"]).unwrap();
        match cli.command {
            Commands::Workflow {
                command: workflow::WorkflowCommand::Start { template_version, .. },
            } => assert!(template_version.is_none()),
            _ => panic!("expected workflow start"),
        }
    }

    #[test]
    fn test_template_show_pins_version() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "template",
            "show",
            "review",
            "--template-version",
            "2.0.0",
        ])
        .unwrap();
        match cli.command {
            Commands::Template {
                command: template::TemplateCommand::Show { id, template_version },
            } => {
                assert_eq!(id, "review");
                assert_eq!(template_version.as_deref(), Some("2.0.0"));
            }
            _ => panic!("expected template show"),
        }
    }

    #[test]
    fn test_version_flag_still_reports_binary_version() {
        for args in [
            vec!["stepwise", "--version"],
            vec!["stepwise", "workflow", "start", "--version"],
        ] {
            let err = Cli::try_parse_from(args).err().unwrap();
            assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        }
    }

    #[test]
    fn test_action_parses_case_insensitively() {
        let cli = Cli::try_parse_from(["stepwise", "workflow", "action", "wf_1", "PAUSE"]).unwrap();
        match cli.command {
            Commands::Workflow {
                command: workflow::WorkflowCommand::Action { action, .. },
            } => assert_eq!(action, stepwise_types::workflow::WorkflowAction::Pause),
            _ => panic!("expected workflow action"),
        }
    }
}
