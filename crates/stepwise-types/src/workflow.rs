//! Workflow instance types.
//!
//! A `Workflow` is one running instance of a template. Its per-step progress
//! lives in `WorkflowStep` rows; its status follows the state machine in
//! `stepwise-core::workflow::state_machine`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::StepDefinition;

/// Accumulated key/value data of a workflow.
pub type StepData = serde_json::Map<String, serde_json::Value>;

/// Reserved `step_data` key holding the reason passed to `fail`.
pub const FAILURE_REASON_KEY: &str = "failureReason";

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Completed and failed workflows accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(WorkflowStatus::Active),
            "paused" => Ok(WorkflowStatus::Paused),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            _ => Err(format!("invalid workflow status: '{s}'")),
        }
    }
}

/// Progress status of one step within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Active => "active",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "active" => Ok(StepStatus::Active),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(format!("invalid step status: '{s}'")),
        }
    }
}

/// Operator-requested control action.
///
/// Parsing is case-insensitive (`"PAUSE"`, `"Pause"` and `"pause"` are equal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Pause,
    Resume,
    Fail,
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowAction::Pause => f.write_str("pause"),
            WorkflowAction::Resume => f.write_str("resume"),
            WorkflowAction::Fail => f.write_str("fail"),
        }
    }
}

impl FromStr for WorkflowAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(WorkflowAction::Pause),
            "resume" => Ok(WorkflowAction::Resume),
            "fail" => Ok(WorkflowAction::Fail),
            _ => Err(format!(
                "invalid action '{s}' (expected pause, resume or fail)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A running (or finished) workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// `wf_<unix-millis>_<random>`.
    pub id: String,
    pub template_id: String,
    pub template_version: String,
    /// Pins the exact step graph the workflow was started against.
    pub template_hash: String,
    pub status: WorkflowStatus,
    /// The step `next_step` would hand out; `None` once every step is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    pub step_data: StepData,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every committed mutation (optimistic concurrency).
    pub revision: i64,
}

/// Per-workflow progress row for one template step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// UUIDv7.
    pub id: String,
    pub workflow_id: String,
    /// References `StepDefinition.id`.
    pub step_id: String,
    pub status: StepStatus,
    /// 1-based position in template declaration order.
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outputs: StepData,
}

/// Read-only snapshot returned by `get_workflow_state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub template_id: String,
    pub template_version: String,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    pub step_data: StepData,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowState {
    fn from(wf: &Workflow) -> Self {
        Self {
            workflow_id: wf.id.clone(),
            template_id: wf.template_id.clone(),
            template_version: wf.template_version.clone(),
            status: wf.status,
            current_step_id: wf.current_step_id.clone(),
            step_data: wf.step_data.clone(),
            created_by: wf.created_by.clone(),
            created_at: wf.created_at,
            updated_at: wf.updated_at,
        }
    }
}

/// Completion progress of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// `round(100 * completed / total)`.
    pub percentage: u8,
    pub completed: usize,
    pub total: usize,
}

/// Answer to "what should run next?".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextStep {
    /// Lowest-sequence eligible step, if any.
    pub step: Option<StepDefinition>,
    pub is_complete: bool,
    /// No step is eligible although some step is not completed.
    pub stalled: bool,
    pub progress: Progress,
}

/// Parameters for starting a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    pub template_id: String,
    /// Exact version to run; latest registered version when `None`.
    #[serde(default)]
    pub template_version: Option<String>,
    #[serde(default)]
    pub initial_data: StepData,
    pub created_by: String,
}

impl StartWorkflowRequest {
    /// Start the latest version of `template_id`.
    pub fn new(template_id: impl Into<String>, initial_data: StepData, created_by: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            template_version: None,
            initial_data,
            created_by: created_by.into(),
        }
    }

    /// Pin a specific template version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.template_version = Some(version.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_status_serde_matches_as_str() {
        for status in [
            WorkflowStatus::Active,
            WorkflowStatus::Paused,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<WorkflowStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::Active.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
    }

    #[test]
    fn test_step_status_roundtrip() {
        for status in [
            StepStatus::Pending,
            StepStatus::Active,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<StepStatus>().unwrap(), status);
        }
        assert!("done".parse::<StepStatus>().is_err());
    }

    #[test]
    fn test_action_parse_is_case_insensitive() {
        assert_eq!("PAUSE".parse::<WorkflowAction>().unwrap(), WorkflowAction::Pause);
        assert_eq!("Resume".parse::<WorkflowAction>().unwrap(), WorkflowAction::Resume);
        assert_eq!(" fail ".parse::<WorkflowAction>().unwrap(), WorkflowAction::Fail);
        let err = "cancel".parse::<WorkflowAction>().unwrap_err();
        assert!(err.contains("invalid action"));
    }

    #[test]
    fn test_start_request_builder() {
        let req = StartWorkflowRequest::new("onboarding", StepData::new(), "ops")
            .with_version("2.0.0");
        assert_eq!(req.template_version.as_deref(), Some("2.0.0"));
        assert_eq!(req.created_by, "ops");
    }
}
