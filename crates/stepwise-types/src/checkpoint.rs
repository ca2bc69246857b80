//! Checkpoint types: durable, idempotent progress snapshots for a step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::StepData;

/// A stored progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    /// UUIDv7.
    pub id: String,
    pub workflow_id: String,
    pub step_id: String,
    /// Monotonic per workflow, starting at 1.
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub data: StepData,
    #[serde(default)]
    pub notes: String,
    /// Caller idempotency key; unique per workflow when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
}

/// A checkpoint about to be written. The store assigns `sequence`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckpoint {
    pub id: String,
    pub workflow_id: String,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: StepData,
    pub notes: String,
    pub source_request_id: Option<String>,
}

/// Outcome of an insert-or-read checkpoint write.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointInsert {
    /// A new row was written.
    Created(WorkflowCheckpoint),
    /// A row with the same `source_request_id` already existed; returned verbatim.
    Existing(WorkflowCheckpoint),
}

impl CheckpointInsert {
    pub fn into_checkpoint(self) -> WorkflowCheckpoint {
        match self {
            CheckpointInsert::Created(cp) | CheckpointInsert::Existing(cp) => cp,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CheckpointInsert::Created(_))
    }
}

/// Parameters for `create_checkpoint`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCheckpointRequest {
    pub step_id: String,
    #[serde(default)]
    pub data: StepData,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub source_request_id: Option<String>,
    /// Also complete `step_id` with `data` as its outputs, atomically.
    #[serde(default)]
    pub complete_step: bool,
}

impl CreateCheckpointRequest {
    pub fn new(step_id: impl Into<String>, data: StepData, notes: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            data,
            notes: notes.into(),
            source_request_id: None,
            complete_step: false,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.source_request_id = Some(request_id.into());
        self
    }

    pub fn completing(mut self) -> Self {
        self.complete_step = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> WorkflowCheckpoint {
        WorkflowCheckpoint {
            id: id.to_string(),
            workflow_id: "wf_1_abc".to_string(),
            step_id: "step1".to_string(),
            sequence: 1,
            timestamp: Utc::now(),
            data: StepData::new(),
            notes: String::new(),
            source_request_id: None,
        }
    }

    #[test]
    fn test_checkpoint_insert_accessors() {
        let created = CheckpointInsert::Created(sample("a"));
        assert!(created.is_created());
        assert_eq!(created.into_checkpoint().id, "a");

        let existing = CheckpointInsert::Existing(sample("b"));
        assert!(!existing.is_created());
        assert_eq!(existing.into_checkpoint().id, "b");
    }

    #[test]
    fn test_request_builder() {
        let req = CreateCheckpointRequest::new("step1", StepData::new(), "halfway")
            .with_request_id("req-123")
            .completing();
        assert_eq!(req.source_request_id.as_deref(), Some("req-123"));
        assert!(req.complete_step);
        assert_eq!(req.notes, "halfway");
    }

    #[test]
    fn test_checkpoint_skips_missing_request_id() {
        let json = serde_json::to_string(&sample("a")).unwrap();
        assert!(!json.contains("source_request_id"));
    }
}
