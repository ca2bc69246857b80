//! Workflow repository trait definition.
//!
//! Defines the storage interface for the workflow aggregate: the workflow
//! row, its per-step progress rows, and its checkpoints. The infrastructure
//! layer (stepwise-infra) implements this trait with SQLite persistence.

use chrono::{DateTime, Utc};
use stepwise_types::checkpoint::{CheckpointInsert, NewCheckpoint, WorkflowCheckpoint};
use stepwise_types::error::RepositoryError;
use stepwise_types::workflow::{StepData, Workflow, WorkflowStatus, WorkflowStep};

/// A step being marked completed as part of a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub step_id: String,
    pub completed_at: DateTime<Utc>,
    pub outputs: StepData,
}

/// One atomic mutation of a workflow aggregate.
///
/// `workflow` carries the new state and the revision it was derived from;
/// the store rejects the commit with `RepositoryError::Conflict` when the
/// stored revision differs, when `completed_step` is no longer pending, or
/// when `checkpoint.source_request_id` already exists.
#[derive(Debug, Clone)]
pub struct WorkflowCommit {
    pub workflow: Workflow,
    pub completed_step: Option<StepCompletion>,
    pub checkpoint: Option<NewCheckpoint>,
}

/// Repository trait for workflow persistence.
///
/// Covers three entity families:
/// - **Workflows:** create, read, and revision-checked updates.
/// - **Steps:** per-step progress rows created with the workflow.
/// - **Checkpoints:** idempotent progress snapshots.
///
/// Every method that writes more than one row does so in one transaction.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Create a workflow together with all of its step rows.
    fn create_workflow(
        &self,
        workflow: &Workflow,
        steps: &[WorkflowStep],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow by id.
    fn get_workflow(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List workflows, newest first, optionally filtered by status.
    fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Apply a commit atomically. Returns the stored checkpoint when the
    /// commit carried one.
    fn commit(
        &self,
        commit: &WorkflowCommit,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowCheckpoint>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// List a workflow's step rows ordered by sequence.
    fn list_steps(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowStep>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Insert a checkpoint, or return the existing one carrying the same
    /// `(workflow_id, source_request_id)`. Insert and read happen in one
    /// transaction.
    fn insert_checkpoint(
        &self,
        checkpoint: &NewCheckpoint,
    ) -> impl std::future::Future<Output = Result<CheckpointInsert, RepositoryError>> + Send;

    /// Find a checkpoint by its idempotency key.
    fn find_checkpoint_by_request(
        &self,
        workflow_id: &str,
        source_request_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowCheckpoint>, RepositoryError>> + Send;

    /// List a workflow's checkpoints ordered by sequence.
    fn list_checkpoints(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowCheckpoint>, RepositoryError>> + Send;
}
