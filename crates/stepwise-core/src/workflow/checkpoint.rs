//! Checkpoints: idempotent progress snapshots recorded against a step.
//!
//! A checkpoint carrying a `source_request_id` is written at most once per
//! workflow; repeating the request returns the stored checkpoint unchanged.
//! With `complete_step` set, the checkpoint and the step completion are one
//! commit.

use chrono::Utc;
use stepwise_types::checkpoint::{
    CheckpointInsert, CreateCheckpointRequest, NewCheckpoint, WorkflowCheckpoint,
};
use stepwise_types::error::{RepositoryError, WorkflowError};
use tracing::debug;
use uuid::Uuid;

use crate::repository::template::TemplateRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::service::hash::ContentHasher;
use crate::workflow::engine::{WorkflowEngine, log_completion, plan_completion};

impl<W, T, H> WorkflowEngine<W, T, H>
where
    W: WorkflowRepository,
    T: TemplateRepository,
    H: ContentHasher,
{
    /// Record a checkpoint, optionally completing its step in the same commit.
    ///
    /// A repeated `source_request_id` returns the original checkpoint without
    /// writing anything, whatever the workflow's current status.
    pub async fn create_checkpoint(
        &self,
        workflow_id: &str,
        request: CreateCheckpointRequest,
    ) -> Result<WorkflowCheckpoint, WorkflowError> {
        self.record_checkpoint(workflow_id, request)
            .await
            .map(CheckpointInsert::into_checkpoint)
    }

    /// Same as [`create_checkpoint`](Self::create_checkpoint), but tells a
    /// fresh write apart from a replayed request.
    ///
    /// `Existing` means nothing was written, including any step completion
    /// the request asked for.
    pub async fn record_checkpoint(
        &self,
        workflow_id: &str,
        request: CreateCheckpointRequest,
    ) -> Result<CheckpointInsert, WorkflowError> {
        let _lock = self.lock_workflow(workflow_id).await;

        if let Some(request_id) = &request.source_request_id {
            if let Some(existing) = self
                .workflows()
                .find_checkpoint_by_request(workflow_id, request_id)
                .await?
            {
                debug!(
                    workflow_id = %workflow_id,
                    request_id = %request_id,
                    checkpoint_id = %existing.id,
                    "Checkpoint replayed"
                );
                return Ok(CheckpointInsert::Existing(existing));
            }
        }

        let ctx = self.load_context(workflow_id).await?;
        if ctx.template.step(&request.step_id).is_none() {
            return Err(WorkflowError::StepNotEligible {
                step_id: request.step_id,
                reason: format!("template '{}' has no such step", ctx.template.id),
            });
        }

        let now = Utc::now();
        let checkpoint = NewCheckpoint {
            id: Uuid::now_v7().to_string(),
            workflow_id: workflow_id.to_string(),
            step_id: request.step_id.clone(),
            timestamp: now,
            data: request.data.clone(),
            notes: request.notes,
            source_request_id: request.source_request_id.clone(),
        };

        if !request.complete_step {
            let stored = self.workflows().insert_checkpoint(&checkpoint).await?;
            if let CheckpointInsert::Created(cp) = &stored {
                debug!(
                    workflow_id = %workflow_id,
                    step_id = %cp.step_id,
                    sequence = cp.sequence,
                    "Checkpoint recorded"
                );
            }
            return Ok(stored);
        }

        let mut commit = plan_completion(&ctx, &request.step_id, request.data, now)?;
        commit.checkpoint = Some(checkpoint);

        match self.workflows().commit(&commit).await {
            Ok(Some(stored)) => {
                log_completion(&commit);
                debug!(
                    workflow_id = %workflow_id,
                    step_id = %stored.step_id,
                    sequence = stored.sequence,
                    "Checkpoint recorded with step completion"
                );
                Ok(CheckpointInsert::Created(stored))
            }
            Ok(None) => Err(WorkflowError::Storage(
                "commit did not return the checkpoint it carried".to_string(),
            )),
            Err(RepositoryError::Conflict(msg)) => {
                // Another writer may have stored the same request in between.
                if let Some(request_id) = &request.source_request_id {
                    if let Some(existing) = self
                        .workflows()
                        .find_checkpoint_by_request(workflow_id, request_id)
                        .await?
                    {
                        return Ok(CheckpointInsert::Existing(existing));
                    }
                }
                Err(WorkflowError::Conflict(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checkpoints of a workflow, ordered by sequence.
    pub async fn list_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowCheckpoint>, WorkflowError> {
        self.require_workflow(workflow_id).await?;
        Ok(self.workflows().list_checkpoints(workflow_id).await?)
    }
}
