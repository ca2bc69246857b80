//! The workflow engine.
//!
//! `WorkflowEngine` owns no authoritative state: every operation reads the
//! workflow aggregate from the repository, decides, and writes one atomic
//! commit. Mutations of one workflow are serialized by a per-workflow async
//! mutex; the repository's revision check rejects commits from anyone else
//! that read a stale state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use stepwise_types::error::WorkflowError;
use stepwise_types::template::WorkflowTemplate;
use stepwise_types::workflow::{
    FAILURE_REASON_KEY, StartWorkflowRequest, StepData, StepStatus, Workflow, WorkflowAction,
    WorkflowState, WorkflowStatus, WorkflowStep,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::repository::template::TemplateRepository;
use crate::repository::workflow::{StepCompletion, WorkflowCommit, WorkflowRepository};
use crate::service::hash::ContentHasher;
use crate::workflow::scheduler;
use crate::workflow::state_machine::{self, Transition};
use crate::workflow::template::TemplateRegistry;

/// Generate a workflow id: `wf_<unix-millis>_<9 random hex chars>`.
pub fn generate_workflow_id(now: DateTime<Utc>) -> String {
    let random = Uuid::now_v7().simple().to_string();
    format!("wf_{}_{}", now.timestamp_millis(), &random[random.len() - 9..])
}

// ---------------------------------------------------------------------------
// Per-workflow locking
// ---------------------------------------------------------------------------

/// Holds a workflow's mutex; removes the map entry on drop once unused.
pub(crate) struct WorkflowLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    workflow_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WorkflowLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.workflow_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// A workflow together with its pinned template and step rows.
pub(crate) struct WorkflowContext {
    pub workflow: Workflow,
    pub template: WorkflowTemplate,
    pub steps: Vec<WorkflowStep>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs workflows against a `WorkflowRepository` and a `TemplateRegistry`.
///
/// Generic over its repositories and hasher so that stepwise-core never
/// depends on stepwise-infra. Independent engines bound to the same store
/// observe the same workflows.
pub struct WorkflowEngine<W: WorkflowRepository, T: TemplateRepository, H: ContentHasher> {
    workflows: W,
    registry: TemplateRegistry<T, H>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<W, T, H> WorkflowEngine<W, T, H>
where
    W: WorkflowRepository,
    T: TemplateRepository,
    H: ContentHasher,
{
    pub fn new(workflows: W, registry: TemplateRegistry<T, H>) -> Self {
        Self {
            workflows,
            registry,
            locks: DashMap::new(),
        }
    }

    /// Access the template registry.
    pub fn registry(&self) -> &TemplateRegistry<T, H> {
        &self.registry
    }

    /// Access the workflow repository.
    pub fn workflows(&self) -> &W {
        &self.workflows
    }

    /// Number of workflows with a live lock entry.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub(crate) async fn lock_workflow(&self, workflow_id: &str) -> WorkflowLock<'_> {
        let mutex = self
            .locks
            .entry(workflow_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        WorkflowLock {
            locks: &self.locks,
            workflow_id: workflow_id.to_string(),
            guard: Some(guard),
        }
    }

    // --- Loading ---

    pub(crate) async fn require_workflow(&self, workflow_id: &str) -> Result<Workflow, WorkflowError> {
        self.workflows
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// The exact template a workflow was started on, with its hash re-checked.
    async fn pinned_template(&self, workflow: &Workflow) -> Result<WorkflowTemplate, WorkflowError> {
        let template = self
            .registry
            .get_template_version(&workflow.template_id, &workflow.template_version)
            .await?
            .ok_or_else(|| WorkflowError::TemplateNotFound {
                id: workflow.template_id.clone(),
                version: Some(workflow.template_version.clone()),
            })?;
        self.verify_template(&template, &workflow.template_hash)?;
        Ok(template)
    }

    fn verify_template(&self, template: &WorkflowTemplate, expected: &str) -> Result<(), WorkflowError> {
        let actual = self
            .registry
            .step_graph_hash(&template.steps)
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        if actual != expected || template.hash != expected {
            return Err(WorkflowError::TemplateIntegrity {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    pub(crate) async fn load_context(&self, workflow_id: &str) -> Result<WorkflowContext, WorkflowError> {
        let workflow = self.require_workflow(workflow_id).await?;
        let template = self.pinned_template(&workflow).await?;
        let steps = self.workflows.list_steps(workflow_id).await?;
        Ok(WorkflowContext {
            workflow,
            template,
            steps,
        })
    }

    // --- Lifecycle ---

    /// Start a new workflow from the latest (or a pinned) template version.
    ///
    /// Creates one pending step row per template step, in declaration order.
    pub async fn start_workflow(&self, request: StartWorkflowRequest) -> Result<Workflow, WorkflowError> {
        let template = match &request.template_version {
            Some(version) => {
                self.registry
                    .get_template_version(&request.template_id, version)
                    .await?
            }
            None => self.registry.get_template(&request.template_id).await?,
        }
        .ok_or_else(|| WorkflowError::TemplateNotFound {
            id: request.template_id.clone(),
            version: request.template_version.clone(),
        })?;
        self.verify_template(&template, &template.hash)?;

        let now = Utc::now();
        let workflow_id = generate_workflow_id(now);
        let steps: Vec<WorkflowStep> = template
            .steps
            .iter()
            .enumerate()
            .map(|(i, def)| WorkflowStep {
                id: Uuid::now_v7().to_string(),
                workflow_id: workflow_id.clone(),
                step_id: def.id.clone(),
                status: StepStatus::Pending,
                sequence: i as i64 + 1,
                completed_at: None,
                outputs: StepData::new(),
            })
            .collect();

        let next = scheduler::next_step(&template, &steps);
        let workflow = Workflow {
            id: workflow_id,
            template_id: template.id.clone(),
            template_version: template.version.clone(),
            template_hash: template.hash.clone(),
            status: WorkflowStatus::Active,
            current_step_id: next.step.map(|s| s.id),
            step_data: request.initial_data,
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
            revision: 0,
        };

        self.workflows.create_workflow(&workflow, &steps).await?;

        info!(
            workflow_id = %workflow.id,
            template_id = %workflow.template_id,
            version = %workflow.template_version,
            steps = steps.len(),
            "Workflow started"
        );
        Ok(workflow)
    }

    /// Read-only snapshot of a workflow.
    pub async fn get_workflow_state(&self, workflow_id: &str) -> Result<WorkflowState, WorkflowError> {
        let workflow = self.require_workflow(workflow_id).await?;
        Ok(WorkflowState::from(&workflow))
    }

    /// Full workflow record, including its template pin and revision.
    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, WorkflowError> {
        self.require_workflow(workflow_id).await
    }

    /// List workflows, newest first.
    pub async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
        limit: u32,
    ) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.workflows.list_workflows(status, limit).await?)
    }

    /// Per-step progress rows of a workflow, ordered by sequence.
    pub async fn list_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStep>, WorkflowError> {
        self.require_workflow(workflow_id).await?;
        Ok(self.workflows.list_steps(workflow_id).await?)
    }

    // --- Step completion ---

    /// Complete an eligible step, merging `outputs` into the workflow data.
    ///
    /// Completing the last step completes the workflow. Nothing is written
    /// unless every check passes.
    pub async fn complete_step(
        &self,
        workflow_id: &str,
        step_id: &str,
        outputs: StepData,
    ) -> Result<WorkflowState, WorkflowError> {
        let _lock = self.lock_workflow(workflow_id).await;
        let ctx = self.load_context(workflow_id).await?;
        let commit = plan_completion(&ctx, step_id, outputs, Utc::now())?;
        self.workflows.commit(&commit).await?;

        log_completion(&commit);
        Ok(WorkflowState::from(&commit.workflow))
    }

    // --- Status actions ---

    /// Apply an operator action. Actions that change nothing succeed without
    /// writing.
    pub async fn apply_action(
        &self,
        workflow_id: &str,
        action: WorkflowAction,
        reason: Option<String>,
    ) -> Result<WorkflowState, WorkflowError> {
        let _lock = self.lock_workflow(workflow_id).await;
        let mut workflow = self.require_workflow(workflow_id).await?;

        let to = match state_machine::transition(workflow.status, action)? {
            Transition::NoOp => {
                debug!(workflow_id = %workflow_id, %action, status = %workflow.status, "Action is a no-op");
                return Ok(WorkflowState::from(&workflow));
            }
            Transition::Move(to) => to,
        };

        let from = workflow.status;
        workflow.status = to;
        workflow.updated_at = Utc::now();
        if action == WorkflowAction::Fail {
            workflow.step_data.insert(
                FAILURE_REASON_KEY.to_string(),
                serde_json::Value::String(reason.unwrap_or_default()),
            );
        }

        let commit = WorkflowCommit {
            workflow,
            completed_step: None,
            checkpoint: None,
        };
        self.workflows.commit(&commit).await?;

        info!(workflow_id = %workflow_id, %from, %to, %action, "Workflow status changed");
        Ok(WorkflowState::from(&commit.workflow))
    }

    pub async fn pause(&self, workflow_id: &str) -> Result<WorkflowState, WorkflowError> {
        self.apply_action(workflow_id, WorkflowAction::Pause, None).await
    }

    pub async fn resume(&self, workflow_id: &str) -> Result<WorkflowState, WorkflowError> {
        self.apply_action(workflow_id, WorkflowAction::Resume, None).await
    }

    /// Fail a workflow, recording `reason` under `step_data.failureReason`.
    pub async fn fail(&self, workflow_id: &str, reason: impl Into<String>) -> Result<WorkflowState, WorkflowError> {
        self.apply_action(workflow_id, WorkflowAction::Fail, Some(reason.into()))
            .await
    }
}

// ---------------------------------------------------------------------------
// Completion planning
// ---------------------------------------------------------------------------

/// Validate a step completion and build the commit that applies it.
///
/// Checks, in order: the workflow is active, the step is eligible, and every
/// required flag is present in `step_data` or `outputs`.
pub(crate) fn plan_completion(
    ctx: &WorkflowContext,
    step_id: &str,
    outputs: StepData,
    now: DateTime<Utc>,
) -> Result<WorkflowCommit, WorkflowError> {
    state_machine::ensure_can_complete_step(ctx.workflow.status)?;
    let def = scheduler::check_eligible(&ctx.template, &ctx.steps, step_id)?;

    let missing: Vec<String> = def
        .validation
        .required_flags
        .iter()
        .filter(|flag| {
            !ctx.workflow.step_data.contains_key(flag.as_str()) && !outputs.contains_key(flag.as_str())
        })
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(WorkflowError::MissingRequiredFlags {
            step_id: step_id.to_string(),
            missing,
        });
    }

    let mut steps = ctx.steps.clone();
    for row in steps.iter_mut().filter(|r| r.step_id == step_id) {
        row.status = StepStatus::Completed;
        row.completed_at = Some(now);
        row.outputs = outputs.clone();
    }
    let next = scheduler::next_step(&ctx.template, &steps);

    let mut workflow = ctx.workflow.clone();
    workflow
        .step_data
        .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
    workflow.current_step_id = next.step.map(|s| s.id);
    workflow.updated_at = now;
    if next.is_complete {
        workflow.status = WorkflowStatus::Completed;
    }

    Ok(WorkflowCommit {
        workflow,
        completed_step: Some(StepCompletion {
            step_id: step_id.to_string(),
            completed_at: now,
            outputs,
        }),
        checkpoint: None,
    })
}

pub(crate) fn log_completion(commit: &WorkflowCommit) {
    let workflow = &commit.workflow;
    let step_id = commit
        .completed_step
        .as_ref()
        .map(|c| c.step_id.as_str())
        .unwrap_or_default();
    info!(workflow_id = %workflow.id, step_id, "Step completed");
    if workflow.status == WorkflowStatus::Completed {
        info!(workflow_id = %workflow.id, "Workflow completed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
