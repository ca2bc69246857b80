//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `stepwise-core` using sqlx with split
//! read/write pools. A workflow, its step rows and its checkpoints are always
//! written inside one writer transaction, guarded by the workflow's
//! `revision` column.

use sqlx::{Row, SqliteConnection};
use stepwise_core::repository::workflow::{WorkflowCommit, WorkflowRepository};
use stepwise_types::checkpoint::{CheckpointInsert, NewCheckpoint, WorkflowCheckpoint};
use stepwise_types::error::RepositoryError;
use stepwise_types::workflow::{StepStatus, Workflow, WorkflowStatus, WorkflowStep};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, to_json};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    template_id: String,
    template_version: String,
    template_hash: String,
    status: String,
    current_step_id: Option<String>,
    step_data: String,
    created_by: String,
    created_at: String,
    updated_at: String,
    revision: i64,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            template_id: row.try_get("template_id")?,
            template_version: row.try_get("template_version")?,
            template_hash: row.try_get("template_hash")?,
            status: row.try_get("status")?,
            current_step_id: row.try_get("current_step_id")?,
            step_data: row.try_get("step_data")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            revision: row.try_get("revision")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        Ok(Workflow {
            status: self
                .status
                .parse::<WorkflowStatus>()
                .map_err(RepositoryError::Query)?,
            step_data: parse_json("step_data", &self.step_data)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            id: self.id,
            template_id: self.template_id,
            template_version: self.template_version,
            template_hash: self.template_hash,
            current_step_id: self.current_step_id,
            created_by: self.created_by,
            revision: self.revision,
        })
    }
}

struct StepRow {
    id: String,
    workflow_id: String,
    step_id: String,
    status: String,
    sequence: i64,
    completed_at: Option<String>,
    outputs: String,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_id: row.try_get("step_id")?,
            status: row.try_get("status")?,
            sequence: row.try_get("sequence")?,
            completed_at: row.try_get("completed_at")?,
            outputs: row.try_get("outputs")?,
        })
    }

    fn into_step(self) -> Result<WorkflowStep, RepositoryError> {
        Ok(WorkflowStep {
            status: self
                .status
                .parse::<StepStatus>()
                .map_err(RepositoryError::Query)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            outputs: parse_json("outputs", &self.outputs)?,
            id: self.id,
            workflow_id: self.workflow_id,
            step_id: self.step_id,
            sequence: self.sequence,
        })
    }
}

struct CheckpointRow {
    id: String,
    workflow_id: String,
    step_id: String,
    sequence: i64,
    timestamp: String,
    data: String,
    notes: String,
    source_request_id: Option<String>,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_id: row.try_get("step_id")?,
            sequence: row.try_get("sequence")?,
            timestamp: row.try_get("timestamp")?,
            data: row.try_get("data")?,
            notes: row.try_get("notes")?,
            source_request_id: row.try_get("source_request_id")?,
        })
    }

    fn into_checkpoint(self) -> Result<WorkflowCheckpoint, RepositoryError> {
        Ok(WorkflowCheckpoint {
            timestamp: parse_datetime(&self.timestamp)?,
            data: parse_json("data", &self.data)?,
            id: self.id,
            workflow_id: self.workflow_id,
            step_id: self.step_id,
            sequence: self.sequence,
            notes: self.notes,
            source_request_id: self.source_request_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn decode_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowCheckpoint, RepositoryError> {
    CheckpointRow::from_row(row)
        .map_err(query_err)?
        .into_checkpoint()
}

/// Insert a checkpoint with the next sequence, or read back the row that
/// already holds its `source_request_id`. Runs on the caller's connection so
/// that it joins the caller's transaction.
async fn insert_checkpoint_on(
    conn: &mut SqliteConnection,
    checkpoint: &NewCheckpoint,
) -> Result<CheckpointInsert, RepositoryError> {
    // The WHERE clause is required for SQLite to parse an upsert on INSERT ... SELECT.
    let result = sqlx::query(
        r#"INSERT INTO workflow_checkpoints
           (id, workflow_id, step_id, sequence, timestamp, data, notes, source_request_id)
           SELECT ?, ?, ?, COALESCE(MAX(sequence), 0) + 1, ?, ?, ?, ?
           FROM workflow_checkpoints WHERE workflow_id = ?
           ON CONFLICT(workflow_id, source_request_id) DO NOTHING"#,
    )
    .bind(&checkpoint.id)
    .bind(&checkpoint.workflow_id)
    .bind(&checkpoint.step_id)
    .bind(format_datetime(&checkpoint.timestamp))
    .bind(to_json("data", &checkpoint.data)?)
    .bind(&checkpoint.notes)
    .bind(&checkpoint.source_request_id)
    .bind(&checkpoint.workflow_id)
    .execute(&mut *conn)
    .await
    .map_err(query_err)?;

    if result.rows_affected() > 0 {
        let row = sqlx::query("SELECT * FROM workflow_checkpoints WHERE id = ?")
            .bind(&checkpoint.id)
            .fetch_one(&mut *conn)
            .await
            .map_err(query_err)?;
        return Ok(CheckpointInsert::Created(decode_checkpoint(&row)?));
    }

    let request_id = checkpoint.source_request_id.as_deref().ok_or_else(|| {
        RepositoryError::Query("checkpoint insert ignored without a request id".to_string())
    })?;
    let row = sqlx::query(
        "SELECT * FROM workflow_checkpoints WHERE workflow_id = ? AND source_request_id = ?",
    )
    .bind(&checkpoint.workflow_id)
    .bind(request_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_err)?;
    Ok(CheckpointInsert::Existing(decode_checkpoint(&row)?))
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        steps: &[WorkflowStep],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO workflows
               (id, template_id, template_version, template_hash, status, current_step_id,
                step_data, created_by, created_at, updated_at, revision)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&workflow.id)
        .bind(&workflow.template_id)
        .bind(&workflow.template_version)
        .bind(&workflow.template_hash)
        .bind(workflow.status.as_str())
        .bind(&workflow.current_step_id)
        .bind(to_json("step_data", &workflow.step_data)?)
        .bind(&workflow.created_by)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .bind(workflow.revision)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!(
                        "workflow '{}' already exists",
                        workflow.id
                    ));
                }
            }
            query_err(e)
        })?;

        for step in steps {
            sqlx::query(
                r#"INSERT INTO workflow_steps
                   (id, workflow_id, step_id, status, sequence, completed_at, outputs)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&step.id)
            .bind(&step.workflow_id)
            .bind(&step.step_id)
            .bind(step.status.as_str())
            .bind(step.sequence)
            .bind(step.completed_at.as_ref().map(format_datetime))
            .bind(to_json("outputs", &step.outputs)?)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
        limit: u32,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM workflows WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM workflows ORDER BY created_at DESC, id DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(query_err)?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowRow::from_row(row).map_err(query_err)?;
            workflows.push(r.into_workflow()?);
        }
        Ok(workflows)
    }

    async fn commit(
        &self,
        commit: &WorkflowCommit,
    ) -> Result<Option<WorkflowCheckpoint>, RepositoryError> {
        let workflow = &commit.workflow;
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let result = sqlx::query(
            r#"UPDATE workflows
               SET status = ?, current_step_id = ?, step_data = ?, updated_at = ?,
                   revision = revision + 1
               WHERE id = ? AND revision = ?"#,
        )
        .bind(workflow.status.as_str())
        .bind(&workflow.current_step_id)
        .bind(to_json("step_data", &workflow.step_data)?)
        .bind(format_datetime(&workflow.updated_at))
        .bind(&workflow.id)
        .bind(workflow.revision)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            let stored: Option<(i64,)> =
                sqlx::query_as("SELECT revision FROM workflows WHERE id = ?")
                    .bind(&workflow.id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
            return Err(match stored {
                None => RepositoryError::NotFound,
                Some((revision,)) => RepositoryError::Conflict(format!(
                    "workflow '{}' is at revision {revision}, expected {}",
                    workflow.id, workflow.revision
                )),
            });
        }

        if let Some(step) = &commit.completed_step {
            let result = sqlx::query(
                r#"UPDATE workflow_steps
                   SET status = 'completed', completed_at = ?, outputs = ?
                   WHERE workflow_id = ? AND step_id = ? AND status = 'pending'"#,
            )
            .bind(format_datetime(&step.completed_at))
            .bind(to_json("outputs", &step.outputs)?)
            .bind(&workflow.id)
            .bind(&step.step_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "step '{}' of workflow '{}' is no longer pending",
                    step.step_id, workflow.id
                )));
            }
        }

        let checkpoint = match &commit.checkpoint {
            Some(new) => match insert_checkpoint_on(&mut *tx, new).await? {
                CheckpointInsert::Created(cp) => Some(cp),
                CheckpointInsert::Existing(cp) => {
                    return Err(RepositoryError::Conflict(format!(
                        "checkpoint request '{}' already recorded as sequence {}",
                        cp.source_request_id.unwrap_or_default(),
                        cp.sequence
                    )));
                }
            },
            None => None,
        };

        tx.commit().await.map_err(query_err)?;
        Ok(checkpoint)
    }

    async fn list_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_steps WHERE workflow_id = ? ORDER BY sequence ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRow::from_row(row).map_err(query_err)?;
            steps.push(r.into_step()?);
        }
        Ok(steps)
    }

    async fn insert_checkpoint(
        &self,
        checkpoint: &NewCheckpoint,
    ) -> Result<CheckpointInsert, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let outcome = insert_checkpoint_on(&mut *tx, checkpoint).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(outcome)
    }

    async fn find_checkpoint_by_request(
        &self,
        workflow_id: &str,
        source_request_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM workflow_checkpoints WHERE workflow_id = ? AND source_request_id = ?",
        )
        .bind(workflow_id)
        .bind(source_request_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(decode_checkpoint).transpose()
    }

    async fn list_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowCheckpoint>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_checkpoints WHERE workflow_id = ? ORDER BY sequence ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(decode_checkpoint).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
