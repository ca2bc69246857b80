use thiserror::Error;

use crate::workflow::WorkflowStatus;

/// Coarse error class used by caller layers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown workflow or template.
    NotFound,
    /// Request understood but refused in the current state (409-class).
    Unprocessable,
    /// Malformed input (400-class).
    BadRequest,
    /// Storage or integrity failure.
    Internal,
}

/// Errors raised by workflow engine operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("template '{id}' not found{}", .version.as_ref().map(|v| format!(" (version {v})")).unwrap_or_default())]
    TemplateNotFound { id: String, version: Option<String> },

    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("step '{step_id}' is not eligible: {reason}")]
    StepNotEligible { step_id: String, reason: String },

    #[error("step '{step_id}' is missing required flags: {}", .missing.join(", "))]
    MissingRequiredFlags {
        step_id: String,
        missing: Vec<String>,
    },

    #[error("template integrity violation: expected hash '{expected}', got '{actual}'")]
    TemplateIntegrity { expected: String, actual: String },

    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::WorkflowNotFound(_) | WorkflowError::TemplateNotFound { .. } => {
                ErrorKind::NotFound
            }
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::StepNotEligible { .. }
            | WorkflowError::MissingRequiredFlags { .. }
            | WorkflowError::Conflict(_) => ErrorKind::Unprocessable,
            WorkflowError::InvalidRequest(_) => ErrorKind::BadRequest,
            WorkflowError::TemplateIntegrity { .. } | WorkflowError::Storage(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => WorkflowError::Conflict(msg),
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

/// Errors raised while loading templates. Fatal for the offending template only.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("dependency cycle between steps: {}", .step_ids.join(", "))]
    Cycle { step_ids: Vec<String> },

    #[error("template schema error: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for TemplateError {
    fn from(e: RepositoryError) -> Self {
        TemplateError::Storage(e.to_string())
    }
}

/// Errors from repository operations (used by trait definitions in stepwise-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
