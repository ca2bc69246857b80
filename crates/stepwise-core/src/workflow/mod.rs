//! Workflow engine core: templates, scheduling, status transitions, and checkpoints.
//!
//! - `template` -- template parsing, validation, hashing, and the registry
//! - `dag` -- step dependency graph validation and cycle reporting
//! - `scheduler` -- next eligible step and progress computation
//! - `state_machine` -- legal workflow status transitions
//! - `engine` -- `WorkflowEngine`, the per-workflow serialized command surface
//! - `checkpoint` -- idempotent progress snapshots on top of the engine

pub mod checkpoint;
pub mod dag;
pub mod engine;
pub mod scheduler;
pub mod state_machine;
pub mod template;

pub use engine::WorkflowEngine;
pub use template::TemplateRegistry;
