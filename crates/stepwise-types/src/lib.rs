//! Shared domain types for Stepwise.
//!
//! Templates, running workflows, their per-step progress rows, checkpoints,
//! the error taxonomy, and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod template;
pub mod workflow;
