//! Infrastructure layer for Stepwise.
//!
//! Contains implementations of the repository traits defined in `stepwise-core`:
//! SQLite storage for templates and workflows, SHA-256 step-graph hashing, and
//! the `config.toml` loader.

pub mod config;
pub mod crypto;
pub mod sqlite;
