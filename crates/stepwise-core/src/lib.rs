//! Workflow engine logic and repository trait definitions for Stepwise.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `stepwise-types` -- never on
//! `stepwise-infra` or any database crate.

pub mod repository;
pub mod service;
pub mod workflow;
