//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::path::Path;

use serde_json::Value;
use stepwise_core::workflow::{TemplateRegistry, WorkflowEngine};
use stepwise_infra::crypto::hash::Sha256ContentHasher;
use stepwise_infra::sqlite::pool::DatabasePool;
use stepwise_infra::sqlite::template::SqliteTemplateRepository;
use stepwise_infra::sqlite::workflow::SqliteWorkflowRepository;
use stepwise_types::workflow::StepData;

pub type Engine =
    WorkflowEngine<SqliteWorkflowRepository, SqliteTemplateRepository, Sha256ContentHasher>;

pub const TWO_STEP: &str = r#"
id: two-step
version: 1.0.0
title: Two step
steps:
  - id: step1
    title: First
  - id: step2
    title: Second
    depends_on: [step1]
"#;

pub const REVIEW: &str = r#"
id: review
version: 1.0.0
title: Document review
steps:
  - id: draft
    title: Draft
  - id: approve
    title: Approve
    depends_on: [draft]
    validation:
      required_flags: [approved]
"#;

pub fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("engine.db").display())
}

/// Build an engine over the database at `url`.
pub async fn engine_at(url: &str) -> (Engine, DatabasePool) {
    let pool = DatabasePool::new(url).await.unwrap();
    let registry = TemplateRegistry::new(
        SqliteTemplateRepository::new(pool.clone()),
        Sha256ContentHasher,
    );
    let engine = WorkflowEngine::new(SqliteWorkflowRepository::new(pool.clone()), registry);
    (engine, pool)
}

/// Engine on a fresh temp database with the standard templates loaded.
pub async fn test_engine() -> (Engine, DatabasePool) {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(dir.path());
    std::mem::forget(dir);
    let (engine, pool) = engine_at(&url).await;
    for source in [TWO_STEP, REVIEW] {
        let report = engine.registry().load_from_str(source, "fixture").await.unwrap();
        assert_eq!(report.registered.len(), 1, "fixture template should register");
    }
    (engine, pool)
}

pub fn data(value: Value) -> StepData {
    value.as_object().cloned().unwrap_or_default()
}
