//! Application state: the engine and its storage, wired once per invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use stepwise_core::workflow::{TemplateRegistry, WorkflowEngine};
use stepwise_infra::config::{load_engine_config, resolve_data_dir};
use stepwise_infra::crypto::hash::Sha256ContentHasher;
use stepwise_infra::sqlite::pool::{DatabasePool, PoolSettings};
use stepwise_infra::sqlite::template::SqliteTemplateRepository;
use stepwise_infra::sqlite::workflow::SqliteWorkflowRepository;
use stepwise_types::config::EngineConfig;

/// Concrete engine type used by the CLI.
pub type ConcreteEngine =
    WorkflowEngine<SqliteWorkflowRepository, SqliteTemplateRepository, Sha256ContentHasher>;

pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, open the database, and build the engine.
    ///
    /// Templates under the configured templates directory are loaded when
    /// `load_templates_on_start` is set. A bad template file is reported and
    /// skipped; it never stops startup.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;
        let db_url = config.database_url(&data_dir);
        let pool = DatabasePool::open(&db_url, PoolSettings::from(&config))
            .await
            .with_context(|| format!("failed to open database {db_url}"))?;

        let registry = TemplateRegistry::new(
            SqliteTemplateRepository::new(pool.clone()),
            Sha256ContentHasher,
        );
        let engine = WorkflowEngine::new(SqliteWorkflowRepository::new(pool), registry);

        if config.load_templates_on_start {
            let templates_dir = config.templates_path(&data_dir);
            if templates_dir.is_dir() {
                match engine.registry().load_dir(&templates_dir).await {
                    Ok(report) => tracing::info!(
                        dir = %templates_dir.display(),
                        registered = report.registered.len(),
                        unchanged = report.unchanged.len(),
                        ignored_changed = report.ignored_changed.len(),
                        rejected = report.rejected.len(),
                        "Templates loaded on start"
                    ),
                    Err(e) => tracing::warn!(
                        dir = %templates_dir.display(),
                        error = %e,
                        "Failed to load templates on start"
                    ),
                }
            } else {
                tracing::debug!(dir = %templates_dir.display(), "No templates directory");
            }
        }

        Ok(Self {
            engine: Arc::new(engine),
            config,
            data_dir,
        })
    }
}
