//! Template repository trait definition.

use stepwise_types::error::RepositoryError;
use stepwise_types::template::WorkflowTemplate;

/// Repository trait for template persistence.
///
/// Templates are immutable once stored: a second insert of the same
/// `(id, version)` is ignored, never applied as an update.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait TemplateRepository: Send + Sync {
    /// Insert a template unless `(id, version)` already exists.
    ///
    /// Returns `true` if a row was written.
    fn insert_if_absent(
        &self,
        template: &WorkflowTemplate,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Get one exact template version.
    fn get(
        &self,
        id: &str,
        version: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowTemplate>, RepositoryError>> + Send;

    /// List every stored version of a template id.
    fn list_versions(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowTemplate>, RepositoryError>> + Send;

    /// List all stored templates ordered by id, then version.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowTemplate>, RepositoryError>> + Send;
}
