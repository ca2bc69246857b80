//! Template parsing, validation, hashing, and the template registry.
//!
//! Template sources are YAML or JSON documents holding a single template, a
//! `templates: [...]` list, or a bare sequence. Each template in a source is
//! validated on its own: a rejected template is recorded in the `LoadReport`
//! and never stops the rest of the load.

use std::path::{Path, PathBuf};

use semver::Version;
use serde_yaml_ng::Value;
use stepwise_types::error::{RepositoryError, TemplateError};
use stepwise_types::template::{LoadReport, StepDefinition, TemplateDocument, WorkflowTemplate};
use tracing::{debug, info, warn};

use crate::repository::template::TemplateRepository;
use crate::service::hash::ContentHasher;
use crate::workflow::dag::validate_dag;

/// File extensions picked up by directory loads.
const TEMPLATE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Split a parsed source into one value per template.
fn split_documents(value: Value) -> Vec<Value> {
    if let Some(Value::Sequence(items)) = value.get("templates") {
        return items.clone();
    }
    match value {
        Value::Sequence(items) => items,
        other => vec![other],
    }
}

/// Deserialize and validate one template document.
pub fn parse_template_value(value: Value) -> Result<TemplateDocument, TemplateError> {
    let doc: TemplateDocument =
        serde_yaml_ng::from_value(value).map_err(|e| TemplateError::Schema(e.to_string()))?;
    validate_document(&doc)?;
    Ok(doc)
}

/// Parse a source string into per-template results.
///
/// The outer `Err` is a syntax error of the whole source; inner results are
/// per template.
pub fn parse_templates(
    content: &str,
) -> Result<Vec<Result<TemplateDocument, TemplateError>>, TemplateError> {
    let value: Value =
        serde_yaml_ng::from_str(content).map_err(|e| TemplateError::Schema(e.to_string()))?;
    Ok(split_documents(value)
        .into_iter()
        .map(parse_template_value)
        .collect())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a template document.
///
/// Checks:
/// - `id`, `version` and `title` are non-empty
/// - At least one step exists and every step id is non-empty
/// - Step ids are unique, dependencies are known, and there is no cycle
pub fn validate_document(doc: &TemplateDocument) -> Result<(), TemplateError> {
    if doc.id.trim().is_empty() {
        return Err(TemplateError::Schema("template id must not be empty".to_string()));
    }
    if doc.version.trim().is_empty() {
        return Err(TemplateError::Schema(format!(
            "template '{}' has an empty version",
            doc.id
        )));
    }
    if doc.title.trim().is_empty() {
        return Err(TemplateError::Schema(format!(
            "template '{}' has an empty title",
            doc.id
        )));
    }
    if doc.steps.is_empty() {
        return Err(TemplateError::Schema(format!(
            "template '{}' must have at least one step",
            doc.id
        )));
    }
    if let Some(step) = doc.steps.iter().find(|s| s.id.trim().is_empty()) {
        return Err(TemplateError::Schema(format!(
            "template '{}' has a step with an empty id (title '{}')",
            doc.id, step.title
        )));
    }

    validate_dag(&doc.steps)
}

// ---------------------------------------------------------------------------
// Version ordering
// ---------------------------------------------------------------------------

/// Pick the latest of several versions of one template.
///
/// Semantic version order when every version parses as semver, plain string
/// order otherwise.
pub fn latest_version(versions: Vec<WorkflowTemplate>) -> Option<WorkflowTemplate> {
    if versions.iter().all(|t| Version::parse(&t.version).is_ok()) {
        versions
            .into_iter()
            .max_by_key(|t| Version::parse(&t.version).ok())
    } else {
        versions.into_iter().max_by(|a, b| a.version.cmp(&b.version))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// What happened to one template handed to `TemplateRegistry::register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Newly stored.
    Registered,
    /// Already stored with the same hash.
    Unchanged,
    /// Already stored with a different hash; the stored row was kept.
    IgnoredChanged { stored_hash: String },
}

/// Validates, hashes, and stores workflow templates.
///
/// Stored templates are immutable: loading is insert-or-ignore by
/// `(id, version)`, so reloading the same sources after a restart is a no-op.
pub struct TemplateRegistry<T: TemplateRepository, H: ContentHasher> {
    repo: T,
    hasher: H,
}

impl<T: TemplateRepository, H: ContentHasher> TemplateRegistry<T, H> {
    pub fn new(repo: T, hasher: H) -> Self {
        Self { repo, hasher }
    }

    /// Access the template repository.
    pub fn repo(&self) -> &T {
        &self.repo
    }

    /// Hash of the canonical JSON serialization of a step list.
    pub fn step_graph_hash(&self, steps: &[StepDefinition]) -> Result<String, TemplateError> {
        let canonical =
            serde_json::to_string(steps).map_err(|e| TemplateError::Schema(e.to_string()))?;
        Ok(self.hasher.compute_hash(&canonical))
    }

    /// Turn a validated document into a hashed template.
    pub fn prepare(&self, doc: TemplateDocument) -> Result<WorkflowTemplate, TemplateError> {
        let hash = self.step_graph_hash(&doc.steps)?;
        Ok(doc.into_template(hash))
    }

    /// Store a prepared template unless its `(id, version)` already exists.
    pub async fn register(
        &self,
        template: &WorkflowTemplate,
    ) -> Result<RegisterOutcome, TemplateError> {
        if self.repo.insert_if_absent(template).await? {
            info!(
                template_id = %template.id,
                version = %template.version,
                hash = %template.hash,
                "Template registered"
            );
            return Ok(RegisterOutcome::Registered);
        }

        let stored = self
            .repo
            .get(&template.id, &template.version)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        if stored.hash == template.hash {
            debug!(template_id = %template.id, version = %template.version, "Template unchanged");
            Ok(RegisterOutcome::Unchanged)
        } else {
            warn!(
                template_id = %template.id,
                version = %template.version,
                stored_hash = %stored.hash,
                new_hash = %template.hash,
                "Template version already registered with different steps; keeping stored copy"
            );
            Ok(RegisterOutcome::IgnoredChanged {
                stored_hash: stored.hash,
            })
        }
    }

    /// Load every template in a YAML or JSON source string.
    ///
    /// `source` labels rejected entries in the report (usually a file path).
    /// Only storage failures abort the load.
    pub async fn load_from_str(
        &self,
        content: &str,
        source: &str,
    ) -> Result<LoadReport, TemplateError> {
        let mut report = LoadReport::default();

        let parsed = match parse_templates(content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(source, error = %e, "Rejected template source");
                report.rejected.push((source.to_string(), e.to_string()));
                return Ok(report);
            }
        };

        let many = parsed.len() > 1;
        for (index, result) in parsed.into_iter().enumerate() {
            let label = if many {
                format!("{source}[{index}]")
            } else {
                source.to_string()
            };

            let template = match result.and_then(|doc| self.prepare(doc)) {
                Ok(template) => template,
                Err(e) => {
                    warn!(source = %label, error = %e, "Rejected template");
                    report.rejected.push((label, e.to_string()));
                    continue;
                }
            };

            let key = (template.id.clone(), template.version.clone());
            match self.register(&template).await? {
                RegisterOutcome::Registered => report.registered.push(key),
                RegisterOutcome::Unchanged => report.unchanged.push(key),
                RegisterOutcome::IgnoredChanged { .. } => report.ignored_changed.push(key),
            }
        }

        Ok(report)
    }

    /// Load the templates in one file.
    pub async fn load_file(&self, path: &Path) -> Result<LoadReport, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        self.load_from_str(&content, &path.display().to_string())
            .await
    }

    /// Load every `.yaml`, `.yml` and `.json` file under `dir`, recursively.
    ///
    /// A missing directory yields an empty report. Unreadable files are
    /// reported as rejected.
    pub async fn load_dir(&self, dir: &Path) -> Result<LoadReport, TemplateError> {
        let mut report = LoadReport::default();
        for path in discover_template_files(dir)? {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let file_report = self
                        .load_from_str(&content, &path.display().to_string())
                        .await?;
                    report.extend(file_report);
                }
                Err(e) => {
                    warn!(?path, error = %e, "Skipping unreadable template file");
                    report
                        .rejected
                        .push((path.display().to_string(), e.to_string()));
                }
            }
        }

        info!(
            dir = %dir.display(),
            registered = report.registered.len(),
            unchanged = report.unchanged.len(),
            rejected = report.rejected.len(),
            "Templates loaded"
        );
        Ok(report)
    }

    /// Load a file or a directory.
    pub async fn load_path(&self, path: &Path) -> Result<LoadReport, TemplateError> {
        if path.is_dir() {
            self.load_dir(path).await
        } else {
            self.load_file(path).await
        }
    }

    /// Latest registered version of a template.
    pub async fn get_template(
        &self,
        id: &str,
    ) -> Result<Option<WorkflowTemplate>, RepositoryError> {
        let versions = self.repo.list_versions(id).await?;
        Ok(latest_version(versions))
    }

    /// One exact template version.
    pub async fn get_template_version(
        &self,
        id: &str,
        version: &str,
    ) -> Result<Option<WorkflowTemplate>, RepositoryError> {
        self.repo.get(id, version).await
    }

    /// Every registered template, ordered by id then version.
    pub async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, RepositoryError> {
        self.repo.list().await
    }
}

// ---------------------------------------------------------------------------
// Filesystem discovery
// ---------------------------------------------------------------------------

/// All template files under `base_dir`, sorted by path.
pub fn discover_template_files(base_dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    results.sort();
    Ok(results)
}

fn discover_recursive(dir: &Path, results: &mut Vec<PathBuf>) -> Result<(), TemplateError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
        {
            results.push(path);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
