//! Workflow template types.
//!
//! A template is the immutable, versioned definition of a process: an ordered
//! list of steps whose `depends_on` edges form a DAG. Running workflows pin a
//! template by `(id, version, hash)`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Registered template
// ---------------------------------------------------------------------------

/// A validated, hashed workflow template as stored by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Template identifier, shared by all versions.
    pub id: String,
    /// Version string (semantic versions order naturally; others sort lexically).
    pub version: String,
    /// Hex SHA-256 of the canonical JSON serialization of `steps`.
    pub hash: String,
    /// Human-readable title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Steps in declaration order. Declaration order defines step sequence.
    pub steps: Vec<StepDefinition>,
    /// Opaque key/value metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl WorkflowTemplate {
    /// Look up a step definition by id.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// One named unit of work within a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique (within the template) step identifier.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Action identifiers, opaque to the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// Ids of steps that must be completed before this one is eligible.
    #[serde(default, alias = "dependsOn", skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "StepValidation::is_empty")]
    pub validation: StepValidation,
}

/// Completion preconditions for a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepValidation {
    /// Keys that must be present in accumulated step data (including the
    /// outputs being reported) for the step to be completed.
    #[serde(default, alias = "requiredFlags", skip_serializing_if = "BTreeSet::is_empty")]
    pub required_flags: BTreeSet<String>,
}

impl StepValidation {
    pub fn is_empty(&self) -> bool {
        self.required_flags.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Source documents
// ---------------------------------------------------------------------------

/// A template as written in a source file, before validation and hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub id: String,
    pub version: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TemplateDocument {
    /// Attach the computed step-graph hash, producing a registrable template.
    pub fn into_template(self, hash: String) -> WorkflowTemplate {
        WorkflowTemplate {
            id: self.id,
            version: self.version,
            hash,
            title: self.title,
            description: self.description,
            category: self.category,
            tags: self.tags,
            steps: self.steps,
            metadata: self.metadata,
        }
    }
}

/// Result of a template load: what was registered and what was rejected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// `(id, version)` pairs newly stored.
    pub registered: Vec<(String, String)>,
    /// `(id, version)` pairs already stored with the same hash.
    pub unchanged: Vec<(String, String)>,
    /// `(id, version)` pairs already stored with a different hash (kept as stored).
    pub ignored_changed: Vec<(String, String)>,
    /// Rejected templates: source label and error message.
    pub rejected: Vec<(String, String)>,
}

impl LoadReport {
    /// Merge another report into this one.
    pub fn extend(&mut self, other: LoadReport) {
        self.registered.extend(other.registered);
        self.unchanged.extend(other.unchanged);
        self.ignored_changed.extend(other.ignored_changed);
        self.rejected.extend(other.rejected);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
