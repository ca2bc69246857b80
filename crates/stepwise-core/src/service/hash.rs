//! ContentHasher trait for computing integrity hashes.
//!
//! Defined in stepwise-core so the template registry can hash step graphs
//! without coupling to a specific algorithm. The `Sha256ContentHasher`
//! adapter lives in stepwise-infra.

/// Abstraction over content hashing for change detection.
///
/// Used by `TemplateRegistry` to fingerprint the canonical serialization of
/// a template's steps, and by the engine to verify that a workflow still runs
/// against the graph it was started with.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given content.
    fn compute_hash(&self, content: &str) -> String;
}
