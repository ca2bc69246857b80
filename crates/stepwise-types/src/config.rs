//! Engine configuration types.
//!
//! `EngineConfig` mirrors `{data_dir}/config.toml`. Every field has a default,
//! so an empty or missing file yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Stepwise host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file name, relative to the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Directory scanned for template files (relative paths resolve against
    /// the data directory).
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Load `templates_dir` every time the host starts.
    #[serde(default = "default_true")]
    pub load_templates_on_start: bool,

    /// Row limit for list commands when none is given.
    #[serde(default = "default_list_limit")]
    pub default_list_limit: u32,

    /// How long a connection waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Size of the read-only connection pool.
    #[serde(default = "default_reader_connections")]
    pub reader_connections: u32,
}

fn default_database_file() -> String {
    "stepwise.db".to_string()
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_true() -> bool {
    true
}

fn default_list_limit() -> u32 {
    50
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_reader_connections() -> u32 {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            templates_dir: default_templates_dir(),
            load_templates_on_start: default_true(),
            default_list_limit: default_list_limit(),
            busy_timeout_ms: default_busy_timeout_ms(),
            reader_connections: default_reader_connections(),
        }
    }
}

impl EngineConfig {
    /// Absolute templates directory for a given data directory.
    pub fn templates_path(&self, data_dir: &Path) -> PathBuf {
        if self.templates_dir.is_absolute() {
            self.templates_dir.clone()
        } else {
            data_dir.join(&self.templates_dir)
        }
    }

    /// `sqlite://` URL of the database inside `data_dir`.
    pub fn database_url(&self, data_dir: &Path) -> String {
        format!(
            "sqlite://{}?mode=rwc",
            data_dir.join(&self.database_file).display()
        )
    }
}
