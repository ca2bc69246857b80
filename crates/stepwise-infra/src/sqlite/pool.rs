//! SQLite connection pools for the workflow store.
//!
//! One writer connection serializes every aggregate commit; a read-only pool
//! serves state queries. Both run in WAL mode so readers never block the
//! writer, and the schema in `migrations/` is applied before anything reads.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use stepwise_types::config::EngineConfig;

/// Tunables for [`DatabasePool::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub busy_timeout: Duration,
    pub reader_connections: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PoolSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            reader_connections: config.reader_connections.max(1),
        }
    }
}

/// Reader/writer pool pair over one database file.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open with default settings.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::open(database_url, PoolSettings::default()).await
    }

    /// Open (creating if needed) the database at `database_url` and migrate it.
    pub async fn open(database_url: &str, settings: PoolSettings) -> Result<Self, sqlx::Error> {
        let connect = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect.clone())
            .await?;

        // The reader is read-only and cannot create tables.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(settings.reader_connections)
            .connect_with(connect.read_only(true))
            .await?;

        tracing::debug!(
            url = %database_url,
            readers = settings.reader_connections,
            busy_timeout_ms = settings.busy_timeout.as_millis() as u64,
            "Workflow store opened"
        );
        Ok(Self { reader, writer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_in(dir: &tempfile::TempDir, name: &str) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join(name).display())
    }

    #[tokio::test]
    async fn test_migrations_create_workflow_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir, "tables.db")).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(
            names,
            vec!["workflow_checkpoints", "workflow_steps", "workflow_templates", "workflows"]
        );
    }

    #[tokio::test]
    async fn test_writer_runs_wal_with_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir, "pragmas.db")).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let (fk,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_settings_come_from_engine_config() {
        let config = EngineConfig {
            busy_timeout_ms: 750,
            reader_connections: 3,
            ..EngineConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(&url_in(&dir, "tuned.db"), PoolSettings::from(&config))
            .await
            .unwrap();

        let (timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(timeout, 750);
        assert_eq!(pool.reader.options().get_max_connections(), 3);
        assert_eq!(pool.writer.options().get_max_connections(), 1);
    }

    #[test]
    fn test_zero_readers_is_clamped() {
        let config = EngineConfig {
            reader_connections: 0,
            ..EngineConfig::default()
        };
        assert_eq!(PoolSettings::from(&config).reader_connections, 1);
        assert_eq!(PoolSettings::default().busy_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = url_in(&dir, "again.db");
        let first = DatabasePool::new(&url).await.unwrap();
        first.writer.close().await;
        first.reader.close().await;
        assert!(DatabasePool::new(&url).await.is_ok());
    }
}
