//! SQLite template repository implementation.
//!
//! Templates are immutable rows keyed by `(id, version)`. Steps, tags and
//! metadata are stored as JSON text.

use chrono::Utc;
use sqlx::Row;
use stepwise_core::repository::template::TemplateRepository;
use stepwise_types::error::RepositoryError;
use stepwise_types::template::WorkflowTemplate;

use super::pool::DatabasePool;
use super::{format_datetime, parse_json, to_json};

/// SQLite-backed implementation of `TemplateRepository`.
pub struct SqliteTemplateRepository {
    pool: DatabasePool,
}

impl SqliteTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct TemplateRow {
    id: String,
    version: String,
    hash: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    tags: String,
    steps: String,
    metadata: String,
}

impl TemplateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            version: row.try_get("version")?,
            hash: row.try_get("hash")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
            tags: row.try_get("tags")?,
            steps: row.try_get("steps")?,
            metadata: row.try_get("metadata")?,
        })
    }

    fn into_template(self) -> Result<WorkflowTemplate, RepositoryError> {
        Ok(WorkflowTemplate {
            tags: parse_json("tags", &self.tags)?,
            steps: parse_json("steps", &self.steps)?,
            metadata: parse_json("metadata", &self.metadata)?,
            id: self.id,
            version: self.version,
            hash: self.hash,
            title: self.title,
            description: self.description,
            category: self.category,
        })
    }
}

fn rows_to_templates(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WorkflowTemplate>, RepositoryError> {
    let mut templates = Vec::with_capacity(rows.len());
    for row in rows {
        let r = TemplateRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        templates.push(r.into_template()?);
    }
    Ok(templates)
}

impl TemplateRepository for SqliteTemplateRepository {
    async fn insert_if_absent(&self, template: &WorkflowTemplate) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO workflow_templates
               (id, version, hash, title, description, category, tags, steps, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id, version) DO NOTHING"#,
        )
        .bind(&template.id)
        .bind(&template.version)
        .bind(&template.hash)
        .bind(&template.title)
        .bind(&template.description)
        .bind(&template.category)
        .bind(to_json("tags", &template.tags)?)
        .bind(to_json("steps", &template.steps)?)
        .bind(to_json("metadata", &template.metadata)?)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: &str, version: &str) -> Result<Option<WorkflowTemplate>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_templates WHERE id = ? AND version = ?")
            .bind(id)
            .bind(version)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = TemplateRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_template()?))
            }
            None => Ok(None),
        }
    }

    async fn list_versions(&self, id: &str) -> Result<Vec<WorkflowTemplate>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflow_templates WHERE id = ? ORDER BY version ASC")
            .bind(id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_templates(&rows)
    }

    async fn list(&self) -> Result<Vec<WorkflowTemplate>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflow_templates ORDER BY id ASC, version ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_templates(&rows)
    }
}
