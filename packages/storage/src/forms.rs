// ABOUTME: Storage layer for form documents and their assistant conversations
// ABOUTME: Provides CRUD operations for forms and ordered chat messages in SQLite

use chrono::{DateTime, Utc};
use formpilot_chat::ChatMessage;
use formpilot_core::FormDocument;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("../migrations/001_initial_schema.sql");

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Form not found: {0}")]
    NotFound(String),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Row in the form list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub id: String,
    pub title: Option<String>,
    pub field_count: i64,
    pub updated_at: DateTime<Utc>,
}

pub fn generate_form_id() -> String {
    format!("form_{}", nanoid::nanoid!())
}

pub struct FormStorage {
    pool: SqlitePool,
}

impl FormStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and apply the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        info!("Opened form storage at {}", database_url);
        Ok(storage)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a form document
    pub async fn save_form(&self, form_id: &str, document: &FormDocument) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_form(&mut tx, form_id, document).await?;
        tx.commit().await?;
        debug!("Saved form {} ({} fields)", form_id, document.len());
        Ok(())
    }

    pub async fn load_form(&self, form_id: &str) -> Result<FormDocument> {
        let row = sqlx::query("SELECT document FROM forms WHERE id = ?1")
            .bind(form_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.try_get("document")?;
                Ok(serde_json::from_str(&document)?)
            }
            None => Err(StorageError::NotFound(form_id.to_string())),
        }
    }

    /// All forms, most recently updated first
    pub async fn list_forms(&self) -> Result<Vec<FormSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, field_count, updated_at FROM forms ORDER BY updated_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let updated_at: String = row.try_get("updated_at")?;
                Ok(FormSummary {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    field_count: row.try_get("field_count")?,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    /// Delete a form and its conversation
    pub async fn delete_form(&self, form_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM form_messages WHERE form_id = ?1")
            .bind(form_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM forms WHERE id = ?1")
            .bind(form_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(form_id.to_string()));
        }
        tx.commit().await?;
        info!("Deleted form {}", form_id);
        Ok(())
    }

    /// Replace the stored conversation of a form
    pub async fn save_messages(&self, form_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        ensure_form_exists(&mut tx, form_id).await?;
        replace_messages(&mut tx, form_id, messages).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_messages(&self, form_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT message FROM form_messages WHERE form_id = ?1 ORDER BY position ASC",
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let message: String = row.try_get("message")?;
                Ok(serde_json::from_str(&message)?)
            })
            .collect()
    }

    /// Save the document and conversation of one form atomically
    pub async fn save_conversation(
        &self,
        form_id: &str,
        document: &FormDocument,
        messages: &[ChatMessage],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_form(&mut tx, form_id, document).await?;
        replace_messages(&mut tx, form_id, messages).await?;
        tx.commit().await?;
        debug!(
            "Saved conversation for form {} ({} messages)",
            form_id,
            messages.len()
        );
        Ok(())
    }
}

async fn upsert_form(
    tx: &mut Transaction<'_, Sqlite>,
    form_id: &str,
    document: &FormDocument,
) -> Result<()> {
    if form_id.trim().is_empty() {
        return Err(StorageError::InvalidInput("Form id cannot be empty".to_string()));
    }

    let now = Utc::now().to_rfc3339();
    let document_json = serde_json::to_string(document)?;
    sqlx::query(
        r#"
        INSERT INTO forms (id, title, field_count, document, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            field_count = excluded.field_count,
            document = excluded.document,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(form_id)
    .bind(&document.meta.title)
    .bind(document.len() as i64)
    .bind(&document_json)
    .bind(&now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn ensure_form_exists(tx: &mut Transaction<'_, Sqlite>, form_id: &str) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM forms WHERE id = ?1")
        .bind(form_id)
        .fetch_optional(&mut **tx)
        .await?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StorageError::NotFound(form_id.to_string())),
    }
}

async fn replace_messages(
    tx: &mut Transaction<'_, Sqlite>,
    form_id: &str,
    messages: &[ChatMessage],
) -> Result<()> {
    sqlx::query("DELETE FROM form_messages WHERE form_id = ?1")
        .bind(form_id)
        .execute(&mut **tx)
        .await?;

    for (position, message) in messages.iter().enumerate() {
        let message_json = serde_json::to_string(message)?;
        sqlx::query(
            r#"
            INSERT INTO form_messages (id, form_id, position, role, status, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&message.id)
        .bind(form_id)
        .bind(position as i64)
        .bind(message.role.as_str())
        .bind(message.status.as_str())
        .bind(&message_json)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidInput(format!("Invalid timestamp '{}': {}", value, e)))
}
