//! SQLite-backed [`DocumentCatalog`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docvault_core::catalog::DocumentCatalog;
use docvault_core::models::{DocumentFormat, DocumentId, DocumentRecord, NewDocument, OwnerId};

const SELECT_COLUMNS: &str = "SELECT id, owner_id, filename, file_path, format, upload_date, \
     category, description, metadata_info FROM documents";

/// Document records in the `documents` table.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<DocumentRecord> {
    let tag: String = row.get("format");
    let format = DocumentFormat::from_tag(&tag)
        .ok_or_else(|| anyhow!("unknown document format in catalog: '{}'", tag))?;
    let ts: i64 = row.get("upload_date");
    let upload_date: DateTime<Utc> = DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| anyhow!("invalid upload_date timestamp: {}", ts))?;

    Ok(DocumentRecord {
        id: DocumentId(row.get("id")),
        owner_id: OwnerId(row.get("owner_id")),
        filename: row.get("filename"),
        file_path: row.get("file_path"),
        format,
        upload_date,
        category: row.get("category"),
        description: row.get("description"),
        metadata_info: row.get("metadata_info"),
    })
}

#[async_trait]
impl DocumentCatalog for SqliteCatalog {
    async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentRecord> {
        let upload_date = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO documents (owner_id, filename, file_path, format, upload_date,
                                   category, description, metadata_info)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.owner_id.0)
        .bind(&doc.filename)
        .bind(&doc.file_path)
        .bind(doc.format.as_str())
        .bind(upload_date.timestamp())
        .bind(&doc.category)
        .bind(&doc.description)
        .bind(&doc.metadata_info)
        .execute(&self.pool)
        .await?;

        let id = DocumentId(result.last_insert_rowid());
        self.get_document(id)
            .await?
            .ok_or_else(|| anyhow!("document {} vanished after insert", id))
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn documents_owned_by(&self, owner: OwnerId) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!("{} WHERE owner_id = ? ORDER BY id ASC", SELECT_COLUMNS))
            .bind(owner.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn all_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
