//! Idempotent schema creation for the document catalog and the vector index.
//!
//! The two live in separate SQLite files (`[db].path` and `[index].path`)
//! so the index can be dropped and rebuilt with `dv reindex` without
//! touching document records.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create both databases and their tables (`dv init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let catalog = db::connect(&config.db.path).await?;
    migrate_catalog(&catalog).await?;
    catalog.close().await;

    let index = db::connect(&config.index.path).await?;
    migrate_index(&index).await?;
    index.close().await;

    Ok(())
}

pub async fn migrate_catalog(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            format TEXT NOT NULL,
            upload_date INTEGER NOT NULL,
            category TEXT,
            description TEXT,
            metadata_info TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner_id ON documents(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn migrate_index(pool: &SqlitePool) -> Result<()> {
    // seq gives a stable insertion order for tie-breaking; upserts keep it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vector_entries_document ON vector_entries(collection, document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("both.sqlite")).await.unwrap();
        for _ in 0..2 {
            migrate_catalog(&pool).await.unwrap();
            migrate_index(&pool).await.unwrap();
        }
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('documents', 'vector_entries') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["documents".to_string(), "vector_entries".to_string()]);
        pool.close().await;
    }
}
