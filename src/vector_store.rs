//! SQLite-backed persistent [`VectorStore`].
//!
//! Entries live in the `vector_entries` table of the index database,
//! partitioned by collection name. Embeddings are little-endian f32 BLOBs
//! (see [`vec_to_blob`]). Queries fetch the filtered candidate rows and rank
//! them in process with [`rank_nearest`]; the per-owner candidate set is
//! small enough that brute force is the right tool.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use docvault_core::embedding::{blob_to_vec, vec_to_blob};
use docvault_core::models::{DocumentId, ScoredEntry, VectorEntry};
use docvault_core::store::{rank_nearest, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Number of entries in this collection.
    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_entries WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO vector_entries (collection, id, document_id, chunk_index,
                                            text, content_hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.collection)
            .bind(&entry.id)
            .bind(entry.document_id.0)
            .bind(entry.chunk_index as i64)
            .bind(&entry.text)
            .bind(&entry.content_hash)
            .bind(vec_to_blob(&entry.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: DocumentId) -> Result<usize> {
        let result =
            sqlx::query("DELETE FROM vector_entries WHERE collection = ? AND document_id = ?")
                .bind(&self.collection)
                .bind(document_id.0)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(
        &self,
        query_vec: &[f32],
        filter: &[DocumentId],
        k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        if filter.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT seq, id, document_id, chunk_index, text, content_hash, embedding \
             FROM vector_entries WHERE collection = ",
        );
        qb.push_bind(self.collection.clone());
        qb.push(" AND document_id IN (");
        let mut ids = qb.separated(", ");
        for id in filter {
            ids.push_bind(id.0);
        }
        ids.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;

        let candidates: Vec<(i64, VectorEntry)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                (
                    row.get::<i64, _>("seq"),
                    VectorEntry {
                        id: row.get("id"),
                        document_id: DocumentId(row.get("document_id")),
                        chunk_index: chunk_index as usize,
                        text: row.get("text"),
                        content_hash: row.get("content_hash"),
                        embedding: blob_to_vec(&blob),
                    },
                )
            })
            .collect();

        Ok(rank_nearest(
            query_vec,
            candidates.iter().map(|(seq, e)| (*seq, e)),
            k,
        ))
    }

    async fn document_entry_ids(&self, document_id: DocumentId) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM vector_entries WHERE collection = ? AND document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(&self.collection)
        .bind(document_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use docvault_core::models::entry_id;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir, collection: &str) -> SqliteVectorStore {
        let pool = db::connect(&tmp.path().join("vectors.sqlite")).await.unwrap();
        migrate::migrate_index(&pool).await.unwrap();
        SqliteVectorStore::new(pool, collection)
    }

    fn entry(doc: i64, idx: usize, text: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: entry_id(DocumentId(doc), idx),
            document_id: DocumentId(doc),
            chunk_index: idx,
            text: text.to_string(),
            content_hash: format!("hash-{}", text),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_query_and_filter() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "documents").await;
        store
            .upsert(&[
                entry(1, 0, "diabetes", vec![1.0, 0.0, 0.0]),
                entry(1, 1, "blood pressure", vec![0.0, 1.0, 0.0]),
                entry(2, 0, "other owner", vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .query(&[1.0, 0.1, 0.0], &[DocumentId(1)], 5)
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["diabetes", "blood pressure"]);
        assert!(hits.iter().all(|h| h.document_id == DocumentId(1)));

        assert!(store.query(&[1.0, 0.0, 0.0], &[], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "documents").await;
        store
            .upsert(&[entry(3, 0, "first", vec![1.0]), entry(3, 1, "second", vec![1.0])])
            .await
            .unwrap();
        store.upsert(&[entry(3, 0, "first v2", vec![1.0])]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let hits = store.query(&[1.0], &[DocumentId(3)], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["first v2", "second"]);
    }

    #[tokio::test]
    async fn test_delete_document_and_entry_ids() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "documents").await;
        store
            .upsert(&[
                entry(7, 1, "b", vec![1.0]),
                entry(7, 0, "a", vec![1.0]),
                entry(8, 0, "c", vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.document_entry_ids(DocumentId(7)).await.unwrap(),
            vec!["7_chunk_0".to_string(), "7_chunk_1".to_string()]
        );
        assert_eq!(store.delete_document(DocumentId(7)).await.unwrap(), 2);
        assert_eq!(store.delete_document(DocumentId(7)).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let a = open(&tmp, "documents").await;
        a.upsert(&[entry(1, 0, "x", vec![1.0])]).await.unwrap();
        let b = SqliteVectorStore::new(a.pool.clone(), "archive");
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.query(&[1.0], &[DocumentId(1)], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp, "documents").await;
            store.upsert(&[entry(4, 0, "persisted", vec![0.5, 0.5])]).await.unwrap();
            store.close().await;
        }
        let store = open(&tmp, "documents").await;
        let hits = store.query(&[0.5, 0.5], &[DocumentId(4)], 1).await.unwrap();
        assert_eq!(hits[0].text, "persisted");
    }
}
