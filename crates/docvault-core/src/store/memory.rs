//! In-memory [`VectorStore`] implementation for tests and ephemeral use.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`; each write takes the
//! lock once, so a batch upsert is atomic with respect to queries.
//! Search is brute-force cosine distance over the filtered entries.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{DocumentId, ScoredEntry, VectorEntry};

use super::{rank_nearest, VectorStore};

struct StoredEntry {
    seq: i64,
    entry: VectorEntry,
}

#[derive(Default)]
struct Inner {
    entries: Vec<StoredEntry>,
    next_seq: i64,
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()> {
        let mut guard = self.inner.write().map_err(poisoned)?;
        let inner = &mut *guard;
        for e in entries {
            match inner.entries.iter().position(|s| s.entry.id == e.id) {
                Some(pos) => inner.entries[pos].entry = e.clone(),
                None => {
                    inner.entries.push(StoredEntry {
                        seq: inner.next_seq,
                        entry: e.clone(),
                    });
                    inner.next_seq += 1;
                }
            }
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: DocumentId) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let before = inner.entries.len();
        inner.entries.retain(|s| s.entry.document_id != document_id);
        Ok(before - inner.entries.len())
    }

    async fn query(
        &self,
        query_vec: &[f32],
        filter: &[DocumentId],
        k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let allowed: HashSet<DocumentId> = filter.iter().copied().collect();
        let inner = self.inner.read().map_err(poisoned)?;
        let candidates = inner
            .entries
            .iter()
            .filter(|s| allowed.contains(&s.entry.document_id))
            .map(|s| (s.seq, &s.entry));
        Ok(rank_nearest(query_vec, candidates, k))
    }

    async fn document_entry_ids(&self, document_id: DocumentId) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut matching: Vec<&VectorEntry> = inner
            .entries
            .iter()
            .map(|s| &s.entry)
            .filter(|e| e.document_id == document_id)
            .collect();
        matching.sort_by_key(|e| e.chunk_index);
        Ok(matching.into_iter().map(|e| e.id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry_id;

    fn entry(doc: i64, idx: usize, text: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: entry_id(DocumentId(doc), idx),
            document_id: DocumentId(doc),
            chunk_index: idx,
            text: text.to_string(),
            content_hash: String::new(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[entry(1, 0, "old", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[entry(1, 0, "new", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.len(), 1);
        let hits = store.query(&[1.0, 0.0], &[DocumentId(1)], 5).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn test_query_respects_filter() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                entry(1, 0, "mine", vec![0.0, 1.0]),
                entry(2, 0, "theirs", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let hits = store.query(&[1.0, 0.0], &[DocumentId(1)], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "mine");
        assert!(store.query(&[1.0, 0.0], &[], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                entry(1, 0, "a", vec![1.0]),
                entry(1, 1, "b", vec![1.0]),
                entry(2, 0, "c", vec![1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.delete_document(DocumentId(1)).await.unwrap(), 2);
        assert_eq!(store.delete_document(DocumentId(1)).await.unwrap(), 0);
        assert!(store.document_entry_ids(DocumentId(1)).await.unwrap().is_empty());
        assert_eq!(
            store.document_entry_ids(DocumentId(2)).await.unwrap(),
            vec!["2_chunk_0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_ties_follow_insertion_order() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[entry(5, 0, "first", vec![1.0]), entry(5, 1, "second", vec![1.0])])
            .await
            .unwrap();
        // Overwriting "first" must not move it behind "second".
        store.upsert(&[entry(5, 0, "first v2", vec![1.0])]).await.unwrap();
        let hits = store.query(&[1.0], &[DocumentId(5)], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["first v2", "second"]);
    }
}
