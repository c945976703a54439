//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the persistence primitives the indexer
//! and retriever rely on. Writes go through the store's own atomic
//! operations (batch upsert, delete-by-document) so that concurrent queries
//! never observe a half-written document and callers never need a
//! read-modify-write cycle.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{DocumentId, ScoredEntry, VectorEntry};

/// Persistent collection of [`VectorEntry`]s keyed by entry id.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite a batch of entries atomically |
/// | [`delete_document`](VectorStore::delete_document) | Remove every entry of one document |
/// | [`query`](VectorStore::query) | Filtered nearest-neighbour search |
/// | [`document_entry_ids`](VectorStore::document_entry_ids) | List a document's entry ids |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite `entries` by id. Either every entry is written or
    /// none is. Overwriting keeps the entry's original insertion position.
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()>;

    /// Remove all entries whose document id equals `document_id`.
    /// Returns the number removed; removing nothing is not an error.
    async fn delete_document(&self, document_id: DocumentId) -> Result<usize>;

    /// Return at most `k` entries whose document id is in `filter`, ordered
    /// by increasing cosine distance to `query_vec`, ties broken by
    /// insertion order. An empty filter matches nothing.
    async fn query(
        &self,
        query_vec: &[f32],
        filter: &[DocumentId],
        k: usize,
    ) -> Result<Vec<ScoredEntry>>;

    /// Entry ids stored for `document_id`, ordered by chunk index.
    async fn document_entry_ids(&self, document_id: DocumentId) -> Result<Vec<String>>;
}

/// Rank candidates by cosine distance to `query_vec` and keep the best `k`.
///
/// Each candidate carries its insertion sequence number, used as the
/// tie-breaker so equal distances order deterministically.
pub fn rank_nearest<'a, I>(query_vec: &[f32], candidates: I, k: usize) -> Vec<ScoredEntry>
where
    I: IntoIterator<Item = (i64, &'a VectorEntry)>,
{
    let mut scored: Vec<(f32, i64, &VectorEntry)> = candidates
        .into_iter()
        .map(|(seq, e)| (cosine_distance(query_vec, &e.embedding), seq, e))
        .collect();

    scored.sort_by(|a, b| match a.0.total_cmp(&b.0) {
        Ordering::Equal => a.1.cmp(&b.1),
        other => other,
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(distance, _, e)| ScoredEntry {
            id: e.id.clone(),
            document_id: e.document_id,
            chunk_index: e.chunk_index,
            text: e.text.clone(),
            distance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, doc: i64, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: id.to_string(),
            document_id: DocumentId(doc),
            chunk_index: 0,
            text: id.to_string(),
            content_hash: String::new(),
            embedding,
        }
    }

    #[test]
    fn test_rank_orders_by_distance_then_sequence() {
        let a = entry("a", 1, vec![0.0, 1.0]);
        let b = entry("b", 1, vec![1.0, 0.0]);
        let c = entry("c", 2, vec![1.0, 0.0]);
        let ranked = rank_nearest(&[1.0, 0.0], vec![(3, &c), (1, &a), (2, &b)], 10);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(ranked[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let a = entry("a", 1, vec![1.0]);
        let b = entry("b", 1, vec![1.0]);
        assert_eq!(rank_nearest(&[1.0], vec![(1, &a), (2, &b)], 1).len(), 1);
        assert!(rank_nearest(&[1.0], vec![(1, &a)], 0).is_empty());
    }
}
