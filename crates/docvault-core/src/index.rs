//! Indexer: embed chunks and persist them as vector entries.
//!
//! [`index_document`] is all-or-nothing: every chunk is embedded before
//! anything is written, and the entries go to the store in one atomic
//! upsert. If the embedder fails, the store is left untouched.
//!
//! `index_document` does not remove entries from a previous indexing of the
//! same document. Callers re-indexing changed content must
//! [`deindex_document`] first or stale higher-index entries survive.

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::embedding::Embedder;
use crate::models::{Chunk, DocumentId, VectorEntry};
use crate::store::VectorStore;

/// Outcome of a successful [`index_document`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub document_id: DocumentId,
    pub entries_written: usize,
}

/// Embed `chunks` and upsert them as entries `{document_id}_chunk_{i}`.
///
/// Every chunk must belong to `document_id`. An empty slice writes nothing
/// and does not call the embedder.
pub async fn index_document(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    document_id: DocumentId,
    chunks: &[Chunk],
) -> Result<IndexReport> {
    if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
        bail!(
            "chunk {} belongs to document {}, not {}",
            stray.chunk_index,
            stray.document_id,
            document_id
        );
    }

    if chunks.is_empty() {
        return Ok(IndexReport {
            document_id,
            entries_written: 0,
        });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder
        .embed(&texts)
        .await
        .with_context(|| format!("embedding failed for document {}", document_id))?;

    if vectors.len() != chunks.len() {
        bail!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dims()) {
        bail!(
            "embedder returned a {}-dim vector, expected {}",
            bad.len(),
            embedder.dims()
        );
    }

    let entries: Vec<VectorEntry> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, embedding)| VectorEntry {
            id: chunk.entry_id(),
            document_id,
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
            content_hash: chunk.hash.clone(),
            embedding,
        })
        .collect();

    store.upsert(&entries).await?;
    debug!(document_id = %document_id, entries = entries.len(), "indexed document");

    Ok(IndexReport {
        document_id,
        entries_written: entries.len(),
    })
}

/// Remove every entry of `document_id`. Idempotent; returns the count removed.
pub async fn deindex_document(store: &dyn VectorStore, document_id: DocumentId) -> Result<usize> {
    let removed = store.delete_document(document_id).await?;
    debug!(document_id = %document_id, removed, "deindexed document");
    Ok(removed)
}
