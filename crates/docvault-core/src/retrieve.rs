//! Owner-scoped retrieval.
//!
//! The owner's document ids are resolved through the catalog first; the
//! vector query is then restricted to exactly that set. An owner with no
//! documents short-circuits to [`Retrieval::NoDocuments`] before the
//! embedder or the index is touched.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::catalog::DocumentCatalog;
use crate::embedding::{embed_query, Embedder};
use crate::models::{DocumentId, OwnerId, ScoredEntry};
use crate::store::VectorStore;

/// Result of an owner-scoped retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// The owner has no documents at all.
    NoDocuments,
    /// Nearest chunks, best first. May be empty if nothing is indexed yet.
    Chunks(Vec<ScoredEntry>),
}

impl Retrieval {
    pub fn chunks(&self) -> &[ScoredEntry] {
        match self {
            Retrieval::NoDocuments => &[],
            Retrieval::Chunks(c) => c,
        }
    }
}

/// Return up to `k` chunks nearest to `query`, drawn only from documents
/// owned by `owner`.
pub async fn retrieve(
    catalog: &dyn DocumentCatalog,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    owner: OwnerId,
    k: usize,
) -> Result<Retrieval> {
    let owned: Vec<DocumentId> = catalog
        .documents_owned_by(owner)
        .await
        .with_context(|| format!("failed to list documents of owner {}", owner))?
        .into_iter()
        .map(|d| d.id)
        .collect();

    if owned.is_empty() {
        debug!(owner = %owner, "owner has no documents");
        return Ok(Retrieval::NoDocuments);
    }

    let query_vec = embed_query(embedder, query).await?;
    let hits = store.query(&query_vec, &owned, k).await?;

    let allowed: HashSet<DocumentId> = owned.iter().copied().collect();
    let before = hits.len();
    let hits: Vec<ScoredEntry> = hits
        .into_iter()
        .filter(|h| allowed.contains(&h.document_id))
        .collect();
    if hits.len() != before {
        warn!(
            owner = %owner,
            dropped = before - hits.len(),
            "vector store returned entries outside the owner scope"
        );
    }

    debug!(owner = %owner, documents = owned.len(), hits = hits.len(), "retrieved chunks");
    Ok(Retrieval::Chunks(hits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use crate::chunk::{chunk_text, ChunkParams};
    use crate::index::{deindex_document, index_document};
    use crate::models::{DocumentFormat, NewDocument};
    use crate::store::memory::InMemoryVectorStore;
    use crate::testing::KeywordEmbedder;

    async fn add(
        catalog: &InMemoryCatalog,
        store: &InMemoryVectorStore,
        embedder: &KeywordEmbedder,
        owner: i64,
        text: &str,
    ) -> DocumentId {
        let record = catalog
            .insert_document(&NewDocument {
                owner_id: OwnerId(owner),
                filename: "note.txt".into(),
                file_path: "/tmp/note.txt".into(),
                format: DocumentFormat::PlainText,
                category: None,
                description: None,
                metadata_info: None,
            })
            .await
            .unwrap();
        let chunks = chunk_text(record.id, text, &ChunkParams::default());
        index_document(store, embedder, record.id, &chunks)
            .await
            .unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_owner_without_documents_skips_embedder() {
        let catalog = InMemoryCatalog::new();
        let store = InMemoryVectorStore::new();
        let embedder = KeywordEmbedder::default();
        add(&catalog, &store, &embedder, 1, "Patient has diabetes.").await;
        let calls_before = embedder.calls();

        let result = retrieve(&catalog, &store, &embedder, "diabetes", OwnerId(2), 3)
            .await
            .unwrap();

        assert_eq!(result, Retrieval::NoDocuments);
        assert_eq!(embedder.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_results_never_cross_owners() {
        let catalog = InMemoryCatalog::new();
        let store = InMemoryVectorStore::new();
        let embedder = KeywordEmbedder::default();
        let mine = add(&catalog, &store, &embedder, 1, "blood pressure reading normal").await;
        add(&catalog, &store, &embedder, 2, "diabetes diabetes diabetes").await;

        let result = retrieve(&catalog, &store, &embedder, "diabetes", OwnerId(1), 5)
            .await
            .unwrap();

        let chunks = result.chunks();
        assert_eq!(chunks.len(), 1);
        assert!(chunks.iter().all(|c| c.document_id == mine));
    }

    #[tokio::test]
    async fn test_best_match_ranks_first() {
        let catalog = InMemoryCatalog::new();
        let store = InMemoryVectorStore::new();
        let embedder = KeywordEmbedder::default();
        add(&catalog, &store, &embedder, 1, "cholesterol levels elevated").await;
        let target = add(&catalog, &store, &embedder, 1, "Patient has diabetes.").await;

        let result = retrieve(&catalog, &store, &embedder, "does the patient have diabetes", OwnerId(1), 1)
            .await
            .unwrap();

        assert_eq!(result.chunks().len(), 1);
        assert_eq!(result.chunks()[0].document_id, target);
        assert_eq!(result.chunks()[0].text, "Patient has diabetes.");
    }

    #[tokio::test]
    async fn test_deindexed_document_is_not_retrieved() {
        let catalog = InMemoryCatalog::new();
        let store = InMemoryVectorStore::new();
        let embedder = KeywordEmbedder::default();
        let doc = add(&catalog, &store, &embedder, 1, "Patient has diabetes.").await;
        deindex_document(&store, doc).await.unwrap();

        let result = retrieve(&catalog, &store, &embedder, "diabetes", OwnerId(1), 3)
            .await
            .unwrap();

        // The record still exists, so this is an empty hit list, not NoDocuments.
        assert_eq!(result, Retrieval::Chunks(Vec::new()));
    }
}
