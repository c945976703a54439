//! Relational document catalog abstraction.
//!
//! The catalog is the system of record for documents and their ownership.
//! The retriever only needs [`documents_owned_by`](DocumentCatalog::documents_owned_by);
//! the ingestion pipeline uses the rest.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentId, DocumentRecord, NewDocument, OwnerId};

#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    /// Create a record and return it with its assigned id.
    async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentRecord>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>>;

    /// All documents owned by `owner`, ordered by id.
    async fn documents_owned_by(&self, owner: OwnerId) -> Result<Vec<DocumentRecord>>;

    /// Every document in the catalog, ordered by id.
    async fn all_documents(&self) -> Result<Vec<DocumentRecord>>;

    /// Delete a record. Returns `false` if it did not exist.
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;
}

pub mod memory {
    //! In-memory [`DocumentCatalog`] for tests and ephemeral use.

    use std::collections::BTreeMap;
    use std::sync::RwLock;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;

    use super::DocumentCatalog;
    use crate::models::{DocumentId, DocumentRecord, NewDocument, OwnerId};

    #[derive(Default)]
    struct Inner {
        docs: BTreeMap<DocumentId, DocumentRecord>,
        next_id: i64,
    }

    /// Catalog backed by a `BTreeMap`; ids are assigned from 1 upwards.
    #[derive(Default)]
    pub struct InMemoryCatalog {
        inner: RwLock<Inner>,
    }

    impl InMemoryCatalog {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn poisoned<T>(_: T) -> anyhow::Error {
        anyhow!("in-memory catalog lock poisoned")
    }

    #[async_trait]
    impl DocumentCatalog for InMemoryCatalog {
        async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentRecord> {
            let mut inner = self.inner.write().map_err(poisoned)?;
            inner.next_id += 1;
            let record = DocumentRecord {
                id: DocumentId(inner.next_id),
                owner_id: doc.owner_id,
                filename: doc.filename.clone(),
                file_path: doc.file_path.clone(),
                format: doc.format,
                upload_date: Utc::now(),
                category: doc.category.clone(),
                description: doc.description.clone(),
                metadata_info: doc.metadata_info.clone(),
            };
            inner.docs.insert(record.id, record.clone());
            Ok(record)
        }

        async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner.docs.get(&id).cloned())
        }

        async fn documents_owned_by(&self, owner: OwnerId) -> Result<Vec<DocumentRecord>> {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner
                .docs
                .values()
                .filter(|d| d.owner_id == owner)
                .cloned()
                .collect())
        }

        async fn all_documents(&self) -> Result<Vec<DocumentRecord>> {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner.docs.values().cloned().collect())
        }

        async fn delete_document(&self, id: DocumentId) -> Result<bool> {
            let mut inner = self.inner.write().map_err(poisoned)?;
            Ok(inner.docs.remove(&id).is_some())
        }
    }
}
