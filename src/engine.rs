//! The docvault service object.
//!
//! [`Engine`] owns every long-lived resource: the catalog and index pools,
//! the embedder (loaded once and shared by indexing and retrieval), the
//! generator, and the extractor. It is built once with [`Engine::open`]
//! and torn down with [`Engine::close`].
//!
//! # Ingestion
//!
//! ```text
//! upload ──▶ copy to upload_dir/{uuid}.{ext} ──▶ catalog record
//!                                                   │
//!                   process_document ◀──────────────┘
//!                   extract ─▶ fallback ─▶ chunk ─▶ deindex ─▶ index
//! ```
//!
//! Extraction and indexing failures during upload do not fail the upload:
//! the record exists and the failure is reported as a warning. `reindex`
//! reprocesses documents to recover.
//!
//! Work on one document id (process, delete) is serialized by a
//! per-document async mutex; different documents proceed concurrently.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docvault_core::answer::{compose_answer, ComposeOptions, Generator};
use docvault_core::catalog::DocumentCatalog;
use docvault_core::chunk::{chunk_text, ChunkParams};
use docvault_core::embedding::Embedder;
use docvault_core::index::{deindex_document, index_document};
use docvault_core::models::{DocumentFormat, DocumentId, DocumentRecord, NewDocument, OwnerId};
use docvault_core::retrieve::{retrieve, Retrieval};
use docvault_core::store::VectorStore;

use crate::catalog::SqliteCatalog;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::{with_fallback, Extractor, OcrEngine, TesseractOcr};
use crate::generation::create_generator;
use crate::migrate;
use crate::vector_store::SqliteVectorStore;

pub const ALLOWED_EXTENSIONS: &str = ".pdf, .png, .jpg, .jpeg, .txt";

/// Externally provided capabilities. [`Engine::open`] builds them from
/// configuration; tests inject their own.
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Providers {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            embedder: create_embedder(&config.embedding)?,
            generator: create_generator(&config.generation)?,
            ocr: Arc::new(TesseractOcr::from_config(&config.extract)),
        })
    }
}

/// Descriptive fields supplied with an upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner: OwnerId,
    pub category: Option<String>,
    pub description: Option<String>,
    pub metadata_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub document: DocumentRecord,
    pub chunks_indexed: usize,
    /// Non-fatal problems; a non-empty list means the document may not be searchable.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetails {
    pub document: DocumentRecord,
    pub indexed_chunks: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexReport {
    pub documents: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<(DocumentId, String)>,
}

type LockTable = Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one document's lock. On drop the table entry is removed once no
/// other task holds or waits on it.
struct DocumentGuard<'a> {
    id: DocumentId,
    table: &'a LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        if let Ok(mut locks) = self.table.lock() {
            if locks
                .get(&self.id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&self.id);
            }
        }
    }
}

pub struct Engine {
    config: Config,
    chunk_params: ChunkParams,
    catalog: Arc<dyn DocumentCatalog>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    extractor: Extractor,
    locks: LockTable,
    pools: Vec<SqlitePool>,
}

impl UploadRequest {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            category: None,
            description: None,
            metadata_info: None,
        }
    }
}

impl Engine {
    /// Open both databases (creating tables if needed) and build providers
    /// from configuration.
    pub async fn open(config: &Config) -> Result<Self> {
        let providers = Providers::from_config(config)?;
        Self::open_with(config, providers).await
    }

    pub async fn open_with(config: &Config, providers: Providers) -> Result<Self> {
        let chunk_params = config.chunking.params()?;

        let catalog_pool = db::connect(&config.db.path).await?;
        migrate::migrate_catalog(&catalog_pool).await?;
        let index_pool = db::connect(&config.index.path).await?;
        migrate::migrate_index(&index_pool).await?;

        debug!(
            db = %config.db.path.display(),
            index = %config.index.path.display(),
            collection = %config.index.collection,
            embedder = providers.embedder.model_name(),
            "engine opened"
        );

        Ok(Self {
            config: config.clone(),
            chunk_params,
            catalog: Arc::new(SqliteCatalog::new(catalog_pool.clone())),
            store: Arc::new(SqliteVectorStore::new(
                index_pool.clone(),
                config.index.collection.clone(),
            )),
            embedder: providers.embedder,
            generator: providers.generator,
            extractor: Extractor::new(providers.ocr),
            locks: Mutex::new(HashMap::new()),
            pools: vec![catalog_pool, index_pool],
        })
    }

    pub async fn close(self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }

    async fn lock_document(&self, id: DocumentId) -> Result<DocumentGuard<'_>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| anyhow!("document lock table poisoned"))?;
            Arc::clone(locks.entry(id).or_default())
        };
        Ok(DocumentGuard {
            id,
            table: &self.locks,
            guard: Some(lock.lock_owned().await),
        })
    }

    /// Store a copy of `source`, record it for `req.owner`, and index it.
    pub async fn upload(&self, source: &Path, req: UploadRequest) -> Result<UploadReport> {
        let format = DocumentFormat::from_path(source).ok_or_else(|| {
            anyhow!(
                "Unsupported file type: {}. Allowed: {}",
                source.display(),
                ALLOWED_EXTENSIONS
            )
        })?;
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid file name: {}", source.display()))?
            .to_string();
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let upload_dir = &self.config.storage.upload_dir;
        tokio::fs::create_dir_all(upload_dir)
            .await
            .with_context(|| format!("Failed to create upload dir: {}", upload_dir.display()))?;
        let stored: PathBuf = upload_dir.join(format!("{}.{}", Uuid::new_v4(), ext));
        tokio::fs::copy(source, &stored)
            .await
            .with_context(|| format!("Failed to store upload: {}", source.display()))?;

        let inserted = self
            .catalog
            .insert_document(&NewDocument {
                owner_id: req.owner,
                filename,
                file_path: stored.to_string_lossy().into_owned(),
                format,
                category: req.category,
                description: req.description,
                metadata_info: req.metadata_info,
            })
            .await;
        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&stored).await {
                    warn!(path = %stored.display(), error = %rm, "failed to remove orphaned upload");
                }
                return Err(e);
            }
        };
        info!(document_id = %record.id, owner = %record.owner_id, format = %format, "document uploaded");

        let mut warnings = Vec::new();
        let chunks_indexed = match self.process_document(&record).await {
            Ok(n) => n,
            Err(e) => {
                warn!(document_id = %record.id, error = %format!("{e:#}"), "indexing failed");
                warnings.push(format!("document stored but not indexed: {e:#}"));
                0
            }
        };

        Ok(UploadReport {
            document: record,
            chunks_indexed,
            warnings,
        })
    }

    /// Extract, chunk and (re)index one document. Returns the number of
    /// entries written. Existing entries for the document are replaced.
    pub async fn process_document(&self, record: &DocumentRecord) -> Result<usize> {
        let _guard = self.lock_document(record.id).await?;

        let text = self
            .extractor
            .extract(Path::new(&record.file_path), record.format)
            .await?;
        let text = with_fallback(text, &record.filename);
        let chunks = chunk_text(record.id, &text, &self.chunk_params);

        deindex_document(self.store.as_ref(), record.id).await?;
        let report =
            index_document(self.store.as_ref(), self.embedder.as_ref(), record.id, &chunks).await?;

        debug!(document_id = %record.id, chunks = report.entries_written, "document processed");
        Ok(report.entries_written)
    }

    /// Remove a document's vector entries, record and stored file.
    /// Returns `false` if `owner` has no such document.
    pub async fn delete(&self, owner: OwnerId, id: DocumentId) -> Result<bool> {
        let record = match self.catalog.get_document(id).await? {
            Some(r) if r.owner_id == owner => r,
            _ => return Ok(false),
        };
        let _guard = self.lock_document(id).await?;

        let removed = deindex_document(self.store.as_ref(), id).await?;
        self.catalog.delete_document(id).await?;
        match tokio::fs::remove_file(&record.file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %record.file_path, "stored file already missing");
            }
            Err(e) => {
                warn!(path = %record.file_path, error = %e, "failed to remove stored file");
            }
        }

        info!(document_id = %id, entries_removed = removed, "document deleted");
        Ok(true)
    }

    /// Reprocess every document (or every document of `owner`).
    /// Per-document failures are collected, not propagated.
    pub async fn reindex(&self, owner: Option<OwnerId>) -> Result<ReindexReport> {
        let docs = match owner {
            Some(o) => self.catalog.documents_owned_by(o).await?,
            None => self.catalog.all_documents().await?,
        };

        let mut report = ReindexReport {
            documents: docs.len(),
            ..ReindexReport::default()
        };
        for doc in &docs {
            match self.process_document(doc).await {
                Ok(n) => report.chunks_indexed += n,
                Err(e) => {
                    warn!(document_id = %doc.id, error = %format!("{e:#}"), "reindex failed");
                    report.failures.push((doc.id, format!("{e:#}")));
                }
            }
        }

        info!(
            documents = report.documents,
            chunks = report.chunks_indexed,
            failures = report.failures.len(),
            "reindex complete"
        );
        Ok(report)
    }

    pub async fn list(&self, owner: OwnerId) -> Result<Vec<DocumentRecord>> {
        self.catalog.documents_owned_by(owner).await
    }

    pub async fn show(&self, owner: OwnerId, id: DocumentId) -> Result<Option<DocumentDetails>> {
        let document = match self.catalog.get_document(id).await? {
            Some(r) if r.owner_id == owner => r,
            _ => return Ok(None),
        };
        let indexed_chunks = self.store.document_entry_ids(id).await?.len();
        Ok(Some(DocumentDetails {
            document,
            indexed_chunks,
        }))
    }

    /// Owner-scoped nearest chunks; `k` defaults to `[retrieval].top_k`.
    pub async fn retrieve(&self, query: &str, owner: OwnerId, k: Option<usize>) -> Result<Retrieval> {
        let k = k.unwrap_or(self.config.retrieval.top_k);
        if k == 0 {
            bail!("k must be >= 1");
        }
        retrieve(
            self.catalog.as_ref(),
            self.store.as_ref(),
            self.embedder.as_ref(),
            query,
            owner,
            k,
        )
        .await
    }

    /// Answer `query` from `owner`'s documents. Never fails; problems are
    /// reported in the returned text.
    pub async fn ask(&self, query: &str, owner: OwnerId) -> String {
        let opts = ComposeOptions {
            top_k: self.config.retrieval.top_k,
            persona: self.config.generation.persona.clone(),
        };
        compose_answer(
            self.catalog.as_ref(),
            self.store.as_ref(),
            self.embedder.as_ref(),
            self.generator.as_ref(),
            query,
            owner,
            &opts,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::generation::DisabledGenerator;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir) -> Engine {
        let config = Config::minimal(&tmp.path().join("data"));
        let providers = Providers {
            embedder: create_embedder(&EmbeddingConfig {
                provider: "disabled".to_string(),
                ..EmbeddingConfig::default()
            })
            .unwrap(),
            generator: Arc::new(DisabledGenerator),
            ocr: Arc::new(TesseractOcr::new(tmp.path().join("no-such-tesseract"))),
        };
        Engine::open_with(&config, providers).await.unwrap()
    }

    fn lock_entries(engine: &Engine) -> usize {
        engine.locks.lock().unwrap().len()
    }

    fn stored_files(engine: &Engine) -> usize {
        match std::fs::read_dir(&engine.config.storage.upload_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn test_lock_table_is_pruned_after_upload_and_delete() {
        let tmp = TempDir::new().unwrap();
        let engine = open(&tmp).await;
        let source = tmp.path().join("note.txt");
        std::fs::write(&source, "Patient has diabetes.").unwrap();

        for _ in 0..20 {
            let report = engine
                .upload(&source, UploadRequest::new(OwnerId(1)))
                .await
                .unwrap();
            assert_eq!(lock_entries(&engine), 0);
            assert!(engine.delete(OwnerId(1), report.document.id).await.unwrap());
        }

        assert_eq!(lock_entries(&engine), 0);
        assert!(engine.list(OwnerId(1)).await.unwrap().is_empty());
        engine.close().await;
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_another_task_waits() {
        let tmp = TempDir::new().unwrap();
        let engine = open(&tmp).await;

        {
            let first = engine.lock_document(DocumentId(7)).await.unwrap();
            let waiting = engine.lock_document(DocumentId(7));
            tokio::pin!(waiting);
            let pending =
                tokio::time::timeout(std::time::Duration::from_millis(20), waiting.as_mut()).await;
            assert!(pending.is_err());

            drop(first);
            assert_eq!(lock_entries(&engine), 1);
            let second = waiting.await.unwrap();
            drop(second);
        }

        assert_eq!(lock_entries(&engine), 0);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_failed_insert_removes_stored_copy() {
        let tmp = TempDir::new().unwrap();
        let engine = open(&tmp).await;
        let source = tmp.path().join("note.txt");
        std::fs::write(&source, "Patient has diabetes.").unwrap();

        sqlx::query("DROP TABLE documents")
            .execute(&engine.pools[0])
            .await
            .unwrap();

        assert!(engine
            .upload(&source, UploadRequest::new(OwnerId(1)))
            .await
            .is_err());
        assert_eq!(stored_files(&engine), 0);
        engine.close().await;
    }
}
