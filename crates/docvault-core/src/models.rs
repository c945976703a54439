//! Core data models used throughout docvault.
//!
//! These types represent the documents, chunks, and vector entries that flow
//! through the ingestion and retrieval pipeline.

use std::fmt;
use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity of a stored document (relational primary key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the principal that owns documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File format of an uploaded document, resolved once at ingestion.
///
/// Extraction dispatches on this tag rather than on the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Image,
    PlainText,
}

impl DocumentFormat {
    /// Resolve a format from a file extension (case-insensitive, no dot).
    ///
    /// Returns `None` for anything outside the accepted upload types.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Resolve a format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Stable tag used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::PlainText => "text",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "pdf" => Some(Self::Pdf),
            "image" => Some(Self::Image),
            "text" => Some(Self::PlainText),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational record of an uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    /// Original filename as supplied by the uploader.
    pub filename: String,
    /// Resolved path of the stored copy.
    pub file_path: String,
    pub format: DocumentFormat,
    pub upload_date: DateTime<Utc>,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Free-form extra metadata (doctor, hospital, ...), usually JSON.
    pub metadata_info: Option<String>,
}

/// Fields supplied when creating a [`DocumentRecord`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: OwnerId,
    pub filename: String,
    pub file_path: String,
    pub format: DocumentFormat,
    pub category: Option<String>,
    pub description: Option<String>,
    pub metadata_info: Option<String>,
}

/// A window of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub text: String,
    /// Byte range of `text` within the source text.
    pub range: Range<usize>,
    /// SHA-256 of `text`, lowercase hex.
    pub hash: String,
}

impl Chunk {
    /// Key of the vector entry this chunk is stored under.
    pub fn entry_id(&self) -> String {
        entry_id(self.document_id, self.chunk_index)
    }
}

/// Build the vector entry key `{document_id}_chunk_{chunk_index}`.
pub fn entry_id(document_id: DocumentId, chunk_index: usize) -> String {
    format!("{}_chunk_{}", document_id, chunk_index)
}

/// A persisted chunk embedding with its source text and owning document.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub text: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// A vector entry returned from a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub id: String,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub text: String,
    /// Cosine distance to the query (`1 - similarity`); lower is closer.
    pub distance: f32,
}
