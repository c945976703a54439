//! # docvault
//!
//! Ask questions about your own documents. Uploads (PDF, images, plain
//! text) are extracted, chunked and embedded into a persistent vector
//! index; questions are answered from the asking owner's documents only.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  upload  │──▶│ extract+chunk │──▶│ vector index │
//! │  (dv)    │   │   + embed     │   │   (SQLite)   │
//! └──────────┘   └───────────────┘   └──────┬───────┘
//!                                           │ owner-scoped kNN
//!                ┌───────────────┐   ┌──────▼───────┐
//!   answer  ◀────│   generator   │◀──│   retrieve   │◀── question
//!                │   (Gemini)    │   │  + compose   │
//!                └───────────────┘   └──────────────┘
//! ```
//!
//! The pure pipeline (chunking, indexing, retrieval, answer composition)
//! lives in `docvault-core`; this crate supplies SQLite persistence,
//! embedding and generation providers, text extraction, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! dv init
//! dv upload ./lab-report.pdf --owner 1 --category "Lab Report"
//! dv ask "What was my HbA1c?" --owner 1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema creation |
//! | [`catalog`] | SQLite document catalog |
//! | [`vector_store`] | SQLite persistent vector index |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generation providers |
//! | [`extract`] | PDF / OCR / text extraction |
//! | [`engine`] | Upload, delete, reindex, retrieve and ask |

pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod generation;
pub mod migrate;
pub mod vector_store;
