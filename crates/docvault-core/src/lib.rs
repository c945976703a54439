//! # docvault core
//!
//! I/O-free logic for docvault: document models, the sliding-window
//! chunker, the embedder and vector-store traits (with an in-memory store),
//! the document catalog trait, and the index / retrieve / compose pipeline.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network clients.
//! Concrete backends (SQLite, fastembed, Gemini, tesseract) live in the
//! `docvault` app crate and are injected through the traits defined here.
//!
//! ```text
//! text ──▶ chunk ──▶ index ──▶ VectorStore ◀── retrieve ◀── query + owner
//!                                                  │
//!                                                  ▼
//!                                        answer::compose_answer ──▶ Generator
//! ```

pub mod answer;
pub mod catalog;
pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod retrieve;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
