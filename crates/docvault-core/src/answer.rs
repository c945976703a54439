//! Answer composition: retrieval → context block → prompt → generation.
//!
//! [`compose_answer`] never fails. Every failure mode maps to a fixed,
//! user-facing message:
//!
//! | Condition | Answer |
//! |-----------|--------|
//! | owner has no documents | [`NO_DOCUMENTS_MESSAGE`] (generator not called) |
//! | retrieval error | `"[Error] Failed to retrieve context: {reason}"` |
//! | generator credential missing | [`MISSING_CREDENTIAL_MESSAGE`] |
//! | any other generation error | `"[Error] Failed to generate response: {reason}"` |

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::DocumentCatalog;
use crate::embedding::Embedder;
use crate::models::{OwnerId, ScoredEntry};
use crate::retrieve::{retrieve, Retrieval};
use crate::store::VectorStore;

pub const NO_DOCUMENTS_MESSAGE: &str = "You haven't uploaded any documents yet.";

pub const NOT_FOUND_ANSWER: &str = "I cannot find this information in your documents.";

pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "[System] Generation API key is missing. Set the configured API key environment variable and try again.";

pub const DEFAULT_PERSONA: &str = "You are a helpful medical assistant.";

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("generation credential is not configured")]
    MissingCredential,
    #[error("{0}")]
    Failed(String),
}

/// An opaque text-completion service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub top_k: usize,
    pub persona: String,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

/// Join chunk texts, best first, separated by a blank line.
pub fn build_context(chunks: &[ScoredEntry]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(persona: &str, context: &str, question: &str) -> String {
    format!(
        "{persona}\n\
         Instructions:\n\
         1. If the user greets you or says something conversational (e.g. \"hi\", \"hello\", \"thanks\"), \
         respond politely and ask how you can help with their documents or records.\n\
         2. Otherwise, answer the question using ONLY the information in the context below.\n\
         3. If the answer is not contained in the context, say \"{NOT_FOUND_ANSWER}\"\n\
         \n\
         Context:\n{context}\n\
         \n\
         Question:\n{question}\n\
         \n\
         Answer:"
    )
}

/// Answer `query` for `owner` from their indexed documents.
pub async fn compose_answer(
    catalog: &dyn DocumentCatalog,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    query: &str,
    owner: OwnerId,
    opts: &ComposeOptions,
) -> String {
    let chunks = match retrieve(catalog, store, embedder, query, owner, opts.top_k).await {
        Ok(Retrieval::NoDocuments) => return NO_DOCUMENTS_MESSAGE.to_string(),
        Ok(Retrieval::Chunks(chunks)) => chunks,
        Err(e) => {
            warn!(owner = %owner, error = %format!("{e:#}"), "retrieval failed");
            return format!("[Error] Failed to retrieve context: {e:#}");
        }
    };

    let context = build_context(&chunks);
    let prompt = build_prompt(&opts.persona, &context, query);
    debug!(owner = %owner, chunks = chunks.len(), prompt_len = prompt.len(), "calling generator");

    match generator.generate(&prompt).await {
        Ok(answer) => answer,
        Err(GenerationError::MissingCredential) => {
            warn!("generation credential missing");
            MISSING_CREDENTIAL_MESSAGE.to_string()
        }
        Err(GenerationError::Failed(reason)) => {
            warn!(reason = %reason, "generation failed");
            format!("[Error] Failed to generate response: {reason}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use crate::chunk::{chunk_text, ChunkParams};
    use crate::index::index_document;
    use crate::models::{DocumentFormat, DocumentId, NewDocument};
    use crate::store::memory::InMemoryVectorStore;
    use crate::testing::{FailingEmbedder, KeywordEmbedder, ScriptedGenerator};

    async fn seeded(owner: i64, text: &str) -> (InMemoryCatalog, InMemoryVectorStore) {
        let catalog = InMemoryCatalog::new();
        let store = InMemoryVectorStore::new();
        let record = catalog
            .insert_document(&NewDocument {
                owner_id: OwnerId(owner),
                filename: "report.txt".into(),
                file_path: "/tmp/report.txt".into(),
                format: DocumentFormat::PlainText,
                category: None,
                description: None,
                metadata_info: None,
            })
            .await
            .unwrap();
        let chunks = chunk_text(record.id, text, &ChunkParams::default());
        index_document(&store, &KeywordEmbedder::default(), record.id, &chunks)
            .await
            .unwrap();
        (catalog, store)
    }

    fn scored(text: &str) -> ScoredEntry {
        ScoredEntry {
            id: "1_chunk_0".into(),
            document_id: DocumentId(1),
            chunk_index: 0,
            text: text.into(),
            distance: 0.0,
        }
    }

    #[test]
    fn test_context_joins_with_blank_line() {
        let ctx = build_context(&[scored("first"), scored("second")]);
        assert_eq!(ctx, "first\n\nsecond");
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt(DEFAULT_PERSONA, "CTX", "What is my diagnosis?");
        assert!(prompt.starts_with(DEFAULT_PERSONA));
        assert!(prompt.contains(NOT_FOUND_ANSWER));
        assert!(prompt.contains("ONLY"));
        assert!(prompt.ends_with("Context:\nCTX\n\nQuestion:\nWhat is my diagnosis?\n\nAnswer:"));
    }

    #[tokio::test]
    async fn test_no_documents_skips_generation() {
        let (catalog, store) = seeded(1, "Patient has diabetes.").await;
        let embedder = KeywordEmbedder::default();
        let generator = ScriptedGenerator::replying("unused");

        let answer = compose_answer(
            &catalog,
            &store,
            &embedder,
            &generator,
            "What is my diagnosis?",
            OwnerId(2),
            &ComposeOptions::default(),
        )
        .await;

        assert_eq!(answer, NO_DOCUMENTS_MESSAGE);
        assert!(generator.prompts().is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_prompt_carries_retrieved_context() {
        let (catalog, store) = seeded(1, "Patient has diabetes.").await;
        let generator = ScriptedGenerator::replying("You have diabetes.");

        let answer = compose_answer(
            &catalog,
            &store,
            &KeywordEmbedder::default(),
            &generator,
            "What is my diagnosis?",
            OwnerId(1),
            &ComposeOptions::default(),
        )
        .await;

        assert_eq!(answer, "You have diabetes.");
        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Context:\nPatient has diabetes.\n\nQuestion:\nWhat is my diagnosis?"));
    }

    #[tokio::test]
    async fn test_custom_persona_is_used() {
        let (catalog, store) = seeded(1, "Invoice total 42 EUR").await;
        let generator = ScriptedGenerator::replying("42 EUR");
        let opts = ComposeOptions {
            top_k: 1,
            persona: "You are a bookkeeping assistant.".into(),
        };

        compose_answer(&catalog, &store, &KeywordEmbedder::default(), &generator, "total?", OwnerId(1), &opts)
            .await;

        assert!(generator.prompts()[0].starts_with("You are a bookkeeping assistant."));
    }

    #[tokio::test]
    async fn test_missing_credential_message() {
        let (catalog, store) = seeded(1, "Patient has diabetes.").await;
        let generator = ScriptedGenerator::failing(GenerationError::MissingCredential);

        let answer = compose_answer(
            &catalog,
            &store,
            &KeywordEmbedder::default(),
            &generator,
            "diagnosis?",
            OwnerId(1),
            &ComposeOptions::default(),
        )
        .await;

        assert_eq!(answer, MISSING_CREDENTIAL_MESSAGE);
    }

    #[tokio::test]
    async fn test_generation_failure_message() {
        let (catalog, store) = seeded(1, "Patient has diabetes.").await;
        let generator = ScriptedGenerator::failing(GenerationError::Failed("HTTP 503".into()));

        let answer = compose_answer(
            &catalog,
            &store,
            &KeywordEmbedder::default(),
            &generator,
            "diagnosis?",
            OwnerId(1),
            &ComposeOptions::default(),
        )
        .await;

        assert_eq!(answer, "[Error] Failed to generate response: HTTP 503");
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_message() {
        let (catalog, store) = seeded(1, "Patient has diabetes.").await;
        let generator = ScriptedGenerator::replying("unused");

        let answer = compose_answer(
            &catalog,
            &store,
            &FailingEmbedder,
            &generator,
            "diagnosis?",
            OwnerId(1),
            &ComposeOptions::default(),
        )
        .await;

        assert!(answer.starts_with("[Error] Failed to retrieve context:"));
        assert!(answer.contains("unavailable"));
        assert!(generator.prompts().is_empty());
    }
}
