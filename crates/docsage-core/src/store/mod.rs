//! Storage abstraction for docsage.
//!
//! The [`DocumentStore`] trait defines the persistence operations the
//! pipeline needs: document rows, cached summaries, and chunk batches with
//! their version-tagged vectors. The SQLite backend lives in the application
//! crate; [`memory::InMemoryStore`] backs tests and ephemeral runs.
//!
//! Stored vectors are a cache for warm start, not a search structure. All
//! similarity search goes through [`InMemoryIndex`](crate::retriever::InMemoryIndex).

pub mod memory;

use async_trait::async_trait;

use crate::embedding::EmbeddingVersion;
use crate::error::PipelineResult;
use crate::models::{Chunk, Document, DocumentInfo};
use crate::retriever::IndexedChunk;

/// A document's persisted chunk batch.
#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub version: EmbeddingVersion,
    pub chunks: Vec<IndexedChunk>,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](DocumentStore::insert_document) | Persist a newly extracted document |
/// | [`get_document`](DocumentStore::get_document) | Full document by id |
/// | [`save_summary`](DocumentStore::save_summary) | Cache a summary |
/// | [`list_documents`](DocumentStore::list_documents) | Metadata for every document |
/// | [`delete_document`](DocumentStore::delete_document) | Remove a document and its chunks |
/// | [`replace_chunks`](DocumentStore::replace_chunks) | Atomically swap a document's chunk batch |
/// | [`load_chunks`](DocumentStore::load_chunks) | Read a document's chunk batch back |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> PipelineResult<()>;

    async fn get_document(&self, id: &str) -> PipelineResult<Option<Document>>;

    /// Just the extracted text of a document.
    async fn get_document_text(&self, id: &str) -> PipelineResult<Option<String>> {
        Ok(self.get_document(id).await?.map(|d| d.text))
    }

    /// Overwrite the cached summary. Fails with `DocumentNotFound` for an
    /// unknown id.
    async fn save_summary(&self, id: &str, summary: &str) -> PipelineResult<()>;

    /// All documents, newest first.
    async fn list_documents(&self) -> PipelineResult<Vec<DocumentInfo>>;

    /// Remove a document and its chunks. Returns whether it existed.
    async fn delete_document(&self, id: &str) -> PipelineResult<bool>;

    /// Replace every chunk of `doc_id` with `chunks`, all-or-nothing.
    async fn replace_chunks(
        &self,
        doc_id: &str,
        version: &EmbeddingVersion,
        chunks: &[IndexedChunk],
    ) -> PipelineResult<()>;

    /// The persisted batch of `doc_id`, or `None` when it has no chunks.
    async fn load_chunks(&self, doc_id: &str) -> PipelineResult<Option<StoredBatch>>;
}

/// Pair chunks with vectors, failing when the counts differ.
pub fn pair_vectors(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> PipelineResult<Vec<IndexedChunk>> {
    if chunks.len() != vectors.len() {
        return Err(crate::PipelineError::EmbeddingUnavailable(format!(
            "{} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }
    Ok(chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexedChunk { chunk, vector })
        .collect())
}
