//! In-memory vector index over chunk embeddings.
//!
//! Each document's chunks are held as one immutable [`DocumentBatch`]
//! behind an `Arc`. Indexing builds the batch off-lock and swaps it in under
//! a short write lock, so a concurrent search sees either the old batch or
//! the new one, never a mix. Searches clone the relevant `Arc`s under a read
//! lock and score outside it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::embedding::{cosine_similarity, EmbeddingVersion, QueryVector};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Chunk, SearchHit};

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// All indexed chunks of one document, produced by one embedding method.
#[derive(Debug)]
pub struct DocumentBatch {
    pub version: EmbeddingVersion,
    pub entries: Vec<IndexedChunk>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    docs: RwLock<HashMap<String, Arc<DocumentBatch>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the indexed chunks of `document_id`.
    ///
    /// An empty `entries` removes the document from the index. Every vector
    /// must have the same length and every chunk must belong to the document.
    pub fn index(
        &self,
        document_id: &str,
        version: EmbeddingVersion,
        mut entries: Vec<IndexedChunk>,
    ) -> PipelineResult<()> {
        if entries.is_empty() {
            self.remove(document_id);
            return Ok(());
        }
        let dims = entries[0].vector.len();
        for e in &entries {
            if e.chunk.document_id != document_id {
                return Err(PipelineError::InvalidInput(format!(
                    "chunk {} belongs to {}, not {}",
                    e.chunk.id, e.chunk.document_id, document_id
                )));
            }
            if e.vector.len() != dims {
                return Err(PipelineError::InvalidInput(format!(
                    "chunk {} has {} dimensions, batch has {}",
                    e.chunk.id,
                    e.vector.len(),
                    dims
                )));
            }
        }
        entries.sort_by_key(|e| e.chunk.ordinal);

        let count = entries.len();
        let batch = Arc::new(DocumentBatch { version, entries });
        self.docs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document_id.to_string(), batch);
        tracing::debug!(document_id, chunks = count, "indexed document");
        Ok(())
    }

    /// Drop a document from the index. Returns whether it was present.
    pub fn remove(&self, document_id: &str) -> bool {
        self.docs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(document_id)
            .is_some()
    }

    /// Number of indexed chunks for one document, or for the whole corpus.
    pub fn chunk_count(&self, document_id: Option<&str>) -> usize {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        match document_id {
            Some(id) => docs.get(id).map(|b| b.entries.len()).unwrap_or(0),
            None => docs.values().map(|b| b.entries.len()).sum(),
        }
    }

    /// Return up to `k` chunks ranked by cosine similarity to `query`.
    ///
    /// With a `document_id` filter only that document is searched and a
    /// version mismatch is an error. Corpus-wide, documents indexed with a
    /// different embedding method are skipped; the search fails only when
    /// no document is comparable.
    ///
    /// Ties are broken by lower ordinal, then by document id.
    pub fn search(
        &self,
        query: &QueryVector,
        k: usize,
        document_id: Option<&str>,
    ) -> PipelineResult<Vec<SearchHit>> {
        let batches = self.snapshot(document_id)?;

        let mut comparable = Vec::with_capacity(batches.len());
        let mut first_mismatch = None;
        for (id, batch) in &batches {
            if batch.version == query.version {
                comparable.push(batch);
            } else if first_mismatch.is_none() {
                first_mismatch = Some((id.clone(), batch.version.clone()));
            }
        }
        if let Some((id, indexed)) = &first_mismatch {
            if document_id.is_some() || comparable.is_empty() {
                return Err(PipelineError::EmbeddingVersionMismatch {
                    document_id: id.clone(),
                    indexed: indexed.to_string(),
                    query: query.version.to_string(),
                });
            }
            tracing::warn!(
                document_id = %id,
                indexed = %indexed,
                query = %query.version,
                "skipping documents indexed with a different embedding version"
            );
        }

        let mut scored: Vec<(f32, &IndexedChunk)> = comparable
            .iter()
            .flat_map(|b| b.entries.iter())
            .map(|e| (cosine_similarity(&query.values, &e.vector), e))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| SearchHit {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    /// Clone the batches in scope, failing when the scope has no chunks.
    fn snapshot(&self, document_id: Option<&str>) -> PipelineResult<Vec<(String, Arc<DocumentBatch>)>> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        match document_id {
            Some(id) => match docs.get(id) {
                Some(b) if !b.entries.is_empty() => Ok(vec![(id.to_string(), Arc::clone(b))]),
                _ => Err(PipelineError::no_chunks_in_document(id)),
            },
            None => {
                let all: Vec<_> = docs
                    .iter()
                    .filter(|(_, b)| !b.entries.is_empty())
                    .map(|(id, b)| (id.clone(), Arc::clone(b)))
                    .collect();
                if all.is_empty() {
                    return Err(PipelineError::no_chunks_in_corpus());
                }
                Ok(all)
            }
        }
    }
}
