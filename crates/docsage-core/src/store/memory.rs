//! In-memory [`DocumentStore`] implementation for tests and ephemeral runs.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Documents and their chunk
//! batches live in one map entry, so replacing a batch is a single insert.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::EmbeddingVersion;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Document, DocumentInfo};
use crate::retriever::IndexedChunk;

use super::{DocumentStore, StoredBatch};

struct Entry {
    doc: Document,
    batch: Option<StoredBatch>,
}

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> PipelineResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        if docs.contains_key(&doc.id) {
            return Err(PipelineError::Storage(format!("duplicate document id {}", doc.id)));
        }
        docs.insert(
            doc.id.clone(),
            Entry {
                doc: doc.clone(),
                batch: None,
            },
        );
        Ok(())
    }

    async fn get_document(&self, id: &str) -> PipelineResult<Option<Document>> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        Ok(docs.get(id).map(|e| e.doc.clone()))
    }

    async fn save_summary(&self, id: &str, summary: &str) -> PipelineResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let entry = docs
            .get_mut(id)
            .ok_or_else(|| PipelineError::DocumentNotFound(id.to_string()))?;
        entry.doc.summary = Some(summary.to_string());
        Ok(())
    }

    async fn list_documents(&self) -> PipelineResult<Vec<DocumentInfo>> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<DocumentInfo> = docs
            .values()
            .map(|e| DocumentInfo {
                id: e.doc.id.clone(),
                filename: e.doc.filename.clone(),
                content_type: e.doc.content_type.clone(),
                created_at: e.doc.created_at,
                char_count: e.doc.text.chars().count(),
                chunk_count: e.batch.as_ref().map(|b| b.chunks.len()).unwrap_or(0),
                summary: e.doc.summary.clone(),
            })
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete_document(&self, id: &str) -> PipelineResult<bool> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        Ok(docs.remove(id).is_some())
    }

    async fn replace_chunks(
        &self,
        doc_id: &str,
        version: &EmbeddingVersion,
        chunks: &[IndexedChunk],
    ) -> PipelineResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let entry = docs
            .get_mut(doc_id)
            .ok_or_else(|| PipelineError::DocumentNotFound(doc_id.to_string()))?;
        entry.batch = if chunks.is_empty() {
            None
        } else {
            Some(StoredBatch {
                version: version.clone(),
                chunks: chunks.to_vec(),
            })
        };
        Ok(())
    }

    async fn load_chunks(&self, doc_id: &str) -> PipelineResult<Option<StoredBatch>> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        Ok(docs.get(doc_id).and_then(|e| e.batch.clone()))
    }
}
