//! Document service: the orchestration layer behind the CLI and HTTP server.
//!
//! [`DocumentService`] wires extraction, chunking, embedding, storage,
//! retrieval, summarization and answering together:
//!
//! ```text
//! bytes ─▶ Extractor ─▶ store.insert_document
//!                          │
//!                          ▼
//!                     chunk_text ─▶ embed_all ─▶ store.replace_chunks ─▶ index
//! ```
//!
//! Chunks and vectors are committed to storage before they are installed in
//! the in-memory index, so the index never holds anything the store lacks.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

use docsage_core::answer::{truncate_at_word, Answerer, Passage};
use docsage_core::chunk::{chunk_text, ChunkParams};
use docsage_core::embedding::{embed_all, embed_query, EmbeddingProvider};
use docsage_core::generate::Generator;
use docsage_core::models::{
    AnswerMode, Chunk, Document, DocumentInfo, Evidence, IngestReport, QueryResult, SearchHit,
    SummaryOutcome,
};
use docsage_core::retriever::InMemoryIndex;
use docsage_core::store::{pair_vectors, DocumentStore};
use docsage_core::summarize::Summarizer;
use docsage_core::{PipelineError, PipelineResult};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::Extractor;
use crate::generate::create_generator;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Answer text when a search ran but nothing cleared `retrieval.min_score`.
pub const NO_MATCH_ANSWER: &str = "No relevant information found in the documents.";

/// Characters of chunk text shown per evidence entry.
const EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct ReindexOutcome {
    pub document_id: String,
    pub chunk_count: usize,
}

/// What [`DocumentService::warm_up`] did with the persisted batches.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmUpReport {
    pub installed: usize,
    pub reembedded: usize,
    pub skipped: usize,
}

pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    index: InMemoryIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Extractor,
    summarizer: Summarizer,
    answerer: Answerer,
    chunk_params: ChunkParams,
    top_k: usize,
    min_score: Option<f32>,
}

impl DocumentService {
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Result<Self> {
        let max_tokens = config.generation.max_tokens;
        Ok(Self {
            store,
            index: InMemoryIndex::new(),
            embedder,
            extractor: Extractor::new(&config.extraction, &config.ocr),
            summarizer: Summarizer::new(generator.clone(), config.summary.params(max_tokens)),
            answerer: Answerer::new(generator, config.answer.params(max_tokens)),
            chunk_params: config.chunking.params()?,
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
        })
    }

    /// Open the SQLite store, build the configured providers and load
    /// persisted vectors into the index.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;

        let service = Self::new(config, store, embedder, generator)?;
        let report = service.warm_up().await?;
        tracing::info!(
            installed = report.installed,
            reembedded = report.reembedded,
            skipped = report.skipped,
            "index warmed up"
        );
        Ok(service)
    }

    /// Extract, persist, chunk, embed and index one upload.
    ///
    /// Extraction errors abort the ingest. An embedding failure does not: the
    /// document is kept (it can still be summarized) and the failure is
    /// reported in [`IngestReport::embedding_error`]. Any other failure after
    /// the document row is written removes the row again.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        declared_mime: Option<&str>,
    ) -> PipelineResult<IngestReport> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(PipelineError::InvalidInput("filename is required".to_string()));
        }

        let extractor = self.extractor.clone();
        let name = filename.to_string();
        let mime = declared_mime.map(str::to_string);
        let extracted = tokio::task::spawn_blocking(move || {
            extractor.extract(&bytes, &name, mime.as_deref())
        })
        .await
        .map_err(|e| PipelineError::ExtractionFailed(format!("extraction worker failed: {}", e)))?
        .map_err(|e| {
            tracing::warn!(filename, error = %e, "extraction failed");
            e
        })?;

        let doc = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_type: extracted.kind.mime().to_string(),
            text: extracted.text,
            created_at: chrono::Utc::now(),
            summary: None,
        };
        self.store.insert_document(&doc).await?;

        let chunks = chunk_text(&doc.id, &doc.text, &self.chunk_params);
        let (chunk_count, embedding_error) = match self.index_chunks(&doc.id, chunks).await {
            Ok(n) => (n, None),
            Err(e @ PipelineError::EmbeddingUnavailable(_)) => {
                tracing::warn!(document_id = %doc.id, error = %e, "document stored without embeddings");
                (0, Some(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(document_id = %doc.id, error = %e, "indexing failed, removing document");
                if let Err(cleanup) = self.store.delete_document(&doc.id).await {
                    tracing::error!(document_id = %doc.id, error = %cleanup, "could not remove partially ingested document");
                }
                self.index.remove(&doc.id);
                return Err(e);
            }
        };

        tracing::info!(
            document_id = %doc.id,
            filename,
            kind = ?extracted.kind,
            chars = doc.text.chars().count(),
            chunks = chunk_count,
            "ingested document"
        );

        Ok(IngestReport {
            document_id: doc.id.clone(),
            filename: doc.filename.clone(),
            kind: extracted.kind,
            char_count: doc.text.chars().count(),
            text: doc.text,
            truncated: extracted.truncated,
            chunk_count,
            embedding_error,
        })
    }

    /// Embed `chunks`, commit them, then install them in the index.
    async fn index_chunks(&self, doc_id: &str, chunks: Vec<Chunk>) -> PipelineResult<usize> {
        let version = self.embedder.version();
        if chunks.is_empty() {
            self.store.replace_chunks(doc_id, &version, &[]).await?;
            self.index.remove(doc_id);
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), &texts).await?;
        let entries = pair_vectors(chunks, vectors)?;
        let count = entries.len();

        self.store.replace_chunks(doc_id, &version, &entries).await?;
        self.index.index(doc_id, version, entries)?;
        Ok(count)
    }

    /// The cached summary, or a fresh one when none exists or `refresh` is set.
    pub async fn summarize(&self, document_id: &str, refresh: bool) -> PipelineResult<SummaryOutcome> {
        let doc = self.get(document_id).await?;
        if let (false, Some(summary)) = (refresh, doc.summary.as_ref()) {
            return Ok(SummaryOutcome {
                document_id: doc.id.clone(),
                filename: doc.filename.clone(),
                summary: summary.clone(),
                mode: None,
                cached: true,
            });
        }

        let summary = self.summarizer.summarize(&doc.text).await?;
        self.store.save_summary(&doc.id, &summary.text).await?;
        tracing::info!(document_id, mode = ?summary.mode, "summarized document");
        Ok(SummaryOutcome {
            document_id: doc.id,
            filename: doc.filename,
            summary: summary.text,
            mode: Some(summary.mode),
            cached: false,
        })
    }

    /// Answer a question over one document or the whole corpus.
    pub async fn query(&self, text: &str, document_id: Option<&str>) -> PipelineResult<QueryResult> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::InvalidInput("query is empty".to_string()));
        }

        let scoped = match document_id {
            Some(id) => Some(self.get(id).await?),
            None => None,
        };
        if self.index.chunk_count(document_id) == 0 {
            return Err(match document_id {
                Some(id) => PipelineError::no_chunks_in_document(id),
                None => PipelineError::no_chunks_in_corpus(),
            });
        }

        let query = embed_query(self.embedder.as_ref(), text).await?;
        let mut hits = self.index.search(&query, self.top_k, document_id)?;
        if let Some(min) = self.min_score {
            hits.retain(|h| h.score >= min);
        }

        if hits.is_empty() {
            tracing::info!(document_id = ?document_id, "query matched nothing above min_score");
            return Ok(QueryResult {
                answer: NO_MATCH_ANSWER.to_string(),
                mode: AnswerMode::NoMatch,
                document_id: scoped.as_ref().map(|d| d.id.clone()).unwrap_or_default(),
                filename: scoped.map(|d| d.filename).unwrap_or_default(),
                evidence: Vec::new(),
            });
        }

        let filenames = self.filenames_for(&hits).await?;
        let name_of = |id: &str| filenames.get(id).cloned().unwrap_or_default();

        let passages: Vec<Passage> = hits
            .iter()
            .map(|h| Passage {
                filename: name_of(&h.chunk.document_id),
                ordinal: h.chunk.ordinal,
                text: h.chunk.text.clone(),
            })
            .collect();
        let primary = hits[0].chunk.document_id.clone();
        let label = name_of(&primary);
        let answer = self.answerer.answer(text, &passages, &label).await?;

        let evidence = hits
            .iter()
            .map(|h| Evidence {
                chunk_id: h.chunk.id.clone(),
                document_id: h.chunk.document_id.clone(),
                filename: name_of(&h.chunk.document_id),
                ordinal: h.chunk.ordinal,
                score: h.score,
                excerpt: truncate_at_word(h.chunk.text.trim(), EXCERPT_CHARS),
            })
            .collect();

        tracing::info!(
            document_id = ?document_id,
            hits = hits.len(),
            mode = ?answer.mode,
            "answered query"
        );
        Ok(QueryResult {
            answer: answer.text,
            mode: answer.mode,
            document_id: primary,
            filename: label,
            evidence,
        })
    }

    async fn filenames_for(&self, hits: &[SearchHit]) -> PipelineResult<HashMap<String, String>> {
        let mut names = HashMap::new();
        for hit in hits {
            let id = &hit.chunk.document_id;
            if names.contains_key(id) {
                continue;
            }
            let filename = self
                .store
                .get_document(id)
                .await?
                .map(|d| d.filename)
                .unwrap_or_default();
            names.insert(id.clone(), filename);
        }
        Ok(names)
    }

    pub async fn list(&self) -> PipelineResult<Vec<DocumentInfo>> {
        self.store.list_documents().await
    }

    pub async fn get(&self, document_id: &str) -> PipelineResult<Document> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::DocumentNotFound(document_id.to_string()))
    }

    /// Remove a document from storage and from the index.
    pub async fn delete(&self, document_id: &str) -> PipelineResult<()> {
        let existed = self.store.delete_document(document_id).await?;
        self.index.remove(document_id);
        if !existed {
            return Err(PipelineError::DocumentNotFound(document_id.to_string()));
        }
        tracing::info!(document_id, "deleted document");
        Ok(())
    }

    /// Re-chunk and re-embed stored text with the current parameters and
    /// provider. Without an id, every document is reindexed.
    pub async fn reindex(&self, document_id: Option<&str>) -> PipelineResult<Vec<ReindexOutcome>> {
        let ids = match document_id {
            Some(id) => vec![self.get(id).await?.id],
            None => self
                .store
                .list_documents()
                .await?
                .into_iter()
                .map(|d| d.id)
                .collect(),
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let text = self
                .store
                .get_document_text(&id)
                .await?
                .ok_or_else(|| PipelineError::DocumentNotFound(id.clone()))?;
            let chunks = chunk_text(&id, &text, &self.chunk_params);
            let chunk_count = self.index_chunks(&id, chunks).await?;
            tracing::info!(document_id = %id, chunks = chunk_count, "reindexed document");
            out.push(ReindexOutcome {
                document_id: id,
                chunk_count,
            });
        }
        Ok(out)
    }

    /// Load persisted vectors into the index.
    ///
    /// Batches tagged with the active provider's version are installed as is.
    /// Others are re-embedded from their stored chunk text, or skipped with a
    /// warning when the provider is unavailable.
    pub async fn warm_up(&self) -> PipelineResult<WarmUpReport> {
        let active = self.embedder.version();
        let mut report = WarmUpReport::default();

        for info in self.store.list_documents().await? {
            let Some(batch) = self.store.load_chunks(&info.id).await? else {
                continue;
            };
            if batch.version == active {
                self.index.index(&info.id, batch.version, batch.chunks)?;
                report.installed += 1;
                continue;
            }

            tracing::warn!(
                document_id = %info.id,
                stored = %batch.version,
                active = %active,
                "embedding version changed, re-embedding"
            );
            let chunks: Vec<Chunk> = batch.chunks.into_iter().map(|e| e.chunk).collect();
            match self.index_chunks(&info.id, chunks).await {
                Ok(_) => report.reembedded += 1,
                Err(e @ PipelineError::EmbeddingUnavailable(_)) => {
                    tracing::warn!(document_id = %info.id, error = %e, "cannot re-embed, document not searchable");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Indexed chunk count across the corpus.
    pub fn indexed_chunks(&self) -> usize {
        self.index.chunk_count(None)
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }
}
