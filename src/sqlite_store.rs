//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Documents and chunks live in two tables (see `migrate.rs`). Chunk vectors
//! are little-endian `f32` BLOBs tagged with their embedding version.
//! [`replace_chunks`](DocumentStore::replace_chunks) runs in a single
//! transaction, so a reader never sees half a batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docsage_core::embedding::{blob_to_vec, vec_to_blob, EmbeddingVersion};
use docsage_core::models::{Chunk, Document, DocumentInfo};
use docsage_core::retriever::IndexedChunk;
use docsage_core::store::{DocumentStore, StoredBatch};
use docsage_core::{PipelineError, PipelineResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> PipelineError {
    PipelineError::Storage(e.to_string())
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        text: row.get("text"),
        created_at: from_millis(row.get("created_at")),
        summary: row.get("summary"),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, content_type, text, created_at, summary)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.content_type)
        .bind(&doc.text)
        .bind(doc.created_at.timestamp_millis())
        .bind(&doc.summary)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> PipelineResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, filename, content_type, text, created_at, summary FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn get_document_text(&self, id: &str) -> PipelineResult<Option<String>> {
        sqlx::query_scalar("SELECT text FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)
    }

    async fn save_summary(&self, id: &str, summary: &str) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE documents SET summary = ? WHERE id = ?")
            .bind(summary)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_documents(&self) -> PipelineResult<Vec<DocumentInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.filename, d.content_type, d.created_at, d.summary,
                   length(d.text) AS char_count,
                   (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
            FROM documents d
            ORDER BY d.created_at DESC, d.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .iter()
            .map(|row| DocumentInfo {
                id: row.get("id"),
                filename: row.get("filename"),
                content_type: row.get("content_type"),
                created_at: from_millis(row.get("created_at")),
                char_count: row.get::<i64, _>("char_count") as usize,
                chunk_count: row.get::<i64, _>("chunk_count") as usize,
                summary: row.get("summary"),
            })
            .collect())
    }

    async fn delete_document(&self, id: &str) -> PipelineResult<bool> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_chunks(
        &self,
        doc_id: &str,
        version: &EmbeddingVersion,
        chunks: &[IndexedChunk],
    ) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        if !exists {
            return Err(PipelineError::DocumentNotFound(doc_id.to_string()));
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for entry in chunks {
            let chunk = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, ordinal, text, char_start, char_end,
                                    hash, embedding_version, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(doc_id)
            .bind(chunk.ordinal as i64)
            .bind(&chunk.text)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(&chunk.hash)
            .bind(version.as_str())
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn load_chunks(&self, doc_id: &str) -> PipelineResult<Option<StoredBatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, ordinal, text, char_start, char_end, hash,
                   embedding_version, embedding
            FROM chunks
            WHERE document_id = ?
            ORDER BY ordinal ASC
            "#,
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let version = EmbeddingVersion::from_tag(first.get::<String, _>("embedding_version"));

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let tag: String = row.get("embedding_version");
            if tag != version.as_str() {
                return Err(PipelineError::Storage(format!(
                    "document {} has chunks from mixed embedding versions ({} and {})",
                    doc_id, version, tag
                )));
            }
            let blob: Vec<u8> = row.get("embedding");
            chunks.push(IndexedChunk {
                chunk: Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    ordinal: row.get::<i64, _>("ordinal") as usize,
                    text: row.get("text"),
                    char_start: row.get::<i64, _>("char_start") as usize,
                    char_end: row.get::<i64, _>("char_end") as usize,
                    hash: row.get("hash"),
                },
                vector: blob_to_vec(&blob),
            });
        }
        Ok(Some(StoredBatch { version, chunks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::TimeZone;
    use docsage_core::chunk::{chunk_text, ChunkParams};
    use docsage_core::store::pair_vectors;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> SqliteStore {
        let mut config = Config::default();
        config.db.path = tmp.path().join("data").join("test.sqlite");
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn doc(id: &str, secs: i64) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            content_type: "text/plain".to_string(),
            text: "Ünïcode text for the store. ".repeat(20),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            summary: None,
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip_and_listing() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store.insert_document(&doc("old", 100)).await.unwrap();
        store.insert_document(&doc("new", 200)).await.unwrap();

        let got = store.get_document("old").await.unwrap().unwrap();
        assert_eq!(got.created_at, Utc.timestamp_opt(100, 0).unwrap());
        assert!(store.get_document("missing").await.unwrap().is_none());

        let list = store.list_documents().await.unwrap();
        let ids: Vec<_> = list.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(list[0].char_count, got.text.chars().count());
        assert_eq!(list[0].chunk_count, 0);
    }

    #[tokio::test]
    async fn test_summary_update() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store.insert_document(&doc("d", 1)).await.unwrap();
        store.save_summary("d", "short").await.unwrap();
        assert_eq!(
            store.get_document("d").await.unwrap().unwrap().summary.as_deref(),
            Some("short")
        );
        assert!(matches!(
            store.save_summary("nope", "x").await,
            Err(PipelineError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_and_load_chunks() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let d = doc("d", 1);
        store.insert_document(&d).await.unwrap();

        let chunks = chunk_text("d", &d.text, &ChunkParams::new(100, 20).unwrap());
        let vectors: Vec<Vec<f32>> = (0..chunks.len()).map(|i| vec![i as f32, 0.5]).collect();
        let version = EmbeddingVersion::new("m", 2);
        let entries = pair_vectors(chunks.clone(), vectors).unwrap();
        store.replace_chunks("d", &version, &entries).await.unwrap();

        let batch = store.load_chunks("d").await.unwrap().unwrap();
        assert_eq!(batch.version, version);
        assert_eq!(batch.chunks.len(), chunks.len());
        assert_eq!(batch.chunks[0].chunk, chunks[0]);
        assert_eq!(batch.chunks[1].vector, vec![1.0, 0.5]);

        // Replacing with nothing clears the batch.
        store.replace_chunks("d", &version, &[]).await.unwrap();
        assert!(store.load_chunks("d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let d = doc("d", 1);
        store.insert_document(&d).await.unwrap();
        let chunks = chunk_text("d", &d.text, &ChunkParams::new(200, 0).unwrap());
        let vectors = vec![vec![1.0]; chunks.len()];
        let entries = pair_vectors(chunks, vectors).unwrap();
        store
            .replace_chunks("d", &EmbeddingVersion::new("m", 1), &entries)
            .await
            .unwrap();

        assert!(store.delete_document("d").await.unwrap());
        assert!(!store.delete_document("d").await.unwrap());
        assert!(store.load_chunks("d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_chunks_unknown_document() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        assert!(matches!(
            store
                .replace_chunks("ghost", &EmbeddingVersion::new("m", 1), &[])
                .await,
            Err(PipelineError::DocumentNotFound(_))
        ));
    }
}
