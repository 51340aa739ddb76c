//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the [`EmbeddingVersion`] tag attached to every stored vector,
//! a deterministic offline [`HashingEmbedder`], and pure helpers for vector
//! serialization and similarity.
//!
//! Network-backed providers (OpenAI, Ollama, fastembed) live in the
//! `docsage` app crate.

use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, PipelineResult};

/// Identifies the method that produced a vector: `"<model>@<dims>"`.
///
/// Vectors with different versions must never be compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbeddingVersion(String);

impl EmbeddingVersion {
    pub fn new(model: &str, dims: usize) -> Self {
        Self(format!("{}@{}", model, dims))
    }

    /// Wrap a tag read back from storage.
    pub fn from_tag(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmbeddingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query vector together with the version of the method that made it.
#[derive(Debug, Clone)]
pub struct QueryVector {
    pub values: Vec<f32>,
    pub version: EmbeddingVersion,
}

/// Trait for embedding providers.
///
/// Implementations must fail with [`PipelineError::EmbeddingUnavailable`]
/// rather than return placeholder vectors when the backend is missing.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Preferred number of texts per `embed` call.
    fn batch_size(&self) -> usize {
        64
    }

    /// Version tag for vectors produced by this provider.
    fn version(&self) -> EmbeddingVersion {
        EmbeddingVersion::new(self.model_name(), self.dims())
    }

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>>;
}

/// Embed many texts in provider-sized batches, validating the shape of
/// every response.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> PipelineResult<Vec<Vec<f32>>> {
    let batch = provider.batch_size().max(1);
    let mut out = Vec::with_capacity(texts.len());
    for group in texts.chunks(batch) {
        let vectors = provider.embed(group).await?;
        if vectors.len() != group.len() {
            return Err(PipelineError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                group.len()
            )));
        }
        for v in &vectors {
            check_dims(provider, v)?;
        }
        tracing::debug!(batch = group.len(), "embedded batch");
        out.extend(vectors);
    }
    Ok(out)
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> PipelineResult<QueryVector> {
    let values = provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::EmbeddingUnavailable("empty embedding response".to_string()))?;
    check_dims(provider, &values)?;
    Ok(QueryVector {
        values,
        version: provider.version(),
    })
}

fn check_dims(provider: &dyn EmbeddingProvider, v: &[f32]) -> PipelineResult<()> {
    if v.len() != provider.dims() {
        return Err(PipelineError::EmbeddingUnavailable(format!(
            "provider {} returned {} dimensions, expected {}",
            provider.model_name(),
            v.len(),
            provider.dims()
        )));
    }
    Ok(())
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens (and their adjacent pairs) are hashed into
/// `dims` buckets with a sign bit, then L2-normalized. Needs no model files
/// or network, so it serves tests and air-gapped installs.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub const MODEL: &'static str = "hashing-v1";

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Synchronous embedding of one text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut v = vec![0.0f32; self.dims];
        for token in &tokens {
            self.add_feature(&mut v, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut v, bigram.as_bytes(), 0.5);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let idx = (bucket % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        Self::MODEL
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use docsage_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn test_version_tag_format() {
        assert_eq!(EmbeddingVersion::new("m", 8).as_str(), "m@8");
        assert_eq!(HashingEmbedder::new(64).version().as_str(), "hashing-v1@64");
    }

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(128);
        let a = e.embed_one("The quick brown fox");
        let b = e.embed_one("the QUICK brown fox!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_similarity_tracks_overlap() {
        let e = HashingEmbedder::new(256);
        let q = e.embed_one("invoice payment terms");
        let near = e.embed_one("the invoice payment terms are thirty days");
        let far = e.embed_one("mountain hiking trail weather");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed_one("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_embed_all_rejects_wrong_dims() {
        let err = embed_all(&ShortProvider, &["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embed_query_carries_version() {
        let e = HashingEmbedder::new(32);
        let q = embed_query(&e, "hello").await.unwrap();
        assert_eq!(q.values.len(), 32);
        assert_eq!(q.version, e.version());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
