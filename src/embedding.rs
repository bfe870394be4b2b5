//! Embedding provider abstraction and implementations.
//!
//! The embedding provider is an external collaborator: the pipeline hands
//! it chunk text and gets fixed-dimension vectors back. It is treated as a
//! black box with bounded latency and possible transient failure — the
//! [`HttpProvider`] retries with exponential backoff, and a chunk whose
//! embedding never arrives stays searchable through the lexical path.
//!
//! Implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are
//!   not configured (lexical-only deployments).
//! - **[`HttpProvider`]** — calls an OpenAI-compatible embeddings endpoint
//!   with batching, retry, and backoff.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] / [`dot_product`] — similarity measures
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB codec for
//!   SQLite storage

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding providers: `embed(texts) → vectors`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"bge-m3"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration; the
/// query engine then runs lexical-only and does not flag responses as
/// partial.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding("embedding provider is disabled".to_string()))
    }
}

// ============ HTTP Provider ============

/// Embedding provider calling an OpenAI-compatible HTTP endpoint.
///
/// Sends `POST {endpoint}` with `{"model": ..., "input": [...]}` and reads
/// `data[].embedding` from the response.
///
/// Retry strategy:
/// - HTTP 429 (rate limited) and 5xx (server error) → retry
/// - HTTP 4xx (client error, not 429) → fail immediately
/// - Network errors → retry
/// - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
pub struct HttpProvider {
    endpoint: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
    max_retries: u32,
    timeout: Duration,
}

impl HttpProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("embedding.endpoint required for http provider".into()))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("embedding.model required for http provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Config("embedding.dims required for http provider".into()))?;

        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                Error::Config(format!("environment variable {var} not set"))
            })?),
            None => None,
        };

        Ok(Self {
            endpoint,
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::Embedding(e.to_string()))?;
                        return parse_embedding_response(&json, self.dims);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Embedding(format!(
                            "embedding API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Embedding(format!(
                        "embedding API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::Embedding(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Embedding("embedding failed after retries".into())))
    }
}

/// Parse an OpenAI-compatible embeddings response, checking dimensions.
fn parse_embedding_response(json: &serde_json::Value, dims: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Embedding("invalid response: missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Embedding("invalid response: missing embedding".into()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != dims {
            return Err(Error::Embedding(format!(
                "dimension mismatch: expected {dims}, got {}",
                vec.len()
            )));
        }

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Create the appropriate provider based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "http" => Ok(Arc::new(HttpProvider::new(config)?)),
        other => Err(Error::Config(format!("unknown embedding provider: {other}"))),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
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
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
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

/// Inner product of two embedding vectors; `0.0` on length mismatch.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_dot_product() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
        assert_eq!(dot_product(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_parse_response_checks_dims() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2, 0.3] },
                { "embedding": [0.4, 0.5, 0.6] }
            ]
        });
        let parsed = parse_embedding_response(&json, 3).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec![0.1, 0.2, 0.3]);

        assert!(parse_embedding_response(&json, 4).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let provider = DisabledProvider;
        let err = provider.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
