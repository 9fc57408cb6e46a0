//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete HTTP implementations:
//! - **[`GeminiEmbedder`]**: Google Generative Language `batchEmbedContents`.
//! - **[`OpenAIEmbedder`]**: OpenAI `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides vector utilities used by the index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` byte encoding
//!
//! # Retry Strategy
//!
//! All providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{provider_api_key, EmbeddingConfig};
use crate::error::{RagError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// A function from texts to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"models/embedding-001"`).
    fn model_name(&self) -> &str;

    /// Dimensionality of every vector this embedder produces.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query. Providers with distinct query and document
    /// modes override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| RagError::Embedding {
            provider: self.model_name().to_string(),
            message: "empty embedding response".to_string(),
        })
    }
}

/// Embed `texts` in batches of `batch_size`, checking count and dimensionality.
pub async fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(RagError::Embedding {
                provider: embedder.model_name().to_string(),
                message: format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    embedded.len()
                ),
            });
        }
        for v in &embedded {
            check_dims(embedder.dims(), v.len())?;
        }
        tracing::debug!(batch = batch.len(), done = vectors.len() + batch.len(), total = texts.len(), "embedded batch");
        vectors.extend(embedded);
    }
    Ok(vectors)
}

pub fn check_dims(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// Fails with [`RagError::Configuration`] when the provider is unknown or
/// its API key is missing; no network call is made here.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let api_key = provider_api_key(&config.provider)?;
    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;
    let transport = Transport {
        client,
        max_retries: config.max_retries,
    };
    let model = config.model_name();
    let dims = config.dimensions();

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiEmbedder {
            transport,
            api_key: api_key.unwrap_or_default(),
            model: if model.starts_with("models/") {
                model
            } else {
                format!("models/{}", model)
            },
            dims,
            base_url: config.url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })),
        "openai" => Ok(Arc::new(OpenAIEmbedder {
            transport,
            api_key: api_key.unwrap_or_default(),
            model,
            dims,
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })),
        "ollama" => Ok(Arc::new(OllamaEmbedder {
            transport,
            model,
            dims,
            base_url: config.url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
        })),
        other => Err(RagError::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// HTTP client plus the retry policy shared by all providers.
struct Transport {
    client: reqwest::Client,
    max_retries: u32,
}

impl Transport {
    /// POST `body` as JSON, retrying on 429, 5xx, and network errors.
    async fn post_json(
        &self,
        provider: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let fail = |message: String| RagError::Embedding {
            provider: provider.to_string(),
            message,
        };
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(provider, attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| fail(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = fail(format!("API error {}: {}", status, body_text));

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(provider, %status, "transient embedding failure");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    tracing::warn!(provider, error = %e, "embedding request failed");
                    last_err = Some(fail(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| fail("embedding failed after retries".to_string())))
    }
}

// ============ Gemini ============

pub struct GeminiEmbedder {
    transport: Transport,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl GeminiEmbedder {
    async fn embed_with_task(&self, texts: &[String], task_type: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": t }] },
                    "taskType": task_type,
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);
        let json = self
            .transport
            .post_json("gemini", &url, &[("x-goog-api-key", self.api_key.as_str())], &body)
            .await?;
        parse_gemini_response(&json)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_with_task(texts, "RETRIEVAL_DOCUMENT").await
    }
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_with_task(&[text.to_string()], "RETRIEVAL_QUERY")
            .await?;
        vectors.pop().ok_or_else(|| RagError::Embedding {
            provider: "gemini".to_string(),
            message: "empty embedding response".to_string(),
        })
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid_response("gemini", "missing embeddings array"))?;

    embeddings
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(|v| v.as_array())
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| invalid_response("gemini", "missing values"))
        })
        .collect()
}

// ============ OpenAI ============

pub struct OpenAIEmbedder {
    transport: Transport,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let auth = format!("Bearer {}", self.api_key);
        let json = self
            .transport
            .post_json(
                "openai",
                &format!("{}/embeddings", self.base_url),
                &[("Authorization", auth.as_str())],
                &body,
            )
            .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid_response("openai", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid_response("openai", "missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32_vec(embedding)));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    transport: Transport,
    model: String,
    dims: usize,
    base_url: String,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .transport
            .post_json("ollama", &format!("{}/api/embed", self.base_url), &[], &body)
            .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid_response("ollama", "missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| invalid_response("ollama", "embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

fn invalid_response(provider: &str, what: &str) -> RagError {
    RagError::Embedding {
        provider: provider.to_string(),
        message: format!("invalid response: {}", what),
    }
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a vector. Trailing bytes are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
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
