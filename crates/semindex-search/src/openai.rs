//! OpenAI-compatible embedding provider.
//!
//! Works against any service exposing the `/v1/embeddings` contract:
//! OpenAI itself, Azure OpenAI, Ollama, or a self-hosted compatible server.
//!
//! - POST `{base_url}/v1/embeddings`
//! - Request: `{"model": "...", "input": ["text1", "text2", ...]}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}, ...], ...}`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::EmbeddingError;
use crate::provider::EmbeddingProvider;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
/// Up to K concurrent in-flight batches to the external service (spec §5).
const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

/// Configuration for an OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_concurrent_batches: usize,
    pub azure_mode: bool,
}

impl OpenAIConfig {
    pub fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            model: "nomic-embed-text".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            azure_mode: false,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: Some(api_key.into()),
            model: "text-embedding-3-small".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            azure_mode: false,
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("SEMINDEX_EMBEDDING_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let api_key = std::env::var("SEMINDEX_EMBEDDING_API_KEY").ok();
        let model = std::env::var("SEMINDEX_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".into());
        let azure_mode = std::env::var("SEMINDEX_EMBEDDING_AZURE_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            base_url,
            api_key,
            model,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            azure_mode,
        }
    }

    pub fn with_max_concurrent_batches(mut self, k: usize) -> Self {
        self.max_concurrent_batches = k;
        self
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// OpenAI-compatible embedding provider. Bounds in-flight batches with a
/// semaphore so callers embedding many batches concurrently (the indexer's
/// embed stage) never exceed the configured fan-out to the remote service.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
    dimension: AtomicUsize,
    in_flight: Semaphore,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ProviderUnavailable(format!("HTTP client error: {e}")))?;
        let in_flight = Semaphore::new(config.max_concurrent_batches.max(1));
        Ok(Self {
            client,
            config,
            dimension: AtomicUsize::new(0),
            in_flight,
        })
    }

    pub fn from_env() -> Result<Self, EmbeddingError> {
        Self::new(OpenAIConfig::from_env())
    }

    fn embeddings_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/embeddings")
        } else {
            format!("{base}/v1/embeddings")
        }
    }

    async fn request_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .expect("semaphore is never closed");

        let mut retry_delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.send_request(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(err) => {
                    if matches!(
                        err,
                        EmbeddingError::Auth(_)
                            | EmbeddingError::InvalidModel(_)
                            | EmbeddingError::RateLimit { .. }
                    ) {
                        return Err(err);
                    }
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(retry_delay).await;
                        retry_delay *= 2;
                        last_error = Some(err);
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EmbeddingError::ProviderUnavailable("request failed after retries".into())))
    }

    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = self.embeddings_url();
        let body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: texts,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = if self.config.azure_mode {
                request.header("api-key", api_key)
            } else {
                request.header("Authorization", format!("Bearer {api_key}"))
            };
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::ProviderUnavailable("request timed out".into())
            } else {
                EmbeddingError::ProviderUnavailable(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let parsed: EmbeddingsResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::ProviderUnavailable(format!("invalid response: {e}")))?;
                let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

                if let Some(first) = embeddings.first() {
                    let dim = first.len();
                    let cached = self.dimension.load(Ordering::Relaxed);
                    if cached == 0 {
                        self.dimension.store(dim, Ordering::Relaxed);
                    } else if cached != dim {
                        return Err(EmbeddingError::DimensionMismatch {
                            expected: cached,
                            actual: dim,
                        });
                    }
                }
                Ok(embeddings)
            }
            StatusCode::UNAUTHORIZED => {
                Err(EmbeddingError::Auth(response.text().await.unwrap_or_default()))
            }
            StatusCode::NOT_FOUND => Err(EmbeddingError::InvalidModel(
                response.text().await.unwrap_or_default(),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(EmbeddingError::RateLimit { retry_after })
            }
            _ => Err(EmbeddingError::ProviderUnavailable(format!(
                "request failed with status {status}"
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.request_with_retry(texts).await
    }

    fn embedding_dim(&self) -> usize {
        let dim = self.dimension.load(Ordering::Relaxed);
        if dim > 0 {
            dim
        } else {
            match self.config.model.as_str() {
                "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
                "text-embedding-3-large" => 3072,
                _ => 768,
            }
        }
    }

    fn provider_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_url_appends_v1_when_missing() {
        let mut config = OpenAIConfig::ollama();
        config.base_url = "http://localhost:11434".into();
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(provider.embeddings_url(), "http://localhost:11434/v1/embeddings");
    }

    #[test]
    fn embeddings_url_does_not_duplicate_v1() {
        let provider = OpenAIProvider::new(OpenAIConfig::ollama()).unwrap();
        assert_eq!(provider.embeddings_url(), "http://localhost:11434/v1/embeddings");
    }

    #[test]
    fn dimension_defaults_before_first_call() {
        let provider = OpenAIProvider::new(OpenAIConfig::openai("sk-test")).unwrap();
        assert_eq!(provider.embedding_dim(), 1536);
    }

    #[tokio::test]
    async fn embed_empty_input_short_circuits() {
        let provider = OpenAIProvider::new(OpenAIConfig::ollama()).unwrap();
        let result = provider.embed(vec![]).await.unwrap();
        assert!(result.is_empty());
    }
}
