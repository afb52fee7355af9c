//! Embedding Client (C4): the boundary to an external embedding service.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Generates dense vectors for text. Implementations batch internally and
/// may parallelize subject to their own bounded concurrency; from the
/// caller's perspective `embed` is a single synchronous-looking call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimensionality of the vectors this provider produces. Zero until the
    /// first successful `embed` call has detected it.
    fn embedding_dim(&self) -> usize;

    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that the trait stays object-safe: code elsewhere
    // in the workspace holds providers behind `Arc<dyn EmbeddingProvider>`.
    fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
}
