//! Embedding provider abstraction.
//!
//! `Embedder` is an enum over concrete backends, mirroring `LlmProvider`.
//! Vectors are opaque similarity keys: nothing downstream depends on the
//! model beyond `descriptor()`, which keys the on-disk cache.

pub mod providers;

use thiserror::Error;

pub use providers::build;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("unknown embedding provider: {0}")]
    UnknownProvider(String),
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding response invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub enum Embedder {
    Hash(providers::hash::HashEmbedder),
    Ollama(providers::ollama::OllamaEmbedder),
    OpenAiCompatible(providers::openai_compatible::OpenAiEmbedder),
}

impl Embedder {
    /// Embed one text into a vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vector = match self {
            Embedder::Hash(e) => e.embed(text),
            Embedder::Ollama(e) => e.embed(text).await?,
            Embedder::OpenAiCompatible(e) => e.embed(text).await?,
        };
        if vector.is_empty() {
            return Err(EmbedError::InvalidResponse("empty vector".into()));
        }
        Ok(vector)
    }

    /// Stable `provider:model` identity; vectors from different
    /// descriptors are not comparable.
    pub fn descriptor(&self) -> String {
        match self {
            Embedder::Hash(e) => format!("hash:fnv1a:{}", e.dimension()),
            Embedder::Ollama(e) => format!("ollama:{}", e.model()),
            Embedder::OpenAiCompatible(e) => format!("openai:{}", e.model()),
        }
    }
}
