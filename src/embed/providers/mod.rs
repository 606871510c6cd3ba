//! Embedding provider implementations.
//!
//! `build(config, api_key)` is the factory called at startup.

pub mod hash;
pub mod ollama;
pub mod openai_compatible;

use crate::config::EmbeddingConfig;
use crate::embed::{EmbedError, Embedder};

/// Construct an `Embedder` from config. `api_key` comes from
/// `EMBEDDING_API_KEY` and is only used by the OpenAI-compatible backend.
pub fn build(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Embedder, EmbedError> {
    match config.provider.as_str() {
        "hash" => Ok(Embedder::Hash(hash::HashEmbedder::new(config.hash_dimension))),
        "ollama" => {
            let o = &config.ollama;
            let e = ollama::OllamaEmbedder::new(o.api_base_url.clone(), o.model.clone(), o.timeout_seconds)?;
            Ok(Embedder::Ollama(e))
        }
        "openai" | "openai-compatible" => {
            let o = &config.openai;
            let e = openai_compatible::OpenAiEmbedder::new(
                o.api_base_url.clone(),
                o.model.clone(),
                o.timeout_seconds,
                api_key,
            )?;
            Ok(Embedder::OpenAiCompatible(e))
        }
        other => Err(EmbedError::UnknownProvider(other.to_string())),
    }
}
