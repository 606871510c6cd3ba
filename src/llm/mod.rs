//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! The `complete` method is `async fn` on the enum so callers need no
//! trait-object machinery.

pub mod providers;

use thiserror::Error;

pub use providers::build;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Adding a backend = new module + new variant + new `complete` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    Ollama(providers::ollama::OllamaProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// Send the system and user prompts and return the trimmed text reply.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(system, user).await,
            LlmProvider::Ollama(p) => p.complete(system, user).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(system, user).await,
        }
    }

    /// Short `provider:model` label for logs and `schema` output.
    pub fn label(&self) -> String {
        match self {
            LlmProvider::Dummy(_) => "dummy".to_string(),
            LlmProvider::Ollama(p) => format!("ollama:{}", p.model()),
            LlmProvider::OpenAiCompatible(p) => format!("openai:{}", p.model()),
        }
    }
}
