//! Application-wide error types.
//!
//! Module-level errors (`StoreError`, `EmbedError`, `ProviderError`,
//! `CacheError`) stay local to their modules and are folded into `AppError`
//! at the agent seam.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::store::StoreError> for AppError {
    fn from(e: crate::store::StoreError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<crate::embed::EmbedError> for AppError {
    fn from(e: crate::embed::EmbedError) -> Self {
        AppError::Embedding(e.to_string())
    }
}

impl From<crate::llm::ProviderError> for AppError {
    fn from(e: crate::llm::ProviderError) -> Self {
        AppError::Llm(e.to_string())
    }
}

impl From<crate::index::cache::CacheError> for AppError {
    fn from(e: crate::index::cache::CacheError) -> Self {
        AppError::Cache(e.to_string())
    }
}
