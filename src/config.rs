//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given by `-f` / `DOCQUERY_CONFIG`),
//! then applies `DOCQUERY_WORK_DIR`, `DOCQUERY_LOG_LEVEL`,
//! `DOCQUERY_MONGODB_URI` and `DOCQUERY_DATABASE` env overrides.
//! API keys come from `LLM_API_KEY` / `EMBEDDING_API_KEY` only, never TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Document database connection settings (`[database]`).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub uri: String,
    pub name: String,
    pub server_selection_timeout_ms: u64,
    /// Maximum documents returned by any executed query.
    pub result_limit: usize,
    /// Sample values shown in prompts are cut to this many characters.
    pub sample_chars: usize,
}

/// Settings for an HTTP embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingEndpointConfig {
    /// Full endpoint URL (e.g. `http://localhost:11434/api/embed`).
    pub api_base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

/// Embedding subsystem configuration (`[embedding]`).
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Active provider: `"ollama"`, `"openai"` or `"hash"`.
    pub provider: String,
    pub ollama: EmbeddingEndpointConfig,
    pub openai: EmbeddingEndpointConfig,
    /// Vector width of the offline hashing embedder.
    pub hash_dimension: usize,
}

/// Ollama `/api/generate` settings (`[llm.ollama]`).
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub num_predict: u32,
    pub timeout_seconds: u64,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"ollama"`, `"openai"`, `"dummy"`).
    /// Maps to `default` in `[llm]`.
    pub provider: String,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
    /// Canned reply for the dummy provider; `None` echoes the prompt.
    pub dummy_reply: Option<String>,
}

/// Relevance thresholds and cache location (`[ranking]`).
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub top_collections: usize,
    pub top_fields: usize,
    /// Best collection must score at least this, otherwise the question is out of scope.
    pub min_top_score: f32,
    /// Collections below this score are left out of the prompt.
    pub min_score: f32,
    /// Static fields listed when a live sample document is unavailable.
    pub static_field_fallback: usize,
    /// Cache file name relative to `work_dir`; `{database}` is substituted.
    pub cache_file: String,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Working directory for persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub ranking: RankingConfig,
    pub prompts_dir: PathBuf,
    /// From `LLM_API_KEY`; `None` for keyless local models.
    pub llm_api_key: Option<String>,
    /// From `EMBEDDING_API_KEY`.
    pub embedding_api_key: Option<String>,
}

impl Config {
    /// Absolute path of the embeddings cache for the configured database.
    pub fn cache_path(&self) -> PathBuf {
        let file = self.ranking.cache_file.replace("{database}", &self.database.name);
        self.work_dir.join(file)
    }
}

/// Env-sourced overrides. Tests pass these directly instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub mongodb_uri: Option<String>,
    pub database: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("DOCQUERY_WORK_DIR").ok(),
            log_level: env::var("DOCQUERY_LOG_LEVEL").ok(),
            mongodb_uri: env::var("DOCQUERY_MONGODB_URI").ok(),
            database: env::var("DOCQUERY_DATABASE").ok(),
        }
    }
}

// ── raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    embedding: RawEmbedding,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    ranking: RawRanking,
    #[serde(default)]
    prompts: RawPrompts,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { name: default_app_name(), work_dir: default_work_dir(), log_level: default_log_level() }
    }
}

#[derive(Deserialize)]
struct RawDatabase {
    #[serde(default = "default_mongodb_uri")]
    uri: String,
    #[serde(default = "default_database_name")]
    name: String,
    #[serde(default = "default_server_selection_timeout_ms")]
    server_selection_timeout_ms: u64,
    #[serde(default = "default_result_limit")]
    result_limit: usize,
    #[serde(default = "default_sample_chars")]
    sample_chars: usize,
}

impl Default for RawDatabase {
    fn default() -> Self {
        Self {
            uri: default_mongodb_uri(),
            name: default_database_name(),
            server_selection_timeout_ms: default_server_selection_timeout_ms(),
            result_limit: default_result_limit(),
            sample_chars: default_sample_chars(),
        }
    }
}

#[derive(Deserialize)]
struct RawEmbedding {
    #[serde(rename = "default", default = "default_embedding_provider")]
    provider: String,
    #[serde(default)]
    ollama: RawEmbeddingEndpoint,
    #[serde(default)]
    openai: RawEmbeddingEndpoint,
    #[serde(default)]
    hash: RawHashEmbedding,
}

impl Default for RawEmbedding {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            ollama: RawEmbeddingEndpoint::default(),
            openai: RawEmbeddingEndpoint::default(),
            hash: RawHashEmbedding::default(),
        }
    }
}

/// Endpoint sections fall back field-by-field to per-provider defaults,
/// so partial tables keep the right URL for their provider.
#[derive(Deserialize, Default)]
struct RawEmbeddingEndpoint {
    api_base_url: Option<String>,
    model: Option<String>,
    timeout_seconds: Option<u64>,
}

impl RawEmbeddingEndpoint {
    fn resolve(self, url: &str, model: &str) -> EmbeddingEndpointConfig {
        EmbeddingEndpointConfig {
            api_base_url: self.api_base_url.unwrap_or_else(|| url.to_string()),
            model: self.model.unwrap_or_else(|| model.to_string()),
            timeout_seconds: self.timeout_seconds.unwrap_or(30),
        }
    }
}

#[derive(Deserialize)]
struct RawHashEmbedding {
    #[serde(default = "default_hash_dimension")]
    dimension: usize,
}

impl Default for RawHashEmbedding {
    fn default() -> Self {
        Self { dimension: default_hash_dimension() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    ollama: RawOllamaConfig,
    #[serde(default)]
    openai: RawOpenAiConfig,
    #[serde(default)]
    dummy: RawDummyConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            ollama: RawOllamaConfig::default(),
            openai: RawOpenAiConfig::default(),
            dummy: RawDummyConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOllamaConfig {
    #[serde(default = "default_ollama_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_ollama_model")]
    model: String,
    #[serde(default)]
    temperature: f32,
    #[serde(default = "default_ollama_num_predict")]
    num_predict: u32,
    #[serde(default = "default_llm_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOllamaConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_ollama_api_base_url(),
            model: default_ollama_model(),
            temperature: 0.0,
            num_predict: default_ollama_num_predict(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default)]
    temperature: f32,
    #[serde(default = "default_llm_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: 0.0,
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawDummyConfig {
    reply: Option<String>,
}

#[derive(Deserialize)]
struct RawRanking {
    #[serde(default = "default_top_collections")]
    top_collections: usize,
    #[serde(default = "default_top_fields")]
    top_fields: usize,
    #[serde(default = "default_min_top_score")]
    min_top_score: f32,
    #[serde(default = "default_min_score")]
    min_score: f32,
    #[serde(default = "default_static_field_fallback")]
    static_field_fallback: usize,
    #[serde(default = "default_cache_file")]
    cache_file: String,
}

impl Default for RawRanking {
    fn default() -> Self {
        Self {
            top_collections: default_top_collections(),
            top_fields: default_top_fields(),
            min_top_score: default_min_top_score(),
            min_score: default_min_score(),
            static_field_fallback: default_static_field_fallback(),
            cache_file: default_cache_file(),
        }
    }
}

#[derive(Deserialize)]
struct RawPrompts {
    #[serde(default = "default_prompts_dir")]
    dir: String,
}

impl Default for RawPrompts {
    fn default() -> Self {
        Self { dir: default_prompts_dir() }
    }
}

fn default_app_name() -> String { "docquery".to_string() }
fn default_work_dir() -> String { "~/.docquery".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_mongodb_uri() -> String { "mongodb://localhost:27017".to_string() }
fn default_database_name() -> String { "ai_test_db".to_string() }
fn default_server_selection_timeout_ms() -> u64 { 5000 }
fn default_result_limit() -> usize { 10 }
fn default_sample_chars() -> usize { 50 }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_hash_dimension() -> usize { 384 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_ollama_api_base_url() -> String { "http://localhost:11434/api/generate".to_string() }
fn default_ollama_model() -> String { "qwen2.5:3b".to_string() }
fn default_ollama_num_predict() -> u32 { 120 }
fn default_llm_timeout_seconds() -> u64 { 60 }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_top_collections() -> usize { 3 }
fn default_top_fields() -> usize { 3 }
fn default_min_top_score() -> f32 { 0.3 }
fn default_min_score() -> f32 { 0.2 }
fn default_static_field_fallback() -> usize { 5 }
fn default_cache_file() -> String { "embeddings-{database}.json".to_string() }
fn default_prompts_dir() -> String { "config/prompts".to_string() }

const OLLAMA_EMBED_URL: &str = "http://localhost:11434/api/embed";
const OLLAMA_EMBED_MODEL: &str = "all-minilm";
const OPENAI_EMBED_URL: &str = "https://api.openai.com/v1/embeddings";
const OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";

/// Load config from `explicit_path`, `DOCQUERY_CONFIG`, or `config/default.toml`,
/// then apply env-var overrides.
pub fn load(explicit_path: Option<&str>) -> Result<Config, AppError> {
    let env_path = env::var("DOCQUERY_CONFIG").ok();
    let path = explicit_path
        .or(env_path.as_deref())
        .unwrap_or(DEFAULT_CONFIG_PATH);
    load_from(Path::new(path), &Overrides::from_env())
}

/// Internal loader; accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let mut config = resolve(parsed, overrides)?;
    config.llm_api_key = env::var("LLM_API_KEY").ok();
    config.embedding_api_key = env::var("EMBEDDING_API_KEY").ok();
    Ok(config)
}

fn resolve(parsed: RawConfig, overrides: &Overrides) -> Result<Config, AppError> {
    let app = parsed.app;
    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&app.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(app.log_level);
    logger::parse_level(&log_level)
        .map_err(|e| AppError::Config(format!("app.log_level: {e}")))?;

    let db = parsed.database;
    if db.result_limit == 0 {
        return Err(AppError::Config("database.result_limit must be at least 1".into()));
    }

    let ranking = parsed.ranking;
    if ranking.top_collections == 0 {
        return Err(AppError::Config("ranking.top_collections must be at least 1".into()));
    }

    let embedding = parsed.embedding;
    let llm = parsed.llm;

    Ok(Config {
        app_name: app.name,
        work_dir,
        log_level,
        database: DatabaseConfig {
            uri: overrides.mongodb_uri.clone().unwrap_or(db.uri),
            name: overrides.database.clone().unwrap_or(db.name),
            server_selection_timeout_ms: db.server_selection_timeout_ms,
            result_limit: db.result_limit,
            sample_chars: db.sample_chars,
        },
        embedding: EmbeddingConfig {
            provider: embedding.provider,
            ollama: embedding.ollama.resolve(OLLAMA_EMBED_URL, OLLAMA_EMBED_MODEL),
            openai: embedding.openai.resolve(OPENAI_EMBED_URL, OPENAI_EMBED_MODEL),
            hash_dimension: embedding.hash.dimension,
        },
        llm: LlmConfig {
            provider: llm.provider,
            ollama: OllamaConfig {
                api_base_url: llm.ollama.api_base_url,
                model: llm.ollama.model,
                temperature: llm.ollama.temperature,
                num_predict: llm.ollama.num_predict,
                timeout_seconds: llm.ollama.timeout_seconds,
            },
            openai: OpenAiConfig {
                api_base_url: llm.openai.api_base_url,
                model: llm.openai.model,
                temperature: llm.openai.temperature,
                timeout_seconds: llm.openai.timeout_seconds,
            },
            dummy_reply: llm.dummy.reply,
        },
        ranking: RankingConfig {
            top_collections: ranking.top_collections,
            top_fields: ranking.top_fields,
            min_top_score: ranking.min_top_score,
            min_score: ranking.min_score,
            static_field_fallback: ranking.static_field_fallback,
            cache_file: ranking.cache_file,
        },
        prompts_dir: PathBuf::from(parsed.prompts.dir),
        llm_api_key: None,
        embedding_api_key: None,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Offline `Config` for tests: hash embedder, dummy LLM, no network.
    /// Thresholds are lowered to suit the hashing embedder.
    pub fn test_default(work_dir: &Path) -> Self {
        let mut config = resolve(RawConfig::default(), &Overrides::default())
            .unwrap_or_else(|e| panic!("default config must resolve: {e}"));
        config.work_dir = work_dir.to_path_buf();
        config.embedding.provider = "hash".into();
        config.llm.provider = "dummy".into();
        config.ranking.min_top_score = 0.1;
        config.ranking.min_score = 0.05;
        config.prompts_dir = work_dir.join("prompts");
        config
    }
}
