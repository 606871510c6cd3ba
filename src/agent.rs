//! Question-answering pipeline.
//!
//! `QueryAgent::ask` takes one natural-language question through the gates in
//! order: question screen, canned join, schema ranking, model generation,
//! sentinel check, script screen, parse, query screen, execution, rendering.
//! A question that fails a gate never reaches the database.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embed::{self, Embedder};
use crate::error::AppError;
use crate::format::{ResultContext, error_suggestions, format_count, format_documents};
use crate::guard::{self, ModelVerdict};
use crate::index::{SchemaIndex, cache};
use crate::llm::{self, LlmProvider};
use crate::prompt::{self, SchemaContext};
use crate::query::{self, ParsedQuery, QueryOp};
use crate::store::{DocumentStore, StoreError};
use crate::templates;

pub const MSG_QUESTION_BLOCKED: &str =
    "❌ Database modification queries are not allowed. You can only view/query data.";
pub const MSG_NOT_RELATED: &str =
    "❌ This question is not related to the database. Please ask something about the data in MongoDB.";
pub const MSG_UNABLE: &str =
    "⚠ I cannot construct a valid query for this question with the available schema.";
pub const MSG_MODIFICATION_REFUSED: &str =
    "❌ Database modification is not allowed. This system is read-only.";
pub const MSG_MODEL_OUT_OF_SCOPE: &str = "❌ This question is not related to the database.";

/// How a question was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Answered,
    Blocked,
    OutOfScope,
    Unanswerable,
    ModelError,
    QueryError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub text: String,
}

impl Reply {
    fn new(status: ReplyStatus, text: impl Into<String>) -> Self {
        Self { status, text: text.into() }
    }
}

pub struct QueryAgent {
    config: Config,
    store: DocumentStore,
    embedder: Embedder,
    llm: LlmProvider,
    index: SchemaIndex,
}

impl QueryAgent {
    /// Connect to the database, build the providers and load or build the
    /// schema index.
    pub async fn start(config: Config) -> Result<Self, AppError> {
        let store = DocumentStore::connect(&config.database).await?;
        let embedder = embed::build(&config.embedding, config.embedding_api_key.clone())?;
        let llm = llm::build(&config.llm, config.llm_api_key.clone())?;
        Self::with_parts(config, store, embedder, llm).await
    }

    /// Assemble an agent from ready-made parts.
    pub async fn with_parts(
        config: Config,
        store: DocumentStore,
        embedder: Embedder,
        llm: LlmProvider,
    ) -> Result<Self, AppError> {
        let schema = store.extract_schema().await?;
        let index = cache::load_or_build(&schema, &embedder, &config.cache_path(), false).await?;
        info!(
            collections = index.len(),
            embedder = %embedder.descriptor(),
            llm = %llm.label(),
            "query agent ready"
        );
        Ok(Self { config, store, embedder, llm, index })
    }

    pub fn index(&self) -> &SchemaIndex {
        &self.index
    }

    /// Re-extract the schema and re-embed it, ignoring the cache.
    /// Returns the number of indexed collections.
    pub async fn reindex(&mut self) -> Result<usize, AppError> {
        let schema = self.store.extract_schema().await?;
        self.index = cache::load_or_build(&schema, &self.embedder, &self.config.cache_path(), true).await?;
        Ok(self.index.len())
    }

    /// Indexed collections with their counts and field types.
    pub fn schema_summary(&self) -> String {
        let mut out = format!(
            "Database `{}`: {} collection{} (embedder {}, model {})",
            self.config.database.name,
            self.index.len(),
            if self.index.len() == 1 { "" } else { "s" },
            self.embedder.descriptor(),
            self.llm.label(),
        );
        for (name, coll) in self.index.collections() {
            let fields: Vec<String> =
                coll.fields.iter().map(|f| format!("{} ({})", f.name, f.type_name)).collect();
            out.push_str(&format!("\n- {name}: {} documents; fields: {}", coll.doc_count, fields.join(", ")));
        }
        out
    }

    pub async fn ask(&self, question: &str) -> Reply {
        let question = question.trim();
        info!(%question, "question received");

        if let Err(blocked) = guard::screen_question(question) {
            warn!(pattern = %blocked.pattern, "question blocked");
            return Reply::new(ReplyStatus::Blocked, MSG_QUESTION_BLOCKED);
        }

        let limit = self.config.database.result_limit;
        if let Some(canned) = templates::match_template(question, &self.index, limit) {
            debug!(collection = %canned.collection, "using canned join");
            match self.store.aggregate(&canned.collection, canned.pipeline, limit).await {
                Ok(docs) => {
                    let ctx = ResultContext { question, collection: &canned.collection };
                    return Reply::new(ReplyStatus::Answered, format_documents(&docs, &ctx));
                }
                Err(e) => warn!(error = %e, "canned join failed, asking the model"),
            }
        }

        let question_vec = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => return Reply::new(ReplyStatus::ModelError, format!("⚠ ERROR: {e}")),
        };

        let context = prompt::build_context(
            &question_vec,
            &self.index,
            &self.store,
            &self.config.ranking,
            self.config.database.sample_chars,
        )
        .await;
        let schema_text = match context {
            SchemaContext::NoRelevantCollection => {
                return Reply::new(ReplyStatus::OutOfScope, MSG_NOT_RELATED);
            }
            SchemaContext::Relevant { text, collections } => {
                debug!(?collections, "schema context built");
                text
            }
        };

        let prompts = prompt::query_prompt(&self.config.prompts_dir, &schema_text, question);
        let code = match self.llm.complete(&prompts.system, &prompts.user).await {
            Ok(code) => code,
            Err(e) => return Reply::new(ReplyStatus::ModelError, format!("⚠ ERROR: {e}")),
        };
        info!(query = %code, "model output");

        match guard::classify_output(&code) {
            ModelVerdict::Query => {}
            ModelVerdict::Unable => return Reply::new(ReplyStatus::Unanswerable, MSG_UNABLE),
            ModelVerdict::ModificationRefused => {
                return Reply::new(ReplyStatus::Blocked, MSG_MODIFICATION_REFUSED);
            }
            ModelVerdict::OutOfScope => return Reply::new(ReplyStatus::OutOfScope, MSG_MODEL_OUT_OF_SCOPE),
        }

        if let Err(blocked) = guard::screen_script(&code) {
            warn!(pattern = %blocked.pattern, "generated script blocked");
            return blocked_reply(&blocked.pattern);
        }

        let parsed = match query::parse(&code) {
            Ok(q) => q,
            Err(e) => {
                return Reply::new(
                    ReplyStatus::QueryError,
                    format!("⚠ Could not parse the generated query: {e}\nGenerated query: {code}"),
                );
            }
        };

        if let Err(blocked) = guard::screen_query(&parsed) {
            warn!(pattern = %blocked.pattern, "generated query blocked");
            return blocked_reply(&blocked.pattern);
        }

        if !self.index.contains(&parsed.collection) {
            return Reply::new(
                ReplyStatus::QueryError,
                format!(
                    "⚠ The generated query uses unknown collection `{}`.\nGenerated query: {code}",
                    parsed.collection
                ),
            );
        }

        match self.execute(question, parsed).await {
            Ok(text) => Reply::new(ReplyStatus::Answered, text),
            Err(e) => Reply::new(
                ReplyStatus::QueryError,
                format!("⚠ Query failed: {e}\nGenerated query: {code}\n\n{}", error_suggestions(question)),
            ),
        }
    }

    async fn execute(&self, question: &str, query: ParsedQuery) -> Result<String, StoreError> {
        let limit = self.config.database.result_limit;
        let ctx = ResultContext { question, collection: &query.collection };
        match query.op {
            QueryOp::Find { filter } => {
                let docs = self.store.find(ctx.collection, filter, limit).await?;
                Ok(format_documents(&docs, &ctx))
            }
            QueryOp::Count { filter } => {
                let n = self.store.count(ctx.collection, filter).await?;
                Ok(format_count(n, &ctx))
            }
            QueryOp::Aggregate { pipeline } => {
                let docs = self.store.aggregate(ctx.collection, pipeline, limit).await?;
                Ok(format_documents(&docs, &ctx))
            }
        }
    }
}

fn blocked_reply(pattern: &str) -> Reply {
    Reply::new(
        ReplyStatus::Blocked,
        format!("❌ Query blocked: it uses `{pattern}`, which modifies data. This system is read-only."),
    )
}
