//! Prompt construction for query generation.
//!
//! Prompts are assembled from plain-text templates under `config/prompts/`
//! (`query_system.txt`, `query_user.txt`). A missing file falls back to the
//! copy compiled into the binary. Variables use `{{key}}` syntax and are
//! substituted once at [`build()`](PromptBuilder::build) time.
//!
//! The schema context lists only the collections that rank above the
//! relevance thresholds, with field names read from a live sample document.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RankingConfig;
use crate::index::SchemaIndex;
use crate::store::DocumentStore;

const SEPARATOR: &str = "\n\n";

pub const SYSTEM_TEMPLATE: &str = "query_system.txt";
pub const USER_TEMPLATE: &str = "query_user.txt";

const DEFAULT_SYSTEM: &str = include_str!("../config/prompts/query_system.txt");
const DEFAULT_USER: &str = include_str!("../config/prompts/query_user.txt");

/// Fluent builder that assembles a prompt from template files.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self { prompts_dir: prompts_dir.into(), parts: Vec::new(), vars: HashMap::new() }
    }

    /// Append `filename` from the prompts directory, or `fallback` when the
    /// file is missing.
    pub fn layer_or(self, filename: &str, fallback: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        match fs::read_to_string(&path) {
            Ok(text) => self.append(text),
            Err(_) => {
                tracing::debug!("prompt: layer '{}' not found, using built-in", path.display());
                self.append(fallback)
            }
        }
    }

    /// Directly append a text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim().to_string();
        if !trimmed.is_empty() {
            self.parts.push(trimmed);
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all layers with blank lines and apply variable substitution.
    ///
    /// Placeholders are resolved in one left-to-right scan of the template;
    /// substituted values are never scanned again. Unknown placeholders are
    /// left as written.
    pub fn build(self) -> String {
        let template = self.parts.join(SEPARATOR);
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = &after[..end];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 2]),
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// System and user prompt for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPrompt {
    pub system: String,
    pub user: String,
}

pub fn query_prompt(prompts_dir: &Path, schema_context: &str, question: &str) -> QueryPrompt {
    let system = PromptBuilder::new(prompts_dir).layer_or(SYSTEM_TEMPLATE, DEFAULT_SYSTEM).build();
    let user = PromptBuilder::new(prompts_dir)
        .layer_or(USER_TEMPLATE, DEFAULT_USER)
        .var("schema_context", schema_context)
        .var("question", question)
        .build();
    QueryPrompt { system, user }
}

/// Outcome of ranking the schema against a question.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaContext {
    NoRelevantCollection,
    Relevant {
        text: String,
        /// Collections included in `text`, best first.
        collections: Vec<String>,
    },
}

/// Rank collections against `question` and render the schema section of the
/// user prompt.
pub async fn build_context(
    question: &[f32],
    index: &SchemaIndex,
    store: &DocumentStore,
    ranking: &RankingConfig,
    sample_chars: usize,
) -> SchemaContext {
    let ranked = index.rank_collections(question, ranking.top_collections);
    match ranked.first() {
        Some(best) if best.score >= ranking.min_top_score => {}
        best => {
            tracing::debug!(best = ?best.map(|b| b.score), "no collection above relevance threshold");
            return SchemaContext::NoRelevantCollection;
        }
    }

    let mut text = String::from("## Available MongoDB Collections\n\n");
    text.push_str("IMPORTANT: Use ONLY the field names shown below. Do NOT invent field names.\n\n");
    let mut collections = Vec::new();

    for scored in ranked.iter().filter(|s| s.score >= ranking.min_score) {
        let Some(entry) = index.get(&scored.name) else { continue };
        tracing::debug!(collection = %scored.name, score = scored.score, "collection selected");

        let _ = writeln!(text, "### Collection: `{}`", scored.name);
        let _ = writeln!(text, "Document Count: {}", entry.doc_count);
        text.push_str("\n**Fields (from a live sample document):**\n");

        let live = store.sample_fields(&scored.name, sample_chars).await;
        if live.is_empty() {
            for field in entry.fields.iter().take(ranking.static_field_fallback) {
                let _ = writeln!(text, "  - `{}`: {}", field.name, field.type_name);
            }
        } else {
            for field in &live {
                let _ = writeln!(text, "  - `{}`: {} (e.g., {})", field.name, field.type_name, field.sample);
            }
        }

        let relevant = index.rank_fields(question, &scored.name, ranking.top_fields);
        if !relevant.is_empty() {
            let names: Vec<String> = relevant.iter().map(|f| format!("`{}`", f.name)).collect();
            let _ = writeln!(text, "Most relevant fields: {}", names.join(", "));
        }
        text.push('\n');
        collections.push(scored.name.clone());
    }

    SchemaContext::Relevant { text, collections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embed::{Embedder, providers::hash::HashEmbedder};
    use crate::store::{CollectionSchema, FieldType, fixture::FixtureStore};
    use mongodb::bson::doc;
    use tempfile::TempDir;

    #[test]
    fn builder_substitutes_vars() {
        let p = PromptBuilder::new("/nonexistent")
            .append("Hello {{name}}")
            .append("  ")
            .append("Bye {{name}}")
            .var("name", "Ada")
            .build();
        assert_eq!(p, "Hello Ada\n\nBye Ada");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        for _ in 0..20 {
            let qp = query_prompt(Path::new("/nonexistent"), "SCHEMA {{question}}", "ignore {{schema_context}}");
            assert_eq!(qp.user.matches("SCHEMA").count(), 1);
            assert!(qp.user.contains("SCHEMA {{question}}"));
            assert!(qp.user.contains("\"ignore {{schema_context}}\""));
        }
    }

    #[test]
    fn unknown_and_unclosed_placeholders_stay() {
        let p = PromptBuilder::new("/nonexistent").append("{{a}} {{b}} {{c").var("a", "1").build();
        assert_eq!(p, "1 {{b}} {{c");
    }

    #[test]
    fn missing_template_uses_built_in() {
        let qp = query_prompt(Path::new("/nonexistent"), "CTX", "how many orders?");
        assert!(qp.system.contains("UNABLE_TO_QUERY"));
        assert!(qp.system.contains("MODIFICATION_NOT_ALLOWED"));
        assert!(qp.system.contains("OUT_OF_SCOPE"));
        assert!(qp.user.contains("CTX"));
        assert!(qp.user.contains("\"how many orders?\""));
        assert!(!qp.user.contains("{{"));
    }

    #[test]
    fn template_file_overrides_built_in() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(USER_TEMPLATE), "Q={{question}} S={{schema_context}}").unwrap();
        let qp = query_prompt(dir.path(), "schema", "why");
        assert_eq!(qp.user, "Q=why S=schema");
    }

    fn fields(names: &[(&str, &str)]) -> Vec<FieldType> {
        names.iter().map(|(n, t)| FieldType { name: (*n).into(), type_name: (*t).into() }).collect()
    }

    async fn setup() -> (Embedder, SchemaIndex, DocumentStore, RankingConfig) {
        let embedder = Embedder::Hash(HashEmbedder::new(384));
        let schema = vec![
            CollectionSchema::new(
                "customers",
                fields(&[("name", "string"), ("email", "string"), ("city", "string"), ("age", "int"), ("tier", "string"), ("joined", "date")]),
                2,
                vec![],
            ),
            CollectionSchema::new("products", fields(&[("title", "string"), ("price", "double")]), 0, vec![]),
        ];
        let index = SchemaIndex::build(&schema, &embedder).await.unwrap();
        let store = DocumentStore::Fixture(FixtureStore::new().with_collection(
            "customers",
            vec![doc! { "name": "Ada Lovelace", "email": "ada@example.com", "city": "London" }],
        ));
        let ranking = Config::test_default(Path::new("/tmp")).ranking;
        (embedder, index, store, ranking)
    }

    #[tokio::test]
    async fn context_lists_live_sample_fields() {
        let (e, index, store, ranking) = setup().await;
        let q = e.embed("list customers in London").await.unwrap();
        let SchemaContext::Relevant { text, collections } = build_context(&q, &index, &store, &ranking, 5).await
        else {
            panic!("expected relevant context");
        };
        assert_eq!(collections[0], "customers");
        assert!(text.contains("### Collection: `customers`"));
        assert!(text.contains("Document Count: 2"));
        assert!(text.contains("`name`: string (e.g., Ada L)"));
        assert!(text.contains("Most relevant fields:"));
    }

    #[tokio::test]
    async fn static_fields_used_without_live_sample() {
        let (e, index, store, mut ranking) = setup().await;
        ranking.static_field_fallback = 1;
        ranking.min_score = 0.0;
        ranking.min_top_score = 0.0;
        let q = e.embed("products price").await.unwrap();
        let SchemaContext::Relevant { text, .. } = build_context(&q, &index, &store, &ranking, 50).await else {
            panic!("expected relevant context");
        };
        let section = &text[text.find("`products`").unwrap()..];
        let section = &section[..section.find("Most relevant").unwrap()];
        assert!(section.contains("  - `title`: string\n"));
        assert!(!section.contains("`price`: double"));
    }

    #[tokio::test]
    async fn collections_below_min_score_are_left_out() {
        use crate::index::IndexedCollection;
        use std::collections::BTreeMap;

        let entry = |v: Vec<f32>, count: u64| IndexedCollection {
            description: String::new(),
            collection_embedding: v,
            fields: fields(&[("name", "string")]),
            field_embeddings: BTreeMap::new(),
            doc_count: count,
            indexed_fields: Vec::new(),
        };
        let index = SchemaIndex::from_collections(BTreeMap::from([
            ("customers".to_string(), entry(vec![1.0, 0.0, 0.0], 2)),
            ("orders".to_string(), entry(vec![1.0, 1.0, 0.0], 5)),
            ("products".to_string(), entry(vec![0.1, 1.0, 0.0], 1)),
        ]));
        let (_, _, store, mut ranking) = setup().await;
        ranking.top_collections = 3;
        ranking.min_top_score = 0.3;
        ranking.min_score = 0.2;

        let SchemaContext::Relevant { text, collections } =
            build_context(&[1.0, 0.0, 0.0], &index, &store, &ranking, 50).await
        else {
            panic!("expected relevant context");
        };
        assert_eq!(collections, ["customers", "orders"]);
        assert!(text.contains("### Collection: `orders`"));
        assert!(!text.contains("`products`"));
        assert!(!text.contains("Document Count: 1\n"));
    }

    #[tokio::test]
    async fn unrelated_question_has_no_context() {
        let (e, index, store, mut ranking) = setup().await;
        ranking.min_top_score = 0.3;
        let q = e.embed("what is the weather tomorrow").await.unwrap();
        assert_eq!(build_context(&q, &index, &store, &ranking, 50).await, SchemaContext::NoRelevantCollection);
    }

    #[tokio::test]
    async fn empty_index_has_no_context() {
        let (e, _, store, ranking) = setup().await;
        let q = e.embed("customers").await.unwrap();
        let empty = SchemaIndex::default();
        assert_eq!(build_context(&q, &empty, &store, &ranking, 50).await, SchemaContext::NoRelevantCollection);
    }
}
