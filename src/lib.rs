//! docquery: ask a document database questions in plain language.
//!
//! The question is embedded and ranked against the schema, a local model
//! writes a read-only query from the relevant collections, and the query is
//! screened, executed and rendered as text.

pub mod agent;
pub mod cli;
pub mod config;
pub mod embed;
pub mod error;
pub mod format;
pub mod guard;
pub mod index;
pub mod llm;
pub mod logger;
pub mod prompt;
pub mod query;
pub mod repl;
pub mod store;
pub mod templates;
