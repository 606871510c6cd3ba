//! Read-only safety gate.
//!
//! Four checkpoints, applied in pipeline order:
//! 1. `screen_question`: write-intent words (and their inflections) in the
//!    user's question.
//! 2. `classify_output`: sentinels the model emits instead of a query.
//! 3. `screen_script`: write method calls anywhere in the model output.
//! 4. `screen_query`: write operators anywhere in the parsed filter/pipeline.
//!
//! A rejection always names the pattern that matched.

use std::sync::LazyLock;

use mongodb::bson::{Bson, Document};
use regex::Regex;
use thiserror::Error;

use crate::query::{ParsedQuery, QueryOp};

pub const QUESTION_KEYWORDS: [&str; 8] =
    ["drop", "delete", "update", "insert", "modify", "remove", "truncate", "alter"];

/// Word prefixes matched against question tokens, paired with the keyword
/// reported on a match. Covers inflections such as `deleting` or `removed`.
const QUESTION_STEMS: [(&str, &str); 8] = [
    ("drop", "drop"),
    ("delet", "delete"),
    ("updat", "update"),
    ("insert", "insert"),
    ("modif", "modify"),
    ("remov", "remove"),
    ("truncat", "truncate"),
    ("alter", "alter"),
];

/// Read-only phrasings that would otherwise match a stem.
const READ_PHRASES: [(&str, &str); 4] =
    [("last", "updated"), ("recently", "updated"), ("last", "modified"), ("recently", "modified")];

/// Whole words that start with a stem but carry no write intent.
const READ_WORDS: [&str; 4] = ["alternative", "alternatives", "alternate", "alternately"];

pub const WRITE_METHODS: [&str; 16] = [
    "drop",
    "dropDatabase",
    "deleteOne",
    "deleteMany",
    "updateOne",
    "updateMany",
    "insertOne",
    "insertMany",
    "replaceOne",
    "remove",
    "findOneAndUpdate",
    "findOneAndDelete",
    "findOneAndReplace",
    "bulkWrite",
    "createIndex",
    "renameCollection",
];

pub const WRITE_OPERATORS: [&str; 10] =
    ["$set", "$unset", "$push", "$pull", "$pullAll", "$addToSet", "$inc", "$rename", "$out", "$merge"];

pub const UNABLE_TO_QUERY: &str = "UNABLE_TO_QUERY";
pub const MODIFICATION_NOT_ALLOWED: &str = "MODIFICATION_NOT_ALLOWED";
pub const OUT_OF_SCOPE: &str = "OUT_OF_SCOPE";

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = WRITE_METHODS.join("|");
    Regex::new(&format!(r"(?i)\.\s*({alternatives})\s*\(")).expect("write method regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("blocked by `{pattern}`")]
pub struct Blocked {
    pub pattern: String,
}

impl Blocked {
    fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }
}

/// What the model answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVerdict {
    Query,
    Unable,
    ModificationRefused,
    OutOfScope,
}

/// Reject questions with a word starting with a write keyword stem
/// (`delete`, `deleting`, `updates`, ...), case-insensitively.
pub fn screen_question(question: &str) -> Result<(), Blocked> {
    let lower = question.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    for (i, word) in words.iter().enumerate() {
        if READ_WORDS.contains(word) {
            continue;
        }
        let prev = i.checked_sub(1).map(|j| words[j]);
        if prev.is_some_and(|p| READ_PHRASES.contains(&(p, *word))) {
            continue;
        }
        if let Some((_, kw)) = QUESTION_STEMS.iter().find(|(stem, _)| word.starts_with(stem)) {
            return Err(Blocked::new(*kw));
        }
    }
    Ok(())
}

pub fn classify_output(text: &str) -> ModelVerdict {
    if text.contains(UNABLE_TO_QUERY) {
        ModelVerdict::Unable
    } else if text.contains(MODIFICATION_NOT_ALLOWED) {
        ModelVerdict::ModificationRefused
    } else if text.contains(OUT_OF_SCOPE) {
        ModelVerdict::OutOfScope
    } else {
        ModelVerdict::Query
    }
}

/// Reject any write method call in the raw model output, case-insensitively.
pub fn screen_script(text: &str) -> Result<(), Blocked> {
    match METHOD_RE.captures(text).and_then(|c| c.get(1)) {
        Some(m) => {
            let found = m.as_str();
            let canonical = WRITE_METHODS
                .iter()
                .find(|w| w.eq_ignore_ascii_case(found))
                .copied()
                .unwrap_or(found);
            Err(Blocked::new(format!(".{canonical}(")))
        }
        None => Ok(()),
    }
}

/// Reject write operators at any depth of the filter or pipeline.
pub fn screen_query(query: &ParsedQuery) -> Result<(), Blocked> {
    match &query.op {
        QueryOp::Find { filter } | QueryOp::Count { filter } => screen_document(filter),
        QueryOp::Aggregate { pipeline } => pipeline.iter().try_for_each(screen_document),
    }
}

fn screen_document(doc: &Document) -> Result<(), Blocked> {
    for (key, value) in doc {
        if let Some(op) = WRITE_OPERATORS.iter().find(|op| *op == key) {
            return Err(Blocked::new(*op));
        }
        screen_value(value)?;
    }
    Ok(())
}

fn screen_value(value: &Bson) -> Result<(), Blocked> {
    match value {
        Bson::Document(d) => screen_document(d),
        Bson::Array(items) => items.iter().try_for_each(screen_value),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn write_words_block_question() {
        let err = screen_question("Please DELETE all cancelled orders").unwrap_err();
        assert_eq!(err.pattern, "delete");
        assert!(screen_question("drop the users table").is_err());
    }

    #[test]
    fn inflected_write_words_block_question() {
        assert_eq!(screen_question("Deleting all cancelled orders").unwrap_err().pattern, "delete");
        assert_eq!(screen_question("please updates the prices").unwrap_err().pattern, "update");
        assert_eq!(screen_question("removing inactive users").unwrap_err().pattern, "remove");
        assert_eq!(screen_question("Dropped tables?").unwrap_err().pattern, "drop");
        assert_eq!(screen_question("modification of orders").unwrap_err().pattern, "modify");
        assert!(screen_question("which orders were updated by support").is_err());
    }

    #[test]
    fn read_phrasings_pass_question_gate() {
        assert!(screen_question("show recently updated products").is_ok());
        assert!(screen_question("orders by last modified date").is_ok());
        assert!(screen_question("suggest an alternative product").is_ok());
        assert!(screen_question("list customers").is_ok());
    }

    #[test]
    fn sentinels_classify_output() {
        assert_eq!(classify_output("UNABLE_TO_QUERY"), ModelVerdict::Unable);
        assert_eq!(
            classify_output("MODIFICATION_NOT_ALLOWED: Cannot modify database"),
            ModelVerdict::ModificationRefused
        );
        assert_eq!(classify_output("OUT_OF_SCOPE: not related"), ModelVerdict::OutOfScope);
        assert_eq!(classify_output("db.orders.find({})"), ModelVerdict::Query);
    }

    #[test]
    fn write_methods_blocked_in_script() {
        let err = screen_script("db.orders.find({}); db.orders.DeleteMany({})").unwrap_err();
        assert_eq!(err.pattern, ".deleteMany(");
        assert!(screen_script("db.users.drop()").is_err());
        assert!(screen_script("db.users . insertOne ({a: 1})").is_err());
    }

    #[test]
    fn read_methods_pass_script_gate() {
        assert!(screen_script("db.orders.aggregate([{$match: {status: 'dropped'}}])").is_ok());
        assert!(screen_script("db.orders.countDocuments({})").is_ok());
    }

    #[test]
    fn nested_write_operator_blocked() {
        let q = ParsedQuery {
            collection: "orders".into(),
            op: QueryOp::Aggregate {
                pipeline: vec![
                    doc! { "$match": { "status": "pending" } },
                    doc! { "$facet": { "x": [ { "$set": { "flag": true } } ] } },
                ],
            },
        };
        assert_eq!(screen_query(&q).unwrap_err().pattern, "$set");
    }

    #[test]
    fn out_stage_blocked() {
        let q = ParsedQuery {
            collection: "orders".into(),
            op: QueryOp::Aggregate { pipeline: vec![doc! { "$out": "copy" }] },
        };
        assert_eq!(screen_query(&q).unwrap_err().pattern, "$out");
    }

    #[test]
    fn plain_filter_passes() {
        let q = ParsedQuery {
            collection: "orders".into(),
            op: QueryOp::Find { filter: doc! { "amount": { "$gt": 10 }, "tags": ["$set-like"] } },
        };
        assert!(screen_query(&q).is_ok());
    }
}
