//! Parser for model-generated query code.
//!
//! The model answers with mongo-shell text such as
//! `db.orders.find({status: 'pending'})`. This module locates the first
//! `db.<collection>.<op>(` call, extracts its argument with string-aware
//! bracket matching, and turns shell-flavoured JSON into BSON. Cursor
//! modifiers chained onto `find` are folded into an equivalent pipeline.
//!
//! Nothing here falls back to an empty filter on malformed input: a query
//! that cannot be parsed is an error, never a broader query.

use std::sync::LazyLock;

use chrono::Utc;
use mongodb::bson::{Bson, Document, doc};
use regex::{Captures, Regex};
use thiserror::Error;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"db\.(\w+)\.(find|aggregate|countDocuments|count)\(")
        .expect("command regex is valid")
});

static OBJECT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ObjectId\(\s*["']([0-9a-fA-F]{24})["']\s*\)"#).expect("ObjectId regex is valid")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:ISODate|new\s+Date)\(\s*(?:["']([^"']*)["'])?\s*\)"#).expect("date regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no db.<collection>.<find|aggregate|countDocuments|count>(...) call found")]
    NoCommand,
    #[error("unbalanced `{0}` in query arguments")]
    Unbalanced(char),
    #[error("aggregate needs a pipeline array")]
    MissingPipeline,
    #[error("invalid query document: {0}")]
    InvalidDocument(String),
    #[error("pipeline stage {0} is not a document")]
    InvalidStage(usize),
    #[error("cursor method `.{0}()` is not supported; use aggregate for this query")]
    UnsupportedCursorMethod(String),
    #[error("invalid argument to `.{0}()`")]
    InvalidCursorArgument(String),
}

/// Read operation with its decoded argument.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    Find { filter: Document },
    Count { filter: Document },
    Aggregate { pipeline: Vec<Document> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub collection: String,
    pub op: QueryOp,
}

/// Parse the first supported call in `text`.
pub fn parse(text: &str) -> Result<ParsedQuery, ParseError> {
    let code = strip_code_fences(text);
    let caps = COMMAND_RE.captures(&code).ok_or(ParseError::NoCommand)?;
    let (Some(whole), Some(coll), Some(op)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        return Err(ParseError::NoCommand);
    };
    let after = &code[whole.end()..];
    let close = closing_paren(after);
    let args = &after[..close.unwrap_or(after.len())];
    let chain = match close {
        Some(i) => cursor_chain(&after[i + 1..]),
        None => Vec::new(),
    };
    let collection = coll.as_str().to_string();

    let op = match op.as_str() {
        "aggregate" => {
            reject_cursor_methods(&chain)?;
            let raw = balanced(args, '[')?.ok_or(ParseError::MissingPipeline)?;
            QueryOp::Aggregate { pipeline: parse_pipeline(raw)? }
        }
        "find" => find_op(args, &chain)?,
        _ => {
            reject_cursor_methods(&chain)?;
            QueryOp::Count { filter: optional_document(args)? }
        }
    };
    Ok(ParsedQuery { collection, op })
}

/// Cursor calls that change nothing about the result.
const NEUTRAL_CURSOR_METHODS: [&str; 2] = ["pretty", "toArray"];

/// `find(filter, projection)` and its cursor chain. Sorting, paging or a
/// projection turn the query into the equivalent pipeline
/// (`$match`, `$sort`, `$skip`, `$limit`, `$project`, in MongoDB's cursor
/// order); a chained `.count()` makes it a count.
fn find_op(args: &str, chain: &[(String, &str)]) -> Result<QueryOp, ParseError> {
    let parts = top_level_args(args);
    let filter = optional_document(parts.first().copied().unwrap_or(""))?;
    let projection = match parts.get(1) {
        Some(raw) => Some(optional_document(raw)?).filter(|d| !d.is_empty()),
        None => None,
    };

    let (mut sort, mut skip, mut limit) = (None, None, None);
    for (method, arg) in chain {
        match method.as_str() {
            "count" | "countDocuments" => return Ok(QueryOp::Count { filter }),
            "sort" => {
                let raw = balanced(arg, '{')?.ok_or_else(|| ParseError::InvalidCursorArgument(method.clone()))?;
                sort = Some(parse_document(raw)?);
            }
            "skip" => skip = Some(cursor_number(method, arg)?),
            "limit" => limit = Some(cursor_number(method, arg)?),
            m if NEUTRAL_CURSOR_METHODS.contains(&m) => {}
            other => return Err(ParseError::UnsupportedCursorMethod(other.to_string())),
        }
    }

    if sort.is_none() && skip.is_none() && limit.is_none() && projection.is_none() {
        return Ok(QueryOp::Find { filter });
    }
    let mut pipeline = Vec::new();
    if !filter.is_empty() {
        pipeline.push(doc! { "$match": filter });
    }
    if let Some(sort) = sort {
        pipeline.push(doc! { "$sort": sort });
    }
    if let Some(n) = skip.filter(|n| *n > 0) {
        pipeline.push(doc! { "$skip": n });
    }
    if let Some(n) = limit.filter(|n| *n != 0) {
        pipeline.push(doc! { "$limit": n.abs() });
    }
    if let Some(projection) = projection {
        pipeline.push(doc! { "$project": projection });
    }
    Ok(QueryOp::Aggregate { pipeline })
}

fn reject_cursor_methods(chain: &[(String, &str)]) -> Result<(), ParseError> {
    match chain.iter().find(|(m, _)| !NEUTRAL_CURSOR_METHODS.contains(&m.as_str())) {
        Some((m, _)) => Err(ParseError::UnsupportedCursorMethod(m.clone())),
        None => Ok(()),
    }
}

fn cursor_number(method: &str, arg: &str) -> Result<i64, ParseError> {
    arg.trim().parse().map_err(|_| ParseError::InvalidCursorArgument(method.to_string()))
}

/// First object in `text`, or an empty document when there is none.
fn optional_document(text: &str) -> Result<Document, ParseError> {
    match balanced(text, '{')? {
        Some(raw) => parse_document(raw),
        None => Ok(Document::new()),
    }
}

/// `.name(args)` calls directly following a closed call, in order.
fn cursor_chain(mut rest: &str) -> Vec<(String, &str)> {
    let mut calls = Vec::new();
    loop {
        let Some(after_dot) = rest.trim_start().strip_prefix('.') else { break };
        let after_dot = after_dot.trim_start();
        let name_len = after_dot.find(|c: char| !(c.is_alphanumeric() || c == '_')).unwrap_or(after_dot.len());
        let (name, tail) = after_dot.split_at(name_len);
        let Some(inner) = tail.trim_start().strip_prefix('(') else { break };
        if name.is_empty() {
            break;
        }
        match closing_paren(inner) {
            Some(end) => {
                calls.push((name.to_string(), &inner[..end]));
                rest = &inner[end + 1..];
            }
            None => {
                calls.push((name.to_string(), inner));
                break;
            }
        }
    }
    calls
}

/// Split call arguments on top-level commas.
fn top_level_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in outside_strings(args) {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Drop Markdown fence lines (```` ``` ```` / ```` ```javascript ````).
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse one relaxed-JSON object into a BSON document.
pub fn parse_document(raw: &str) -> Result<Document, ParseError> {
    match to_bson(raw)? {
        Bson::Document(d) => Ok(d),
        other => Err(ParseError::InvalidDocument(format!("expected an object, got {other}"))),
    }
}

fn parse_pipeline(raw: &str) -> Result<Vec<Document>, ParseError> {
    match to_bson(raw)? {
        Bson::Array(stages) => stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| match stage {
                Bson::Document(d) => Ok(d),
                _ => Err(ParseError::InvalidStage(i)),
            })
            .collect(),
        _ => Err(ParseError::MissingPipeline),
    }
}

/// Strict JSON first, then the shell-tolerant rewrite.
fn to_bson(raw: &str) -> Result<Bson, ParseError> {
    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v) => v,
        Err(_) => {
            let relaxed = relax(&rewrite_shell_helpers(raw));
            serde_json::from_str(&relaxed).map_err(|e| ParseError::InvalidDocument(e.to_string()))?
        }
    };
    Bson::try_from(value).map_err(|e| ParseError::InvalidDocument(e.to_string()))
}

/// `ObjectId("…")` → `{"$oid": "…"}`, `ISODate("…")` / `new Date("…")` →
/// `{"$date": "…"}` with a date-only value widened to midnight UTC.
fn rewrite_shell_helpers(raw: &str) -> String {
    let with_ids = OBJECT_ID_RE.replace_all(raw, r#"{"$$oid": "$1"}"#);
    DATE_RE
        .replace_all(&with_ids, |caps: &Captures| {
            let date = caps.get(1).map(|m| normalize_date(m.as_str())).unwrap_or_else(|| Utc::now().to_rfc3339());
            format!(r#"{{"$date": "{date}"}}"#)
        })
        .into_owned()
}

fn normalize_date(s: &str) -> String {
    if !s.contains('T') {
        return format!("{s}T00:00:00Z");
    }
    let has_zone = s.ends_with('Z') || s.rsplit('T').next().is_some_and(|t| t.contains('+') || t.contains('-'));
    if has_zone { s.to_string() } else { format!("{s}Z") }
}

/// Chars outside quoted strings, with their byte offsets.
fn outside_strings(text: &str) -> Vec<(usize, char)> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            _ => out.push((i, c)),
        }
    }
    out
}

/// Byte offset of the `)` closing a call whose `(` was just consumed.
fn closing_paren(after_paren: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in outside_strings(after_paren) {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced group opened by `open` (`{` or `[`).
fn balanced(text: &str, open: char) -> Result<Option<&str>, ParseError> {
    let chars = outside_strings(text);
    let Some(pos) = chars.iter().position(|&(_, c)| c == open) else {
        return Ok(None);
    };
    let start = chars[pos].0;
    let mut depth = 0usize;
    for &(i, c) in &chars[pos..] {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(&text[start..=i]));
                }
            }
            _ => {}
        }
    }
    Err(ParseError::Unbalanced(open))
}

/// Rewrite shell object syntax into JSON: quote bare keys, turn
/// single-quoted strings into double-quoted ones, turn `/re/flags` literals
/// into regular expressions, and drop trailing commas.
fn relax(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut last_sig: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = string_end(&chars, i, '"');
                out.extend(&chars[i..end]);
                last_sig = Some('"');
                i = end;
            }
            '\'' => {
                let end = string_end(&chars, i, '\'');
                let inner_end = if end > i + 1 && chars[end - 1] == '\'' { end - 1 } else { end };
                out.push('"');
                let mut j = i + 1;
                while j < inner_end {
                    match chars[j] {
                        '\\' if chars.get(j + 1) == Some(&'\'') => {
                            out.push('\'');
                            j += 1;
                        }
                        '\\' => {
                            out.push('\\');
                            if let Some(n) = chars.get(j + 1) {
                                out.push(*n);
                                j += 1;
                            }
                        }
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                    j += 1;
                }
                out.push('"');
                last_sig = Some('"');
                i = end;
            }
            '/' if matches!(last_sig, Some(':' | ',' | '[' | '(')) => {
                let (literal, next) = regex_literal(&chars, i);
                out.push_str(&literal);
                last_sig = Some('}');
                i = next;
            }
            c if (c.is_alphabetic() || c == '_' || c == '$') && matches!(last_sig, Some('{' | ',')) => {
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || matches!(chars[j], '_' | '$' | '.')) {
                    j += 1;
                }
                let ident: String = chars[i..j].iter().collect();
                let mut k = j;
                while k < chars.len() && chars[k].is_whitespace() {
                    k += 1;
                }
                if chars.get(k) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                last_sig = Some(chars[j - 1]);
                i = j;
            }
            '}' | ']' => {
                let trimmed = out.trim_end().len();
                if out[..trimmed].ends_with(',') {
                    out.truncate(trimmed - 1);
                }
                out.push(c);
                last_sig = Some(c);
                i += 1;
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last_sig = Some(c);
                }
                i += 1;
            }
        }
    }
    out
}

/// Index one past the closing `quote` of the string starting at `start`.
fn string_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

/// `/pattern/flags` starting at `start` as an extended-JSON regular expression.
fn regex_literal(chars: &[char], start: usize) -> (String, usize) {
    let mut j = start + 1;
    let mut pattern = String::new();
    while j < chars.len() && chars[j] != '/' {
        if chars[j] == '\\' && j + 1 < chars.len() {
            pattern.push(chars[j]);
            j += 1;
        }
        pattern.push(chars[j]);
        j += 1;
    }
    j += 1;
    let mut flags = String::new();
    while j < chars.len() && chars[j].is_ascii_alphabetic() {
        flags.push(chars[j]);
        j += 1;
    }
    let pattern = serde_json::Value::String(pattern).to_string();
    let literal = format!(r#"{{"$regularExpression": {{"pattern": {pattern}, "options": "{flags}"}}}}"#);
    (literal, j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};

    fn filter_of(q: ParsedQuery) -> Document {
        match q.op {
            QueryOp::Find { filter } | QueryOp::Count { filter } => filter,
            QueryOp::Aggregate { .. } => panic!("expected a filter query"),
        }
    }

    #[test]
    fn strict_json_find() {
        let q = parse(r#"db.orders.find({"status": "pending"})"#).unwrap();
        assert_eq!(q.collection, "orders");
        assert_eq!(q.op, QueryOp::Find { filter: doc! { "status": "pending" } });
    }

    #[test]
    fn shell_syntax_find_inside_fences() {
        let text = "Here you go:\n```javascript\ndb.users.find({ role: 'admin', age: { $gt: 30 } })\n```";
        let q = parse(text).unwrap();
        assert_eq!(q.collection, "users");
        assert_eq!(filter_of(q), doc! { "role": "admin", "age": { "$gt": 30 } });
    }

    #[test]
    fn empty_find_is_empty_filter() {
        let q = parse("db.products.find()").unwrap();
        assert_eq!(q.op, QueryOp::Find { filter: Document::new() });
    }

    #[test]
    fn sort_and_limit_become_a_pipeline() {
        let q = parse("db.products.find({stock: {$gt: 0}}).sort({price: -1}).limit(5)").unwrap();
        assert_eq!(
            q.op,
            QueryOp::Aggregate {
                pipeline: vec![
                    doc! { "$match": { "stock": { "$gt": 0 } } },
                    doc! { "$sort": { "price": -1 } },
                    doc! { "$limit": 5_i64 },
                ]
            }
        );
    }

    #[test]
    fn cursor_order_follows_mongo_not_the_chain() {
        let q = parse("db.products.find({}, {title: 1, _id: 0}).limit(3).skip(6).sort({title: 1}).pretty()").unwrap();
        assert_eq!(
            q.op,
            QueryOp::Aggregate {
                pipeline: vec![
                    doc! { "$sort": { "title": 1 } },
                    doc! { "$skip": 6_i64 },
                    doc! { "$limit": 3_i64 },
                    doc! { "$project": { "title": 1, "_id": 0 } },
                ]
            }
        );
    }

    #[test]
    fn chained_count_is_a_count() {
        let q = parse("db.orders.find({status: 'pending'}).count()").unwrap();
        assert_eq!(q.op, QueryOp::Count { filter: doc! { "status": "pending" } });
    }

    #[test]
    fn neutral_cursor_methods_keep_a_find() {
        let q = parse("db.orders.find({status: 'pending'}).toArray();").unwrap();
        assert_eq!(q.op, QueryOp::Find { filter: doc! { "status": "pending" } });
    }

    #[test]
    fn unknown_cursor_method_is_error() {
        assert_eq!(
            parse("db.orders.find({}).forEach(printjson)"),
            Err(ParseError::UnsupportedCursorMethod("forEach".into()))
        );
        assert_eq!(
            parse("db.orders.aggregate([{$match: {}}]).explain()"),
            Err(ParseError::UnsupportedCursorMethod("explain".into()))
        );
        assert_eq!(
            parse("db.orders.find().limit(ten)"),
            Err(ParseError::InvalidCursorArgument("limit".into()))
        );
    }

    #[test]
    fn count_variants() {
        let q = parse("db.orders.countDocuments({status: \"completed\"})").unwrap();
        assert_eq!(q.op, QueryOp::Count { filter: doc! { "status": "completed" } });
        let q = parse("db.orders.count()").unwrap();
        assert_eq!(q.op, QueryOp::Count { filter: Document::new() });
    }

    #[test]
    fn aggregate_pipeline_with_trailing_comma() {
        let q = parse(
            "db.orders.aggregate([\n  {$group: {_id: null, total: {$sum: '$amount'}}},\n  {$limit: 5},\n])",
        )
        .unwrap();
        assert_eq!(
            q.op,
            QueryOp::Aggregate {
                pipeline: vec![
                    doc! { "$group": { "_id": null, "total": { "$sum": "$amount" } } },
                    doc! { "$limit": 5 },
                ]
            }
        );
    }

    #[test]
    fn aggregate_without_array_is_error() {
        assert_eq!(parse("db.orders.aggregate()"), Err(ParseError::MissingPipeline));
    }

    #[test]
    fn aggregate_stage_must_be_object() {
        assert_eq!(parse("db.orders.aggregate([1])"), Err(ParseError::InvalidStage(0)));
    }

    #[test]
    fn no_command_found() {
        assert_eq!(parse("SELECT * FROM orders"), Err(ParseError::NoCommand));
        assert_eq!(parse("db.orders.findOne({})"), Err(ParseError::NoCommand));
    }

    #[test]
    fn unbalanced_object_is_error() {
        assert_eq!(parse("db.orders.find({status: 'x'"), Err(ParseError::Unbalanced('{')));
    }

    #[test]
    fn garbage_object_is_error_not_empty_filter() {
        assert!(matches!(parse("db.orders.find({status = 'x'})"), Err(ParseError::InvalidDocument(_))));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let q = parse(r#"db.notes.find({text: "a } b", tag: 'x)y'})"#).unwrap();
        assert_eq!(filter_of(q), doc! { "text": "a } b", "tag": "x)y" });
    }

    #[test]
    fn object_id_helper() {
        let hex = "64b7f0c2a1b2c3d4e5f60718";
        let q = parse(&format!("db.orders.find({{_id: ObjectId(\"{hex}\")}})")).unwrap();
        let oid = ObjectId::parse_str(hex).unwrap();
        assert_eq!(filter_of(q), doc! { "_id": oid });
    }

    #[test]
    fn date_helpers() {
        let q = parse("db.orders.find({createdAt: {$gte: ISODate('2024-01-01')}})").unwrap();
        let f = filter_of(q);
        let inner = f.get_document("createdAt").unwrap();
        assert!(matches!(inner.get("$gte"), Some(Bson::DateTime(_))));

        let q = parse("db.orders.find({createdAt: {$lt: new Date(\"2024-06-01T12:00:00\")}})").unwrap();
        let f = filter_of(q);
        assert!(matches!(f.get_document("createdAt").unwrap().get("$lt"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn regex_literal_becomes_regex_document() {
        let q = parse("db.customers.find({name: /^ada/i})").unwrap();
        let f = filter_of(q);
        let re = f.get("name").unwrap();
        assert!(matches!(re, Bson::RegularExpression(r) if r.pattern == "^ada" && r.options == "i"));
    }

    #[test]
    fn escaped_quote_in_single_quoted_string() {
        let q = parse(r#"db.people.find({name: 'O\'Brien'})"#).unwrap();
        assert_eq!(filter_of(q), doc! { "name": "O'Brien" });
    }

    #[test]
    fn relax_leaves_values_alone() {
        assert_eq!(relax("{a: true, b: [x, 1]}"), r#"{"a": true, "b": [x, 1]}"#);
    }

    #[test]
    fn date_normalization() {
        assert_eq!(normalize_date("2024-01-01"), "2024-01-01T00:00:00Z");
        assert_eq!(normalize_date("2024-01-01T10:00:00"), "2024-01-01T10:00:00Z");
        assert_eq!(normalize_date("2024-01-01T10:00:00+02:00"), "2024-01-01T10:00:00+02:00");
    }
}
