//! Human-readable rendering of query results.

use std::fmt::Write as _;

use mongodb::bson::{Bson, Document};

use crate::store::{display_value, truncate_chars};

pub const NO_RESULTS: &str = "No documents found matching your query.";

/// Keys shown in per-document summary lines, besides any key containing "name".
const DISPLAY_KEYS: [&str; 17] = [
    "name", "title", "email", "username", "product", "status", "value", "amount", "price",
    "totalSales", "orderCount", "stock", "inventory", "quantity", "category", "role", "city",
];

/// Keys rendered as currency in analysis results.
const MONEY_HINTS: [&str; 3] = ["price", "spending", "amount"];

/// Keys of a single-value aggregation that hold a document count.
const COUNT_KEYS: [&str; 2] = ["total", "count"];

/// Question word → (singular, plural) noun for count results, by priority.
const ENTITIES: [(&str, &str, &str); 4] = [
    ("customer", "customer", "customers"),
    ("product", "product", "products"),
    ("order", "order", "orders"),
    ("user", "user", "users"),
];

const FALLBACK_CHARS: usize = 200;

/// What a result answers; drives the wording of counts and suggestions.
#[derive(Debug, Clone, Copy)]
pub struct ResultContext<'a> {
    pub question: &'a str,
    pub collection: &'a str,
}

/// Count sentence, e.g. ``Count: 1,200 orders in `orders` match your query.``
/// The noun follows the entity named in the question, `documents` otherwise.
pub fn format_count(count: u64, ctx: &ResultContext<'_>) -> String {
    let lower = ctx.question.to_lowercase();
    let (singular, plural) = ENTITIES
        .iter()
        .find(|(word, _, _)| lower.contains(word))
        .map(|(_, one, many)| (*one, *many))
        .unwrap_or(("document", "documents"));
    let noun = if count == 1 { singular } else { plural };
    let verb = if count == 1 { "matches" } else { "match" };
    format!(
        "Count: {} {noun} in `{}` {verb} your query.",
        group_digits(&count.to_string()),
        ctx.collection
    )
}

/// Example questions offered when a query found nothing or failed.
pub fn suggestions(question: &str) -> [&'static str; 3] {
    let lower = question.to_lowercase();
    if lower.contains("sales") || lower.contains("revenue") {
        ["total sales", "sales by city", "sales this year"]
    } else if lower.contains("customer") {
        ["all customers", "top customers by spending", "customers by city"]
    } else if lower.contains("product") {
        ["all products", "top selling products", "products by category"]
    } else {
        ["total sales", "customer count", "recent orders"]
    }
}

fn suggestion_lines(question: &str) -> String {
    suggestions(question).iter().map(|s| format!("• '{s}'")).collect::<Vec<_>>().join("\n")
}

/// Empty-result reply with alternatives to try.
pub fn format_no_results(question: &str) -> String {
    format!("{NO_RESULTS}\n\nTry these alternatives:\n{}", suggestion_lines(question))
}

/// Hints appended to a failed query.
pub fn error_suggestions(question: &str) -> String {
    format!(
        "Suggestions:\n• Try a broader question with fewer filters\n• Check that the data exists in the database\n\nExample questions:\n{}",
        suggestion_lines(question)
    )
}

pub fn format_documents(docs: &[Document], ctx: &ResultContext<'_>) -> String {
    if docs.is_empty() {
        return format_no_results(ctx.question);
    }
    if let [single] = docs {
        if let Some(n) = count_value(single) {
            return format_count(n, ctx);
        }
        if matches!(single.get("_id"), Some(Bson::Null)) {
            return format_analysis(single);
        }
    }

    let n = docs.len();
    let mut out = format!("Found {n} result{}:\n\n", if n == 1 { "" } else { "s" });
    for (i, doc) in docs.iter().enumerate() {
        let mut fields = Vec::new();
        key_fields(doc, "", &mut fields);
        let line = if fields.is_empty() {
            truncate_chars(&doc.to_string(), FALLBACK_CHARS)
        } else {
            fields.join(", ")
        };
        let _ = writeln!(out, "{}. {line}", i + 1);
    }
    out.trim_end().to_string()
}

/// Single `{_id: null, …}` aggregation result as a bullet list.
fn format_analysis(doc: &Document) -> String {
    let mut out = String::from("Analysis Result:\n");
    for (key, value) in doc.iter().filter(|(k, _)| k.as_str() != "_id") {
        let label = title_case(key);
        let rendered = match as_number(value) {
            Some(n) if is_money(key) => money(n),
            Some(_) => grouped_number(value),
            None => display_value(value),
        };
        let _ = writeln!(out, "• {label}: {rendered}");
    }
    out.trim_end().to_string()
}

/// `{_id: null, total: 42}` or `{count: 42}`: a lone integer count.
fn count_value(doc: &Document) -> Option<u64> {
    let mut rest = doc.iter().filter(|(k, v)| !(k.as_str() == "_id" && matches!(v, Bson::Null)));
    let (key, value) = rest.next()?;
    if rest.next().is_some() || !COUNT_KEYS.contains(&key.as_str()) {
        return None;
    }
    match value {
        Bson::Int32(i) => u64::try_from(*i).ok(),
        Bson::Int64(i) => u64::try_from(*i).ok(),
        _ => None,
    }
}

fn key_fields(doc: &Document, prefix: &str, found: &mut Vec<String>) {
    for (key, value) in doc {
        if let Bson::Document(inner) = value {
            key_fields(inner, &format!("{prefix}{key}."), found);
            continue;
        }
        let path = format!("{prefix}{key}");
        let wanted = DISPLAY_KEYS.contains(&key.as_str())
            || DISPLAY_KEYS.contains(&path.as_str())
            || key.to_lowercase().contains("name");
        if wanted {
            found.push(format!("{key}: {}", display_value(value)));
        }
    }
}

fn is_money(key: &str) -> bool {
    let lower = key.to_lowercase();
    MONEY_HINTS.iter().any(|h| lower.contains(h))
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

/// `1234567` → `1,234,567`; doubles keep their fractional digits.
fn grouped_number(value: &Bson) -> String {
    match value {
        Bson::Int32(i) => group_digits(&i64::from(*i).to_string()),
        Bson::Int64(i) => group_digits(&i.to_string()),
        Bson::Double(d) => {
            let text = d.to_string();
            match text.split_once('.') {
                Some((int, frac)) => format!("{}.{frac}", group_digits(int)),
                None => group_digits(&text),
            }
        }
        other => display_value(other),
    }
}

/// `$1,234.50`
fn money(n: f64) -> String {
    let text = format!("{:.2}", n.abs());
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if n < 0.0 { "-" } else { "" };
    format!("{sign}${}.{frac}", group_digits(int))
}

fn group_digits(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{sign}{out}")
}

/// `total_sales` / `totalSales` → `Total Sales`.
pub fn title_case(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in key.chars() {
        if c == '_' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
