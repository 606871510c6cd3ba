//! Canned queries for question shapes small models get wrong.
//!
//! Currently one: orders joined with their customer's name and email.

use mongodb::bson::{Document, doc};

use crate::index::SchemaIndex;

const ORDERS: &str = "orders";
const CUSTOMERS: &str = "customers";

const CUSTOMER_WORDS: [&str; 3] = ["customer", "user", "client"];
const DETAIL_WORDS: [&str; 4] = ["name", "email", "detail", "info"];
const STATUSES: [&str; 3] = ["completed", "pending", "cancelled"];

/// A pipeline to run directly, bypassing the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CannedQuery {
    pub collection: String,
    pub pipeline: Vec<Document>,
}

/// Orders-with-customer-details join, when the question asks for it and both
/// collections are indexed.
pub fn match_template(question: &str, index: &SchemaIndex, limit: usize) -> Option<CannedQuery> {
    let q = question.to_lowercase();
    let wants_join = q.contains("order")
        && CUSTOMER_WORDS.iter().any(|w| q.contains(w))
        && DETAIL_WORDS.iter().any(|w| q.contains(w));
    if !wants_join || !index.contains(ORDERS) || !index.contains(CUSTOMERS) {
        return None;
    }

    let mut filter = Document::new();
    if let Some(status) = STATUSES.iter().find(|s| q.contains(*s)) {
        filter.insert("status", *status);
    }

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    Some(CannedQuery {
        collection: ORDERS.to_string(),
        pipeline: vec![
            doc! { "$match": filter },
            doc! { "$lookup": {
                "from": CUSTOMERS,
                "localField": "customerId",
                "foreignField": "_id",
                "as": "customer_info"
            } },
            doc! { "$unwind": { "path": "$customer_info", "preserveNullAndEmptyArrays": true } },
            doc! { "$project": {
                "_id": 0,
                "status": 1,
                "amount": 1,
                "quantity": 1,
                "customer_name": "$customer_info.name",
                "customer_email": "$customer_info.email"
            } },
            doc! { "$limit": limit },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexedCollection;
    use std::collections::BTreeMap;

    fn index(names: &[&str]) -> SchemaIndex {
        let entry = IndexedCollection {
            description: String::new(),
            collection_embedding: vec![1.0],
            fields: Vec::new(),
            field_embeddings: BTreeMap::new(),
            doc_count: 0,
            indexed_fields: Vec::new(),
        };
        SchemaIndex::from_collections(names.iter().map(|n| (n.to_string(), entry.clone())).collect())
    }

    #[test]
    fn join_with_status_filter() {
        let q = match_template(
            "Show pending orders with customer names",
            &index(&["orders", "customers"]),
            10,
        )
        .unwrap();
        assert_eq!(q.collection, "orders");
        assert_eq!(q.pipeline.len(), 5);
        assert_eq!(q.pipeline[0], doc! { "$match": { "status": "pending" } });
        assert_eq!(q.pipeline[4], doc! { "$limit": 10_i64 });
        let project = q.pipeline[3].get_document("$project").unwrap();
        assert_eq!(project.get_str("customer_email").unwrap(), "$customer_info.email");
    }

    #[test]
    fn join_without_status_matches_everything() {
        let q = match_template("order list with client info", &index(&["orders", "customers"]), 5).unwrap();
        assert_eq!(q.pipeline[0], doc! { "$match": {} });
    }

    #[test]
    fn requires_detail_word() {
        assert!(match_template("how many orders per customer", &index(&["orders", "customers"]), 10).is_none());
    }

    #[test]
    fn requires_both_collections() {
        assert!(match_template("orders with customer email", &index(&["orders"]), 10).is_none());
    }
}
