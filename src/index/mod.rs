//! Schema embedding index.
//!
//! Every collection is embedded as `"{name}: {description}"` and every field
//! as `"{field}: {type}"`. Questions are ranked against these vectors by
//! cosine similarity to pick the collections and fields shown to the model.

pub mod cache;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::{EmbedError, Embedder};
use crate::store::{CollectionSchema, FieldType};

/// Embeddings and live metadata for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedCollection {
    pub description: String,
    pub collection_embedding: Vec<f32>,
    /// Fields in sample-document order.
    pub fields: Vec<FieldType>,
    pub field_embeddings: BTreeMap<String, Vec<f32>>,
    pub doc_count: u64,
    pub indexed_fields: Vec<String>,
}

/// A ranked item and its cosine score.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaIndex {
    collections: BTreeMap<String, IndexedCollection>,
}

impl SchemaIndex {
    pub fn from_collections(collections: BTreeMap<String, IndexedCollection>) -> Self {
        Self { collections }
    }

    /// Embed every collection and field of `schema`.
    pub async fn build(schema: &[CollectionSchema], embedder: &Embedder) -> Result<Self, EmbedError> {
        let mut collections = BTreeMap::new();
        for coll in schema {
            let collection_embedding =
                embedder.embed(&format!("{}: {}", coll.name, coll.description)).await?;

            let mut field_embeddings = BTreeMap::new();
            for field in &coll.fields {
                let v = embedder.embed(&format!("{}: {}", field.name, field.type_name)).await?;
                field_embeddings.insert(field.name.clone(), v);
            }

            debug!(collection = %coll.name, fields = coll.fields.len(), "collection embedded");
            collections.insert(
                coll.name.clone(),
                IndexedCollection {
                    description: coll.description.clone(),
                    collection_embedding,
                    fields: coll.fields.clone(),
                    field_embeddings,
                    doc_count: coll.doc_count,
                    indexed_fields: coll.indexed_fields.clone(),
                },
            );
        }
        Ok(Self { collections })
    }

    /// Copy live counts and index names onto cached entries. A collection
    /// whose description changed gets its collection vector re-embedded.
    /// Returns how many collections were re-embedded.
    pub async fn refresh(
        &mut self,
        schema: &[CollectionSchema],
        embedder: &Embedder,
    ) -> Result<usize, EmbedError> {
        let mut reembedded = 0;
        for live in schema {
            let Some(entry) = self.collections.get_mut(&live.name) else { continue };
            entry.doc_count = live.doc_count;
            entry.indexed_fields = live.indexed_fields.clone();
            if entry.description != live.description {
                entry.collection_embedding =
                    embedder.embed(&format!("{}: {}", live.name, live.description)).await?;
                entry.description = live.description.clone();
                reembedded += 1;
            }
        }
        Ok(reembedded)
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    pub fn get(&self, collection: &str) -> Option<&IndexedCollection> {
        self.collections.get(collection)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn collections(&self) -> &BTreeMap<String, IndexedCollection> {
        &self.collections
    }

    /// Collections by descending similarity, ties by name, at most `top_k`.
    pub fn rank_collections(&self, question: &[f32], top_k: usize) -> Vec<Scored> {
        rank(
            self.collections
                .iter()
                .map(|(name, c)| (name, &c.collection_embedding)),
            question,
            top_k,
        )
    }

    /// Fields of one collection by descending similarity. Unknown collection
    /// gives an empty list.
    pub fn rank_fields(&self, question: &[f32], collection: &str, top_k: usize) -> Vec<Scored> {
        match self.collections.get(collection) {
            Some(c) => rank(c.field_embeddings.iter(), question, top_k),
            None => Vec::new(),
        }
    }
}

fn rank<'a>(
    items: impl Iterator<Item = (&'a String, &'a Vec<f32>)>,
    question: &[f32],
    top_k: usize,
) -> Vec<Scored> {
    let mut scored: Vec<Scored> = items
        .map(|(name, v)| Scored { name: name.clone(), score: cosine_similarity(question, v) })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    scored.truncate(top_k);
    scored
}

/// Cosine similarity; 0.0 for mismatched lengths, a zero-norm input or a
/// non-finite result.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let score = dot / (na * nb);
    if score.is_finite() { score } else { 0.0 }
}
