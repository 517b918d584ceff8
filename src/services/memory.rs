//! In-memory document index
//!
//! Term-overlap scoring stands in for embedding similarity. Useful for local
//! runs of the CLI and as a deterministic index in tests.
//!
//! `search` and `keyword_search` share the same scoring here, so on this index
//! the `KeywordMatch` fallback costs the same as `VectorQuery`. The two differ
//! only in where the terms come from: keywords of the raw question versus the
//! entities produced earlier in the run. An embedding-backed index is where the
//! fallback becomes the cheaper path.

use crate::errors::Result;
use crate::pipeline::operations::entity::extract_keywords;
use crate::services::{Document, VectorIndex};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct IndexedDocument {
    id: String,
    content: String,
    terms: HashSet<String>,
}

/// Document store searched by term overlap
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    documents: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index built from `(id, content)` pairs
    pub fn from_documents<I, S, T>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let index = Self::new();
        for (id, content) in documents {
            index.add(id, content);
        }
        index
    }

    pub fn add(&self, id: impl Into<String>, content: impl Into<String>) {
        let content = content.into();
        let terms = extract_keywords(&content).into_iter().collect();
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.push(IndexedDocument {
            id: id.into(),
            content,
            terms,
        });
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rank(&self, terms: &[String], top_k: usize) -> Vec<Document> {
        if terms.is_empty() {
            return Vec::new();
        }

        let documents = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut scored: Vec<Document> = documents
            .iter()
            .filter_map(|doc| {
                let hits = terms.iter().filter(|t| doc.terms.contains(*t)).count();
                (hits > 0).then(|| Document {
                    id: doc.id.clone(),
                    content: doc.content.clone(),
                    score: hits as f32 / terms.len() as f32,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        scored
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Document>> {
        Ok(self.rank(&extract_keywords(query), top_k))
    }

    async fn keyword_search(&self, keywords: &[String], top_k: usize) -> Result<Vec<Document>> {
        let terms: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        Ok(self.rank(&terms, top_k))
    }
}
