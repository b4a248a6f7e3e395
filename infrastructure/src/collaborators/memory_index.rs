//! In-process retrieval index.
//!
//! Cosine similarity for the vector ranking, query-term overlap for the
//! lexical ranking, both restricted to the querying owner's documents.
//! Contents live as long as the process.

use async_trait::async_trait;
use attest_application::{
    CollaboratorError, IndexEntry, IndexQuery, IndexResults, RetrievalIndex,
};
use attest_domain::{DocumentId, RankedCandidate};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms present in the text.
fn overlap(query: &HashSet<String>, text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let text = terms(text);
    query.iter().filter(|t| text.contains(*t)).count() as f64 / query.len() as f64
}

fn ranked(mut scored: Vec<RankedCandidate>, limit: usize) -> Vec<RankedCandidate> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.passage_id.as_str().cmp(b.passage_id.as_str()))
    });
    scored.truncate(limit);
    scored
}

#[async_trait]
impl RetrievalIndex for MemoryIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), CollaboratorError> {
        let mut index = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for entry in entries {
            index.insert(entry.passage_id.as_str().to_string(), entry);
        }
        Ok(())
    }

    async fn search(&self, query: IndexQuery) -> Result<IndexResults, CollaboratorError> {
        let index = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let query_terms = terms(&query.text);
        let owned: Vec<&IndexEntry> = index.values().filter(|e| e.owner == query.owner).collect();

        let vector = owned
            .iter()
            .map(|e| RankedCandidate::new(e.passage_id.clone(), cosine(&query.vector, &e.vector)))
            .collect();
        let lexical = owned
            .iter()
            .map(|e| RankedCandidate::new(e.passage_id.clone(), overlap(&query_terms, &e.text)))
            .filter(|c| c.score > 0.0)
            .collect();

        Ok(IndexResults {
            vector: ranked(vector, query.limit),
            lexical: ranked(lexical, query.limit),
        })
    }

    async fn remove_document(&self, doc_id: &DocumentId) -> Result<(), CollaboratorError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, e| &e.doc_id != doc_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::PassageId;

    fn entry(id: &str, doc: &str, owner: &str, text: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            passage_id: PassageId::new(id),
            doc_id: DocumentId::new(doc),
            owner: owner.to_string(),
            page: Some(1),
            text: text.to_string(),
            vector,
        }
    }

    fn query(owner: &str, text: &str, vector: Vec<f32>) -> IndexQuery {
        IndexQuery {
            vector,
            text: text.to_string(),
            owner: owner.to_string(),
            limit: 10,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_both_sources() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                entry("p1", "d1", "alice", "Login failures spiked", vec![1.0, 0.0]),
                entry("p2", "d1", "alice", "Rollback restored service", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index
            .search(query("alice", "rollback", vec![0.9, 0.1]))
            .await
            .unwrap();
        assert_eq!(results.vector[0].passage_id.as_str(), "p1");
        assert_eq!(results.lexical.len(), 1);
        assert_eq!(results.lexical[0].passage_id.as_str(), "p2");
    }

    #[tokio::test]
    async fn test_search_is_owner_scoped() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                entry("p1", "d1", "alice", "login", vec![1.0]),
                entry("p2", "d2", "bob", "login", vec![1.0]),
            ])
            .await
            .unwrap();
        let results = index.search(query("bob", "login", vec![1.0])).await.unwrap();
        assert_eq!(results.vector.len(), 1);
        assert_eq!(results.vector[0].passage_id.as_str(), "p2");
    }

    #[tokio::test]
    async fn test_remove_document() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                entry("p1", "d1", "alice", "a", vec![1.0]),
                entry("p2", "d2", "alice", "b", vec![1.0]),
            ])
            .await
            .unwrap();
        index.remove_document(&DocumentId::new("d1")).await.unwrap();
        assert_eq!(index.len(), 1);
    }
}
