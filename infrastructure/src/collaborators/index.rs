//! Retrieval index service client.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | upsert | `POST /index/upsert` `{entries}` |
//! | search | `POST /search/hybrid` `{query_vector, query_text, top_k, user_id}` |
//! | remove | `POST /index/remove` `{doc_id}` |
//!
//! Search replies carry the two source rankings separately so fusion
//! happens in the engine, not in the service.

use super::http::HttpService;
use async_trait::async_trait;
use attest_application::{
    CollaboratorError, IndexEntry, IndexQuery, IndexResults, RetrievalIndex,
};
use attest_domain::DocumentId;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    entries: &'a [IndexEntry],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query_vector: &'a [f32],
    query_text: &'a str,
    top_k: usize,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoveRequest<'a> {
    doc_id: &'a str,
}

pub struct HttpRetrievalIndex {
    service: HttpService,
}

impl HttpRetrievalIndex {
    pub fn new(service: HttpService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RetrievalIndex for HttpRetrievalIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), CollaboratorError> {
        if entries.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .service
            .post_json("index/upsert", &UpsertRequest { entries: &entries })
            .await?;
        debug!(entries = entries.len(), "Index upsert complete");
        Ok(())
    }

    async fn search(&self, query: IndexQuery) -> Result<IndexResults, CollaboratorError> {
        let results: IndexResults = self
            .service
            .post_json(
                "search/hybrid",
                &SearchRequest {
                    query_vector: &query.vector,
                    query_text: &query.text,
                    top_k: query.limit,
                    user_id: &query.owner,
                },
            )
            .await?;
        debug!(
            vector = results.vector.len(),
            lexical = results.lexical.len(),
            "Index search complete"
        );
        Ok(results)
    }

    async fn remove_document(&self, doc_id: &DocumentId) -> Result<(), CollaboratorError> {
        let _: Value = self
            .service
            .post_json(
                "index/remove",
                &RemoveRequest {
                    doc_id: doc_id.as_str(),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_request_shape() {
        let vector = [0.5f32, 0.25];
        let body = serde_json::to_value(SearchRequest {
            query_vector: &vector,
            query_text: "login failures",
            top_k: 20,
            user_id: "alice",
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "query_vector": [0.5, 0.25],
                "query_text": "login failures",
                "top_k": 20,
                "user_id": "alice"
            })
        );
    }

    #[test]
    fn test_results_tolerate_missing_sources() {
        let results: IndexResults = serde_json::from_value(json!({
            "vector": [{"passage_id": "p1", "score": 0.9}]
        }))
        .unwrap();
        assert_eq!(results.vector.len(), 1);
        assert!(results.lexical.is_empty());
    }
}
