//! Embedding service client (`POST /embed`).

use super::http::HttpService;
use async_trait::async_trait;
use attest_application::{CollaboratorError, EmbeddingClient};
use serde::{Deserialize, Serialize};

/// The service rejects larger batches.
const MAX_BATCH: usize = 100;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    normalize: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct HttpEmbeddingClient {
    service: HttpService,
}

impl HttpEmbeddingClient {
    pub fn new(service: HttpService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            let response: EmbedResponse = self
                .service
                .post_json(
                    "embed",
                    &EmbedRequest {
                        texts: batch,
                        normalize: true,
                    },
                )
                .await?;
            if response.embeddings.len() != batch.len() {
                return Err(CollaboratorError::InvalidResponse(format!(
                    "embedding returned {} vectors for {} texts",
                    response.embeddings.len(),
                    batch.len()
                )));
            }
            vectors.extend(response.embeddings);
        }
        Ok(vectors)
    }
}
