//! Ingestion service client.
//!
//! `POST /extract` with the blob as a multipart `file` part; the service
//! replies with chunked passages. Service-side passage numbers are dropped:
//! the engine assigns its own passage ids.

use super::http::HttpService;
use async_trait::async_trait;
use attest_application::{CollaboratorError, IngestionClient};
use attest_domain::PassageCandidate;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ExtractedPassage {
    text: String,
    #[serde(default)]
    page: Option<u32>,
    char_start: u64,
    char_end: u64,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    passages: Vec<ExtractedPassage>,
}

impl From<ExtractedPassage> for PassageCandidate {
    fn from(p: ExtractedPassage) -> Self {
        PassageCandidate {
            text: p.text,
            char_start: p.char_start,
            char_end: p.char_end,
            page: p.page,
            metadata: p.metadata,
        }
    }
}

pub struct HttpIngestionClient {
    service: HttpService,
}

impl HttpIngestionClient {
    pub fn new(service: HttpService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl IngestionClient for HttpIngestionClient {
    async fn extract(
        &self,
        blob: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<Vec<PassageCandidate>, CollaboratorError> {
        let part = Part::bytes(blob.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| CollaboratorError::Rejected(format!("content type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response: ExtractionResponse = self
            .service
            .send_json(self.service.post("extract").multipart(form))
            .await?;
        debug!(
            filename,
            passages = response.passages.len(),
            "Extraction complete"
        );
        Ok(response.passages.into_iter().map(Into::into).collect())
    }
}
