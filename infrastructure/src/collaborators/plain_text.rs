//! Local extraction for plain-text documents.
//!
//! Fixed-size character windows with overlap. Offsets are character
//! offsets into the decoded text; each window is trimmed and empty windows
//! are skipped.

use async_trait::async_trait;
use attest_application::{CollaboratorError, IngestionClient};
use attest_domain::PassageCandidate;
use serde_json::{Map, Value};

const DEFAULT_CHUNK_SIZE: usize = 1024;
const DEFAULT_OVERLAP: usize = 50;

#[derive(Debug, Clone)]
pub struct PlainTextIngestion {
    chunk_size: usize,
    overlap: usize,
}

impl Default for PlainTextIngestion {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl PlainTextIngestion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window size and overlap in characters. Overlap is clamped below the
    /// window size so the cursor always advances.
    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.overlap = overlap.min(self.chunk_size - 1);
        self
    }

    fn chunk(&self, text: &str) -> Vec<PassageCandidate> {
        let chars: Vec<char> = text.chars().collect();
        let stride = self.chunk_size - self.overlap;
        let mut passages = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                let mut metadata = Map::new();
                metadata.insert("length".into(), Value::from(trimmed.chars().count()));
                metadata.insert("format".into(), Value::from("txt"));
                passages.push(PassageCandidate {
                    text: trimmed.to_string(),
                    char_start: start as u64,
                    char_end: end as u64,
                    page: None,
                    metadata,
                });
            }
            if end == chars.len() {
                break;
            }
            start += stride;
        }
        passages
    }
}

fn is_text(filename: &str, content_type: &str) -> bool {
    content_type.starts_with("text/")
        || [".txt", ".md", ".log", ".csv"]
            .iter()
            .any(|ext| filename.to_lowercase().ends_with(ext))
}

#[async_trait]
impl IngestionClient for PlainTextIngestion {
    async fn extract(
        &self,
        blob: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<Vec<PassageCandidate>, CollaboratorError> {
        if !is_text(filename, content_type) {
            return Err(CollaboratorError::Rejected(format!(
                "unsupported file type: {}",
                content_type
            )));
        }
        let text = std::str::from_utf8(blob)
            .map_err(|e| CollaboratorError::Rejected(format!("{} is not UTF-8: {}", filename, e)))?;
        Ok(self.chunk(text))
    }
}
