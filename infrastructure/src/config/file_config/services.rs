//! Collaborator endpoints from TOML (`[collaborators]`, `[connectors]`)

use super::ConfigValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Raw collaborator configuration from TOML
///
/// ```toml
/// [collaborators]
/// ingestion_url = "http://localhost:8001"
/// embedding_url = "http://localhost:8002"
/// index_url = "http://localhost:8003"
/// llm_url = "https://api.openai.com/v1"
/// llm_model = "gpt-4o-mini"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCollaboratorsConfig {
    /// Text extraction service; plain text is chunked locally when unset
    pub ingestion_url: Option<String>,
    pub embedding_url: Option<String>,
    pub index_url: Option<String>,
    /// OpenAI-compatible chat completions endpoint
    pub llm_url: Option<String>,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for FileCollaboratorsConfig {
    fn default() -> Self {
        Self {
            ingestion_url: None,
            embedding_url: None,
            index_url: None,
            llm_url: None,
            llm_model: "gpt-4o-mini".to_string(),
            llm_api_key: None,
            request_timeout_secs: 30,
        }
    }
}

impl FileCollaboratorsConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidRequestTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Raw connector configuration from TOML
///
/// ```toml
/// [connectors]
/// token = "..."
/// jira = "http://hooks.internal/jira"
/// email = "http://hooks.internal/mail"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConnectorsConfig {
    /// Bearer token sent to every webhook
    pub token: Option<String>,
    /// Service name to webhook URL
    #[serde(flatten)]
    pub urls: BTreeMap<String, String>,
}

impl FileConnectorsConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        match self.urls.iter().find(|(_, url)| url.trim().is_empty()) {
            Some((service, _)) => Err(ConfigValidationError::EmptyConnectorUrl(service.clone())),
            None => Ok(()),
        }
    }
}
