//! Local state from TOML (`[store]`, `[approval]`, `[logging]`)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw store configuration from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// SQLite database file
    pub path: Option<PathBuf>,
}

impl FileStoreConfig {
    /// Configured path, or `<data dir>/attest/attest.db`
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("attest")
                .join("attest.db"),
        }
    }
}

/// Raw approval configuration from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileApprovalConfig {
    /// Users allowed to resolve any pending action
    pub approvers: Vec<String>,
    /// Recipient filled into proposed email alerts
    pub alert_recipient: Option<String>,
}

/// Raw logging configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Write a daily-rolling log file here in addition to stderr
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "attest.log".to_string(),
        }
    }
}
