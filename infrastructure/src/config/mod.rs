//! Configuration file loading for attest
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `ATTEST_*` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./attest.toml` or `./.attest.toml`
//! 4. Global: `$XDG_CONFIG_HOME/attest/config.toml` (or the platform equivalent)
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileApprovalConfig, FileCollaboratorsConfig, FileConfig,
    FileConnectorsConfig, FileFabricConfig, FileLoggingConfig, FileOrchestratorConfig,
    FileRetryConfig, FileStoreConfig,
};
pub use loader::ConfigLoader;
