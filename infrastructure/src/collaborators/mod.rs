//! Collaborator adapters
//!
//! HTTP clients for the external services behind the collaborator ports,
//! plus two in-process implementations usable without any service running:
//!
//! | Port | HTTP adapter | In-process |
//! |------|--------------|------------|
//! | `IngestionClient` | [`HttpIngestionClient`] (`POST /extract`) | [`PlainTextIngestion`] |
//! | `EmbeddingClient` | [`HttpEmbeddingClient`] (`POST /embed`) | |
//! | `RetrievalIndex` | [`HttpRetrievalIndex`] (`/index/*`, `/search/hybrid`) | [`MemoryIndex`] |
//! | `LlmClient` | [`HttpLlmClient`] (`POST /chat/completions`) | |

mod embedding;
mod http;
mod index;
mod ingestion;
mod llm;
mod memory_index;
mod plain_text;

pub use embedding::HttpEmbeddingClient;
pub use http::HttpService;
pub use index::HttpRetrievalIndex;
pub use ingestion::HttpIngestionClient;
pub use llm::HttpLlmClient;
pub use memory_index::MemoryIndex;
pub use plain_text::PlainTextIngestion;
