//! Strongly-typed identifiers.
//!
//! Every persisted entity has its own id newtype so that a passage id can
//! never be handed where a request id is expected. Ids are UUID v4 strings
//! when generated by the core; ids arriving from outside (e.g. citation
//! tokens emitted by an LLM) are accepted verbatim and compared as strings.

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an id from an existing string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of an ingested document.
    DocumentId
);
entity_id!(
    /// Identifier of a passage (the unit of retrieval and citation).
    PassageId
);
entity_id!(
    /// Identifier of a user query.
    RequestId
);
entity_id!(
    /// Identifier of a single agent invocation.
    TaskId
);
entity_id!(
    /// Identifier of a proposed side-effecting action.
    ActionId
);
entity_id!(
    /// Identifier of an audit event.
    EventId
);
