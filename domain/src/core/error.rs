//! Domain error types

use thiserror::Error;

/// Domain-level errors.
///
/// Raised by entity state machines when a requested transition is not
/// legal from the current state, and by value-object constructors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} is already terminal ({status})")]
    AlreadyTerminal { entity: &'static str, status: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to serialize {0} state")]
    Serialization(&'static str),
}

impl DomainError {
    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        DomainError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Check if this error was caused by an illegal state change
    pub fn is_transition_error(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidTransition { .. } | DomainError::AlreadyTerminal { .. }
        )
    }
}
