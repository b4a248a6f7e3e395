//! Actor attribution for state transitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Who is responsible for a state transition.
///
/// Rendered as `system`, `user:<id>` or `agent:<name>` in the audit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    /// The orchestration engine itself
    System,
    /// A human identified by user id
    User(String),
    /// A pipeline agent identified by its stage name
    Agent(String),
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Actor::User(id.into())
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Actor::Agent(name.into())
    }

    /// Parse the ledger representation. Unknown prefixes are kept as users.
    pub fn parse(s: &str) -> Self {
        if s == "system" {
            Actor::System
        } else if let Some(id) = s.strip_prefix("user:") {
            Actor::User(id.to_string())
        } else if let Some(name) = s.strip_prefix("agent:") {
            Actor::Agent(name.to_string())
        } else {
            Actor::User(s.to_string())
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::Agent(name) => write!(f, "agent:{}", name),
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Actor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Actor::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_representation() {
        for actor in [Actor::System, Actor::user("alice"), Actor::agent("planner")] {
            assert_eq!(Actor::parse(&actor.to_string()), actor);
        }
    }

    #[test]
    fn test_bare_string_is_user() {
        assert_eq!(Actor::parse("bob"), Actor::user("bob"));
    }
}
