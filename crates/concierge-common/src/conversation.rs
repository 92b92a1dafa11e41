//! Conversation model shared by the router, the session store and the transports
//!
//! A conversation is an ordered list of role-tagged turns keyed by an opaque
//! session key. The whole conversation is serialized as one JSON blob when
//! persisted, so the store never needs to understand individual turns.

use serde::{Deserialize, Serialize};

/// Role tag for a single conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One role-tagged message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,

    /// Message text. For tool turns this is the capability output (or a
    /// generic failure notice).
    pub content: String,

    /// Capability name, set only for tool turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    /// Provider call id for tool turns, when the backend supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    /// Unix timestamp of when the turn was recorded
    #[serde(default)]
    pub timestamp: i64,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: content.into(),
            capability: None,
            call_id: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            content: content.into(),
            capability: None,
            call_id: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn tool(
        capability: impl Into<String>,
        content: impl Into<String>,
        call_id: Option<String>,
    ) -> Self {
        Turn {
            role: Role::Tool,
            content: content.into(),
            capability: Some(capability.into()),
            call_id,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// An ordered sequence of turns for one session key
///
/// Created implicitly (empty) for a session key that has never been seen.
/// The router appends turns as the conversation progresses and saves the
/// whole conversation once per completed `handle` call; concurrent writers
/// for the same key follow last-write-wins semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub session_key: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Create a fresh, empty conversation for a session key
    pub fn new(session_key: impl Into<String>) -> Self {
        Conversation {
            session_key: session_key.into(),
            turns: Vec::new(),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Generate a fresh session key for callers that did not supply one
    pub fn generate_key() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_roundtrip() {
        let turn = Turn::tool("knowledge_search", "found it", Some("call_1".to_string()));
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Tool);
        assert_eq!(back.capability.as_deref(), Some("knowledge_search"));
        assert_eq!(back.call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_plain_turns_omit_capability_fields() {
        let json = serde_json::to_string(&Turn::user("hello")).unwrap();
        assert!(!json.contains("capability"));
        assert!(!json.contains("call_id"));
    }

    #[test]
    fn test_new_conversation_is_empty() {
        let convo = Conversation::new("s1");
        assert!(convo.is_empty());
        assert_eq!(convo.session_key, "s1");
    }
}
