//! Core type definitions for the engine-generator communication protocol
//!
//! This module defines the data structures shared between the session engine
//! and completion generators. The message shape stays close to the chat
//! format used by OpenAI-compatible providers so that conversation history
//! can be forwarded without translation, while remaining provider-agnostic
//! at the trait boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn in a session's conversation log.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Opaque per-message annotations, e.g. which version a turn relates to.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// Usage statistics structure
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Accumulates another usage report. Saturating so a malformed provider
    /// report can never wrap the session counter backwards.
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// One completed generator turn: the raw assistant reply plus the provider's
/// reported token cost, if any.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Generation {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_add_accumulates() {
        let mut total = Usage::default();
        total.add(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.add(Usage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        });
        assert_eq!(total.prompt_tokens, 13);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, 20);
    }

    #[test]
    fn test_usage_add_saturates() {
        let mut total = Usage {
            prompt_tokens: u32::MAX,
            completion_tokens: 0,
            total_tokens: u32::MAX,
        };
        total.add(Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 1,
        });
        assert_eq!(total.prompt_tokens, u32::MAX);
        assert_eq!(total.total_tokens, u32::MAX);
    }

    #[test]
    fn test_message_metadata_roundtrip() {
        let mut msg = Message::assistant("done");
        msg.metadata
            .insert("version_index".to_string(), "2".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata.get("version_index").unwrap(), "2");
    }
}
