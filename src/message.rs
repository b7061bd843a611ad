//! Message protocol definitions
//!
//! One JSON record per WebSocket frame. Clients send a `ClientMessage`;
//! the room broadcasts a `ChatMessage` stamped by the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Client → Server message
///
/// Only the text is taken from the client. Any `name`, `when` or
/// `avatarUrl` fields in the frame are ignored and re-assigned on receipt.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    /// Message body
    #[serde(default)]
    pub message: String,
}

impl ClientMessage {
    /// Decode a text frame
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary frame carrying UTF-8 JSON
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AppError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Server → Client message
///
/// A single chat utterance as relayed by the room. Shared between all
/// outbound queues behind an `Arc`, so it is never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Sender's display name
    pub name: String,
    /// Message body
    pub message: String,
    /// Time the server received the message
    pub when: DateTime<Utc>,
    /// Sender's avatar, if one could be resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ChatMessage {
    /// Build a message stamped with the current time
    pub fn received(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            when: Utc::now(),
            avatar_url: None,
        }
    }

    /// Attach an avatar URL
    pub fn with_avatar(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = avatar_url.filter(|url| !url.is_empty());
        self
    }

    /// Encode for a text frame
    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}
