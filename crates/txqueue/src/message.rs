//! Message types for queue operations including core domain identifiers.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Longest accepted queue name
    pub const MAX_LEN: usize = 128;

    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigurationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue_name".to_string(),
            });
        }

        if name.len() > Self::MAX_LEN {
            return Err(ConfigurationError::Invalid {
                key: "queue_name".to_string(),
                message: format!("must be at most {} characters", Self::MAX_LEN),
            });
        }

        // Backends embed the name in schema-qualified identifiers
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '$'))
        {
            return Err(ConfigurationError::Invalid {
                key: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '_', '-', '.' and '$' allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueName {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Backend-assigned message identity: a fixed 16-byte opaque handle.
///
/// Backends hand the identity over as hex text; [`FromStr`] decodes it back
/// to raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId([u8; MessageId::LEN]);

impl MessageId {
    /// Size of the raw identity in bytes
    pub const LEN: usize = 16;

    /// Generate a new random message ID
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Wrap raw identity bytes
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw identity bytes
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex encoding used on the wire
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for MessageId {
    type Err = MessageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; Self::LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|source| MessageIdError {
            value: s.to_string(),
            source,
        })?;
        Ok(Self(bytes))
    }
}

/// Failure to decode a textual message identity
#[derive(Debug, thiserror::Error)]
#[error("invalid message id '{value}': {source}")]
pub struct MessageIdError {
    value: String,
    source: hex::FromHexError,
}

// ============================================================================
// Messages
// ============================================================================

/// A queue message envelope, generic over the backend's structured form.
///
/// Messages are mutable before they are sent. A message obtained from a
/// dequeue handle is only reachable through a shared reference, so its
/// identity cannot change while the handle lives.
pub trait QueueMessage: Clone + Send + Sync + 'static {
    /// Backend-specific structured view of the message
    type Raw;

    /// Structured view
    fn raw(&self) -> Self::Raw;

    /// Text view
    fn text(&self) -> &str;

    /// Replace the message from a structured view
    fn set_raw(&mut self, raw: Self::Raw);

    /// Replace the text content
    fn set_text(&mut self, text: String);

    /// Backend identity, present only on received messages
    fn id(&self) -> Option<&MessageId>;
}

/// Plain text message used by backends without a richer payload form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMessage {
    pub id: Option<MessageId>,
    pub content: String,
}

impl TextMessage {
    /// Create an unsent message with the given content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
        }
    }

    /// Create a received message carrying its backend identity
    pub fn received(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            content: content.into(),
        }
    }
}

impl QueueMessage for TextMessage {
    type Raw = TextMessage;

    fn raw(&self) -> Self::Raw {
        self.clone()
    }

    fn text(&self) -> &str {
        &self.content
    }

    fn set_raw(&mut self, raw: Self::Raw) {
        *self = raw;
    }

    fn set_text(&mut self, text: String) {
        self.content = text;
    }

    fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
