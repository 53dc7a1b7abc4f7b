//! Message type carried by the PostgreSQL connector.

use chrono::{DateTime, Utc};
use txqueue::{MessageId, QueueMessage};

/// Structured view of a [`PgMessage`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgRawMessage {
    pub content: String,
    /// Server time of the enqueue commit; unset on unsent messages
    pub enqueued_at: Option<DateTime<Utc>>,
}

/// Text message with the server-side enqueue timestamp.
///
/// The identity is assigned by the connector and cannot be replaced through
/// [`QueueMessage::set_raw`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgMessage {
    id: Option<MessageId>,
    raw: PgRawMessage,
}

impl PgMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            raw: PgRawMessage {
                content: content.into(),
                enqueued_at: None,
            },
        }
    }

    pub(crate) fn received(id: MessageId, content: String, enqueued_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Some(id),
            raw: PgRawMessage {
                content,
                enqueued_at,
            },
        }
    }

    pub fn enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.raw.enqueued_at
    }
}

impl QueueMessage for PgMessage {
    type Raw = PgRawMessage;

    fn raw(&self) -> Self::Raw {
        self.raw.clone()
    }

    fn text(&self) -> &str {
        &self.raw.content
    }

    fn set_raw(&mut self, raw: Self::Raw) {
        self.raw = raw;
    }

    fn set_text(&mut self, text: String) {
        self.raw.content = text;
    }

    fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }
}
