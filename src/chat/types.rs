//! Conversation and message model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId};

/// Title shown for a conversation that has no user message yet.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Number of characters of the first user message kept in a derived title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Marker appended to a title cut short.
const TITLE_ELLIPSIS: &str = "...";

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed by the person using the client.
    User,
    /// Produced by the completion service (or a failure notice in its place).
    Assistant,
}

impl Role {
    /// Stable string form, also used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// One turn in a conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    /// Build a message stamped with `timestamp`.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Build a user message stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, now_ms())
    }

    /// Build an assistant message stamped with the current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, now_ms())
    }
}

/// A titled, ordered sequence of messages.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Messages in insertion order.
    pub messages: Vec<Message>,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at: i64,
    /// Last mutation timestamp in milliseconds since Unix epoch.
    pub updated_at: i64,
}

impl Conversation {
    /// Create an empty conversation with the placeholder title.
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            id: ConversationId::new(),
            title: PLACEHOLDER_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Last message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether the conversation ends with an assistant reply.
    #[must_use]
    pub fn ends_with_assistant(&self) -> bool {
        self.last_message()
            .is_some_and(|message| message.role == Role::Assistant)
    }
}

/// Derive a conversation title from its first user message.
///
/// Keeps the first [`TITLE_MAX_CHARS`] characters and appends `...` only when
/// something was cut. A message of exactly that length is kept as-is.
#[must_use]
pub fn derive_title(first_message: &str) -> String {
    let title: String = first_message.chars().take(TITLE_MAX_CHARS).collect();
    if title.len() < first_message.len() {
        format!("{title}{TITLE_ELLIPSIS}")
    } else {
        title
    }
}
