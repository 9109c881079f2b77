//! Entity records held by a chat server.
//!
//! Records are immutable once admitted, with one exception: the `next` link
//! of a [`Message`], which is patched exactly once when the following message
//! in the same conversation is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Uuid;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A chat user. `name` is unique per server, compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub creation: DateTime<Utc>,
    /// Credential as provided at creation.
    #[serde(skip_serializing, default)]
    pub password: String,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation. `owner` referenced an existing user at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub owner: Uuid,
    pub creation: DateTime<Utc>,
    pub title: String,
}

/// Listing view of a conversation together with the ends of its message chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub owner: Uuid,
    pub creation: DateTime<Utc>,
    pub title: String,
    pub first_message: Option<Uuid>,
    pub last_message: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, linked to its neighbours in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub author: Uuid,
    pub conversation: Uuid,
    pub content: String,
    pub creation: DateTime<Utc>,
    /// The chronologically following message, `None` while this is the tail.
    pub next: Option<Uuid>,
    /// The message this one followed. Never changes after creation.
    pub previous: Option<Uuid>,
}
