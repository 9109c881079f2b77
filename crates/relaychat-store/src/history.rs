//! Read-back of everything the database holds, used to rebuild the
//! in-memory state of a server when it restarts.

use relaychat_shared::{Conversation, Message, User, Uuid};

use crate::database::Database;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct History {
    /// Oldest first.
    pub users: Vec<User>,
    /// Oldest first.
    pub conversations: Vec<Conversation>,
    /// `(user, conversation)` pairs, owners included.
    pub memberships: Vec<(Uuid, Uuid)>,
    /// Insertion order.
    pub messages: Vec<Message>,
}

impl History {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.conversations.is_empty() && self.messages.is_empty()
    }
}

impl Database {
    pub fn load_history(&self) -> Result<History> {
        let history = History {
            users: self.list_users()?,
            conversations: self.list_conversations()?,
            memberships: self.list_memberships()?,
            messages: self.list_messages()?,
        };

        tracing::info!(
            users = history.users.len(),
            conversations = history.conversations.len(),
            messages = history.messages.len(),
            "history loaded"
        );
        Ok(history)
    }
}
