//! [`PersistenceSink`] implementation for [`Database`].

use relaychat_shared::{Conversation, Message, PersistenceError, PersistenceSink, User, Uuid};

use crate::database::Database;
use crate::error::StoreError;

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        PersistenceError::backend(err)
    }
}

impl PersistenceSink for Database {
    fn write_user(&self, user: &User) -> Result<(), PersistenceError> {
        self.insert_user(user)?;
        tracing::debug!(user.id = %user.id, "user persisted");
        Ok(())
    }

    fn write_conversation(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        self.insert_conversation(conversation)?;
        self.insert_member(&conversation.owner, &conversation.id)?;
        tracing::debug!(conversation.id = %conversation.id, "conversation persisted");
        Ok(())
    }

    fn write_message(&self, message: &Message) -> Result<(), PersistenceError> {
        self.insert_message(message)?;
        tracing::debug!(message.id = %message.id, "message persisted");
        Ok(())
    }

    fn write_membership(&self, user: &Uuid, conversation: &Uuid) -> Result<(), PersistenceError> {
        self.insert_member(user, conversation)?;
        Ok(())
    }
}
