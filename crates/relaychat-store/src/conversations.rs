//! CRUD operations for [`Conversation`] records and their members.

use rusqlite::params;

use relaychat_shared::{Conversation, Uuid};

use crate::database::{column_id, column_time, not_found, Database};
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new conversation.
    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn().execute(
            "INSERT INTO conversations (id, title, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.to_string(),
                conversation.title,
                conversation.owner.to_string(),
                conversation.creation.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Record `user` as a member of `conversation`. Adding an existing
    /// member is a no-op.
    pub fn insert_member(&self, user: &Uuid, conversation: &Uuid) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO user_conversation (user_id, conversation_id)
             VALUES (?1, ?2)",
            params![user.to_string(), conversation.to_string()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single conversation by identifier.
    pub fn get_conversation(&self, id: &Uuid) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, title, owner_id, created_at
                 FROM conversations
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// List all conversations, oldest first.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, title, owner_id, created_at
             FROM conversations
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Identifiers of the members of a conversation.
    pub fn list_members(&self, conversation: &Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM user_conversation
             WHERE conversation_id = ?1
             ORDER BY user_id ASC",
        )?;

        let rows = stmt.query_map(params![conversation.to_string()], |row| column_id(row, 0))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Every `(user, conversation)` membership pair.
    pub fn list_memberships(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, conversation_id FROM user_conversation
             ORDER BY conversation_id ASC, user_id ASC",
        )?;

        let rows = stmt.query_map([], |row| Ok((column_id(row, 0)?, column_id(row, 1)?)))?;

        let mut memberships = Vec::new();
        for row in rows {
            memberships.push(row?);
        }
        Ok(memberships)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: column_id(row, 0)?,
        title: row.get(1)?,
        owner: column_id(row, 2)?,
        creation: column_time(row, 3)?,
    })
}
