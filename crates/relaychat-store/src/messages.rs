use rusqlite::params;

use relaychat_shared::{Message, Uuid};

use crate::database::{column_id, column_opt_id, column_time, not_found, Database};
use crate::error::Result;

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, author_id, content, previous_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.conversation.to_string(),
                message.author.to_string(),
                message.content,
                message.previous.as_ref().map(|p| p.to_string()),
                message.creation.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Messages of a conversation in creation order. The `next` link is
    /// rebuilt from the stored `previous` links.
    pub fn get_messages_for_conversation(&self, conversation: &Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.conversation_id, m.author_id, m.content, m.previous_id, m.created_at,
                    (SELECT n.id FROM messages n WHERE n.previous_id = m.id LIMIT 1)
             FROM messages m
             WHERE m.conversation_id = ?1
             ORDER BY m.created_at ASC, m.rowid ASC",
        )?;

        let rows = stmt.query_map(params![conversation.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Every message in insertion order, which is the order they were
    /// appended to their chains.
    pub fn list_messages(&self) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.conversation_id, m.author_id, m.content, m.previous_id, m.created_at,
                    (SELECT n.id FROM messages n WHERE n.previous_id = m.id LIMIT 1)
             FROM messages m
             ORDER BY m.rowid ASC",
        )?;

        let rows = stmt.query_map([], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: &Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT m.id, m.conversation_id, m.author_id, m.content, m.previous_id, m.created_at,
                        (SELECT n.id FROM messages n WHERE n.previous_id = m.id LIMIT 1)
                 FROM messages m WHERE m.id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: column_id(row, 0)?,
        conversation: column_id(row, 1)?,
        author: column_id(row, 2)?,
        content: row.get(3)?,
        previous: column_opt_id(row, 4)?,
        creation: column_time(row, 5)?,
        next: column_opt_id(row, 6)?,
    })
}
