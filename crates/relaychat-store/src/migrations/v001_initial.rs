//! v001 -- Initial schema creation.
//!
//! Creates the three entity tables: `users`, `conversations` and `messages`.
//! Identifiers are stored in their dotted text form.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- dotted identifier
    name       TEXT NOT NULL,
    password   TEXT NOT NULL,
    created_at TEXT NOT NULL                  -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_users_name ON users(name COLLATE NOCASE);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,
    title      TEXT NOT NULL,
    owner_id   TEXT NOT NULL,                 -- FK -> users(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(created_at);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL,            -- FK -> conversations(id)
    author_id       TEXT NOT NULL,            -- FK -> users(id)
    content         TEXT NOT NULL,
    previous_id     TEXT,                     -- message this one followed
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id),
    FOREIGN KEY (author_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
