//! CRUD operations for [`User`] records.

use rusqlite::params;

use relaychat_shared::{User, Uuid};

use crate::database::{column_id, column_time, not_found, Database};
use crate::error::Result;

impl Database {
    /// Insert a new user.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, password, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id.to_string(),
                user.name,
                user.password,
                user.creation.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single user by identifier.
    pub fn get_user(&self, id: &Uuid) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, name, password, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Fetch a user by name, ignoring case.
    pub fn find_user_by_name(&self, name: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, name, password, created_at FROM users
                 WHERE name = ?1 COLLATE NOCASE
                 ORDER BY created_at ASC
                 LIMIT 1",
                params![name],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// List all users, oldest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, password, created_at FROM users ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: column_id(row, 0)?,
        name: row.get(1)?,
        password: row.get(2)?,
        creation: column_time(row, 3)?,
    })
}
