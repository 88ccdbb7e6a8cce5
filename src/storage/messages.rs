use rusqlite::params;

use crate::error::AppError;

use super::models::{MessageRole, StoredMessage};
use super::{Database, now_iso8601, storage_err};

impl Database {
    pub fn create_message(
        &self,
        user_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<i64, AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO messages (user_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, role.as_str(), content, now_iso8601()],
        )
        .map_err(storage_err("insert message"))?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent `limit` messages, returned oldest first.
    pub fn get_user_messages(&self, user_id: i64, limit: usize) -> Result<Vec<StoredMessage>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, role, content, created_at FROM messages
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(storage_err("prepare get_user_messages"))?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                let role: String = row.get(2)?;
                Ok(StoredMessage {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: MessageRole::parse(&role),
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(storage_err("query get_user_messages"))?;
        let mut out = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map message row"))?;
        out.reverse();
        Ok(out)
    }

    pub fn clear_user_messages(&self, user_id: i64) -> Result<usize, AppError> {
        let conn = self.open_conn()?;
        conn.execute("DELETE FROM messages WHERE user_id = ?1", params![user_id])
            .map_err(storage_err("clear messages"))
    }
}
