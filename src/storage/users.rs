use rusqlite::{OptionalExtension, Row, params};
use tracing::{info, warn};

use crate::error::AppError;

use super::models::{NewUser, User, UserRole};
use super::{Database, now_iso8601, storage_err};

const USER_COLUMNS: &str = "id, username, first_name, last_name, role, is_active, is_blocked, \
     assistant_thread_id, gdpr_accepted, gdpr_accepted_at, total_requests, last_request_at, \
     created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        // The CHECK constraint keeps unknown values out.
        role: role.parse().unwrap_or_default(),
        is_active: row.get(5)?,
        is_blocked: row.get(6)?,
        assistant_thread_id: row.get(7)?,
        gdpr_accepted: row.get(8)?,
        gdpr_accepted_at: row.get(9)?,
        total_requests: row.get(10)?,
        last_request_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl Database {
    pub fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(storage_err("get user"))
    }

    pub fn create_user(&self, new_user: &NewUser, role: UserRole) -> Result<User, AppError> {
        let conn = self.open_conn()?;
        let now = now_iso8601();
        conn.execute(
            "INSERT INTO users (id, username, first_name, last_name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                new_user.id,
                new_user.username,
                new_user.first_name,
                new_user.last_name,
                role.as_str(),
                now
            ],
        )
        .map_err(storage_err("insert user"))?;

        info!(user_id = new_user.id, role = %role, "user created");
        self.get_user(new_user.id)?
            .ok_or_else(|| AppError::Storage(format!("storage: user {} vanished after insert", new_user.id)))
    }

    /// Update the profile fields that the chat platform may change over time.
    pub fn refresh_profile(&self, new_user: &NewUser) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "UPDATE users SET username = ?2, first_name = ?3, last_name = ?4, updated_at = ?5
             WHERE id = ?1 AND (username IS NOT ?2 OR first_name IS NOT ?3 OR last_name IS NOT ?4)",
            params![
                new_user.id,
                new_user.username,
                new_user.first_name,
                new_user.last_name,
                now_iso8601()
            ],
        )
        .map_err(storage_err("refresh profile"))?;
        Ok(())
    }

    pub fn update_user_role(&self, id: i64, role: UserRole) -> Result<bool, AppError> {
        let conn = self.open_conn()?;
        let n = conn
            .execute(
                "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, role.as_str(), now_iso8601()],
            )
            .map_err(storage_err("update role"))?;
        if n > 0 {
            info!(user_id = id, role = %role, "user role updated");
        }
        Ok(n > 0)
    }

    pub fn accept_gdpr(&self, id: i64) -> Result<bool, AppError> {
        let conn = self.open_conn()?;
        let now = now_iso8601();
        let n = conn
            .execute(
                "UPDATE users SET gdpr_accepted = 1, gdpr_accepted_at = ?2, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )
            .map_err(storage_err("accept gdpr"))?;
        Ok(n > 0)
    }

    pub fn increment_user_requests(&self, id: i64) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let now = now_iso8601();
        conn.execute(
            "UPDATE users SET total_requests = total_requests + 1, last_request_at = ?2,
             updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )
        .map_err(storage_err("increment requests"))?;
        Ok(())
    }

    pub fn set_user_thread_id(&self, id: i64, thread_id: Option<&str>) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "UPDATE users SET assistant_thread_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, thread_id, now_iso8601()],
        )
        .map_err(storage_err("set thread id"))?;
        Ok(())
    }

    pub fn block_user(&self, id: i64, blocked: bool) -> Result<bool, AppError> {
        let conn = self.open_conn()?;
        let n = conn
            .execute(
                "UPDATE users SET is_blocked = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, blocked, now_iso8601()],
            )
            .map_err(storage_err("block user"))?;
        Ok(n > 0)
    }

    /// Delete the user row. Messages and queries go with it via cascade;
    /// the audit log stays.
    pub fn delete_user_data(&self, id: i64) -> Result<bool, AppError> {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction().map_err(storage_err("begin delete tx"))?;
        let messages = tx
            .query_row("SELECT COUNT(*) FROM messages WHERE user_id = ?1", params![id], |r| {
                r.get::<_, i64>(0)
            })
            .map_err(storage_err("count messages"))?;
        let queries = tx
            .query_row("SELECT COUNT(*) FROM queries WHERE user_id = ?1", params![id], |r| {
                r.get::<_, i64>(0)
            })
            .map_err(storage_err("count queries"))?;
        let n = tx
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(storage_err("delete user"))?;
        tx.commit().map_err(storage_err("commit delete tx"))?;

        if n == 0 {
            warn!(user_id = id, "delete requested for unknown user");
            return Ok(false);
        }
        info!(user_id = id, messages, queries, "user data deleted");
        Ok(true)
    }

    /// All users, newest first, optionally restricted to one role.
    pub fn get_all_users(&self, role: Option<UserRole>) -> Result<Vec<User>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE (?1 IS NULL OR role = ?1)
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(storage_err("prepare get_all_users"))?;
        let rows = stmt
            .query_map(params![role.map(|r| r.as_str())], user_from_row)
            .map_err(storage_err("query get_all_users"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map user row"))
    }

    /// Most active users by request count.
    pub fn top_users(&self, limit: usize) -> Result<Vec<User>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY total_requests DESC, id ASC LIMIT ?1"
            ))
            .map_err(storage_err("prepare top_users"))?;
        let rows = stmt
            .query_map(params![limit as i64], user_from_row)
            .map_err(storage_err("query top_users"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map user row"))
    }

    pub fn count_users(&self) -> Result<i64, AppError> {
        let conn = self.open_conn()?;
        conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .map_err(storage_err("count users"))
    }
}
