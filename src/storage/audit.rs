use rusqlite::params;
use serde_json::Value;

use crate::error::AppError;

use super::models::AuditEntry;
use super::{Database, now_iso8601, storage_err};

impl Database {
    pub fn create_audit_log(
        &self,
        user_id: Option<i64>,
        action: &str,
        details: &Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<i64, AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO audit_log (user_id, action, details, ip_address, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, action, details.to_string(), ip_address, user_agent, now_iso8601()],
        )
        .map_err(storage_err("insert audit log"))?;
        Ok(conn.last_insert_rowid())
    }

    /// A user's audit trail, newest first. Works after the user is deleted.
    pub fn get_user_audit_logs(&self, user_id: i64, limit: usize) -> Result<Vec<AuditEntry>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, action, details, ip_address, user_agent, created_at
                 FROM audit_log WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(storage_err("prepare get_user_audit_logs"))?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |r| {
                let details: String = r.get(3)?;
                Ok(AuditEntry {
                    id: r.get(0)?,
                    user_id: r.get(1)?,
                    action: r.get(2)?,
                    details: serde_json::from_str(&details).unwrap_or(Value::Null),
                    ip_address: r.get(4)?,
                    user_agent: r.get(5)?,
                    created_at: r.get(6)?,
                })
            })
            .map_err(storage_err("query get_user_audit_logs"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map audit row"))
    }
}
