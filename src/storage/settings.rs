use rusqlite::{OptionalExtension, params};

use crate::error::AppError;

use super::models::Setting;
use super::{Database, now_iso8601, storage_err};

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            "SELECT value FROM system_settings WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()
        .map_err(storage_err("get setting"))
    }

    /// Insert or overwrite. A `None` description keeps the existing one.
    pub fn set_setting(&self, key: &str, value: &str, description: Option<&str>) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO system_settings (key, value, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = coalesce(excluded.description, system_settings.description),
                updated_at = excluded.updated_at",
            params![key, value, description, now_iso8601()],
        )
        .map_err(storage_err("set setting"))?;
        Ok(())
    }

    pub fn get_all_settings(&self) -> Result<Vec<Setting>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value, description, updated_at FROM system_settings ORDER BY key")
            .map_err(storage_err("prepare get_all_settings"))?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Setting {
                    key: r.get(0)?,
                    value: r.get(1)?,
                    description: r.get(2)?,
                    updated_at: r.get(3)?,
                })
            })
            .map_err(storage_err("query get_all_settings"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map setting row"))
    }
}
