//! Persistence layer: users, conversation messages, queries, documents,
//! system settings and the audit log in a single SQLite file.
//!
//! All methods are synchronous. Async callers go through [`Database::call`],
//! which runs the closure on the blocking pool. Every operation opens its
//! own connection (WAL, foreign keys on, 5 s busy timeout), so a `Database`
//! is just a path and clones freely across tasks.

mod audit;
mod documents;
mod messages;
pub mod models;
mod queries;
mod settings;
mod users;

pub use models::*;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

/// Well-known `system_settings` keys.
pub mod keys {
    pub const AI_PROVIDER: &str = "ai_provider";
    pub const ASSISTANT_ID: &str = "openai_assistant_id";
}

#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and apply the schema.
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("storage: create dir {}: {e}", parent.display()))
            })?;
        }
        let db = Self { db_path: db_path.to_path_buf() };
        db.init_db()?;
        debug!(path = %db_path.display(), "database ready");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run blocking store work off the async runtime.
    pub async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, AppError> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| AppError::Storage(format!("{op} join: {e}")))?
    }

    /// Cheap reachability check for the health registry.
    pub fn ping(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(storage_err("ping"))
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(storage_err("read schema version"))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY,
                    username TEXT,
                    first_name TEXT,
                    last_name TEXT,
                    role TEXT NOT NULL DEFAULT 'trial' CHECK (role IN
                        ('admin', 'specialist_ot_dou', 'specialist_ot_other', 'employee', 'trial')),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    is_blocked INTEGER NOT NULL DEFAULT 0,
                    assistant_thread_id TEXT,
                    gdpr_accepted INTEGER NOT NULL DEFAULT 0,
                    gdpr_accepted_at TEXT,
                    total_requests INTEGER NOT NULL DEFAULT 0,
                    last_request_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, id);

                CREATE TABLE IF NOT EXISTS queries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    question TEXT NOT NULL,
                    answer TEXT NOT NULL,
                    ai_provider TEXT NOT NULL,
                    ai_model TEXT,
                    response_time REAL,
                    tokens_used INTEGER,
                    category TEXT,
                    documents_used TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_queries_user ON queries(user_id, id);
                CREATE INDEX IF NOT EXISTS idx_queries_created ON queries(created_at);

                CREATE TABLE IF NOT EXISTS documents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    doc_type TEXT NOT NULL,
                    url TEXT,
                    file_path TEXT,
                    openai_file_id TEXT,
                    content TEXT,
                    tags TEXT NOT NULL DEFAULT '[]',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS system_settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    description TEXT,
                    updated_at TEXT NOT NULL
                );

                -- No FK: the trail must outlive the user row.
                CREATE TABLE IF NOT EXISTS audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER,
                    action TEXT NOT NULL,
                    details TEXT NOT NULL DEFAULT '{}',
                    ip_address TEXT,
                    user_agent TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id, id);

                PRAGMA user_version = 1;
                ",
            )
            .map_err(storage_err("initialize schema"))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Storage(format!(
                "storage: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path).map_err(|e| {
            AppError::Storage(format!("storage: open {}: {e}", self.db_path.display()))
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err("set journal_mode WAL"))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err("set foreign_keys ON"))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(storage_err("set busy_timeout"))?;

        Ok(conn)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Error mapper carrying the failing operation's name.
fn storage_err(op: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::Storage(format!("storage: {op}: {e}"))
}

/// RFC 3339 UTC with second precision. Sorts lexically.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a stored timestamp for people, e.g. `17.10.2025 14:05`.
pub fn display_timestamp(ts: &str, with_time: bool) -> String {
    let fmt = if with_time { "%d.%m.%Y %H:%M" } else { "%d.%m.%Y" };
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format(fmt).to_string())
        .unwrap_or_else(|_| ts.to_string())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_schema_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/bot.db");
        let db = Database::open(&path).unwrap();
        db.ping().unwrap();
        drop(db);
        let db = Database::open(&path).unwrap();
        db.ping().unwrap();
    }

    #[test]
    fn unsupported_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bot.db");
        let conn = Connection::open(&path).unwrap();
        conn.pragma_update(None, "user_version", 7).unwrap();
        drop(conn);
        let err = Database::open(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version 7"));
    }

    #[test]
    fn display_timestamp_formats() {
        assert_eq!(display_timestamp("2025-10-17T14:05:09Z", true), "17.10.2025 14:05");
        assert_eq!(display_timestamp("2025-10-17T14:05:09Z", false), "17.10.2025");
        assert_eq!(display_timestamp("garbage", false), "garbage");
    }

    #[test]
    fn round2_rounds() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(0.0), 0.0);
    }

    #[tokio::test]
    async fn call_runs_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("bot.db")).unwrap();
        let n = db.call("ping", |db| db.ping().map(|_| 1)).await.unwrap();
        assert_eq!(n, 1);
    }
}
