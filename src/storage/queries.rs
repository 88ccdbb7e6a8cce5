use rusqlite::{Row, params};

use crate::error::AppError;

use super::models::{NewQuery, QueryRecord, QueryStats};
use super::{Database, now_iso8601, round2, storage_err};

const QUERY_COLUMNS: &str = "id, user_id, question, answer, ai_provider, ai_model, response_time, \
     tokens_used, category, documents_used, created_at";

fn count_row(row: &Row<'_>) -> rusqlite::Result<(String, i64)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn query_from_row(row: &Row<'_>) -> rusqlite::Result<QueryRecord> {
    let documents_used: Option<String> = row.get(9)?;
    Ok(QueryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        ai_provider: row.get(4)?,
        ai_model: row.get(5)?,
        response_time: row.get(6)?,
        tokens_used: row.get(7)?,
        category: row.get(8)?,
        documents_used: documents_used.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(10)?,
    })
}

impl Database {
    pub fn create_query(&self, query: &NewQuery) -> Result<i64, AppError> {
        let documents_used = query
            .documents_used
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Storage(format!("storage: serialize documents_used: {e}")))?;

        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO queries (user_id, question, answer, ai_provider, ai_model, response_time,
                                  tokens_used, category, documents_used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                query.user_id,
                query.question,
                query.answer,
                query.ai_provider,
                query.ai_model,
                query.response_time,
                query.tokens_used,
                query.category,
                documents_used,
                now_iso8601()
            ],
        )
        .map_err(storage_err("insert query"))?;
        Ok(conn.last_insert_rowid())
    }

    /// A user's queries, newest first.
    pub fn get_user_queries(&self, user_id: i64, limit: usize) -> Result<Vec<QueryRecord>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {QUERY_COLUMNS} FROM queries WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
            ))
            .map_err(storage_err("prepare get_user_queries"))?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], query_from_row)
            .map_err(storage_err("query get_user_queries"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map query row"))
    }

    /// Queries across all users, newest first.
    pub fn recent_queries(&self, limit: usize) -> Result<Vec<QueryRecord>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {QUERY_COLUMNS} FROM queries ORDER BY id DESC LIMIT ?1"))
            .map_err(storage_err("prepare recent_queries"))?;
        let rows = stmt
            .query_map(params![limit as i64], query_from_row)
            .map_err(storage_err("query recent_queries"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map query row"))
    }

    /// Non-null categories with their counts, most frequent first.
    pub fn get_popular_categories(&self, limit: usize) -> Result<Vec<(String, i64)>, AppError> {
        self.grouped_counts(
            "SELECT category, COUNT(*) AS n FROM queries WHERE category IS NOT NULL
             GROUP BY category ORDER BY n DESC, category ASC LIMIT ?1",
            Some(limit),
            "popular categories",
        )
    }

    /// Query counts per AI provider, most used first.
    pub fn provider_breakdown(&self) -> Result<Vec<(String, i64)>, AppError> {
        self.grouped_counts(
            "SELECT ai_provider, COUNT(*) AS n FROM queries
             GROUP BY ai_provider ORDER BY n DESC, ai_provider ASC",
            None,
            "provider breakdown",
        )
    }

    pub fn get_queries_stats(&self) -> Result<QueryStats, AppError> {
        let conn = self.open_conn()?;
        let (total, avg): (i64, Option<f64>) = conn
            .query_row("SELECT COUNT(*), AVG(response_time) FROM queries", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .map_err(storage_err("queries stats"))?;
        Ok(QueryStats {
            total_queries: total,
            avg_response_time: round2(avg.unwrap_or(0.0)),
        })
    }

    pub fn total_tokens(&self) -> Result<i64, AppError> {
        let conn = self.open_conn()?;
        conn.query_row("SELECT COALESCE(SUM(tokens_used), 0) FROM queries", [], |r| r.get(0))
            .map_err(storage_err("total tokens"))
    }

    /// Number of queries created at or after `since` (RFC 3339).
    pub fn queries_since(&self, since: &str) -> Result<i64, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM queries WHERE created_at >= ?1",
            params![since],
            |r| r.get(0),
        )
        .map_err(storage_err("queries since"))
    }

    /// `(key, count)` rows; `limit` binds `?1` when the statement has one.
    fn grouped_counts(
        &self,
        sql: &str,
        limit: Option<usize>,
        op: &'static str,
    ) -> Result<Vec<(String, i64)>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(sql).map_err(storage_err(op))?;
        let rows = match limit {
            Some(limit) => {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                stmt.query_map(params![limit], count_row)
                    .map_err(storage_err(op))?
                    .collect::<Result<Vec<_>, _>>()
            }
            None => stmt
                .query_map([], count_row)
                .map_err(storage_err(op))?
                .collect::<Result<Vec<_>, _>>(),
        };
        rows.map_err(storage_err(op))
    }
}
