use rusqlite::{OptionalExtension, Row, params};

use crate::error::AppError;

use super::models::{Document, DocumentPatch, NewDocument};
use super::{Database, now_iso8601, storage_err};

const DOCUMENT_COLUMNS: &str = "id, title, description, doc_type, url, file_path, openai_file_id, \
     content, tags, is_active, created_at, updated_at";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let tags: String = row.get(8)?;
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        doc_type: row.get(3)?,
        url: row.get(4)?,
        file_path: row.get(5)?,
        openai_file_id: row.get(6)?,
        content: row.get(7)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        is_active: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn tags_json(tags: &[String]) -> Result<String, AppError> {
    serde_json::to_string(tags).map_err(|e| AppError::Storage(format!("storage: serialize tags: {e}")))
}

impl Database {
    pub fn create_document(&self, doc: &NewDocument) -> Result<Document, AppError> {
        let tags = tags_json(&doc.tags)?;
        let conn = self.open_conn()?;
        let now = now_iso8601();
        conn.execute(
            "INSERT INTO documents (title, description, doc_type, url, file_path, openai_file_id,
                                    content, tags, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
            params![
                doc.title,
                doc.description,
                doc.doc_type,
                doc.url,
                doc.file_path,
                doc.openai_file_id,
                doc.content,
                tags,
                now
            ],
        )
        .map_err(storage_err("insert document"))?;
        let id = conn.last_insert_rowid();
        self.get_document(id)?
            .ok_or_else(|| AppError::Storage(format!("storage: document {id} vanished after insert")))
    }

    pub fn get_document(&self, id: i64) -> Result<Option<Document>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            document_from_row,
        )
        .optional()
        .map_err(storage_err("get document"))
    }

    /// Case-insensitive substring match on the content of active documents.
    ///
    /// SQLite's `lower()` only folds ASCII, so matching happens here to
    /// cover Cyrillic text.
    pub fn search_documents(
        &self,
        query: &str,
        doc_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, AppError> {
        let needle = query.to_lowercase();
        let mut found: Vec<Document> = self
            .get_all_documents(true, doc_type)?
            .into_iter()
            .filter(|d| {
                d.content
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&needle))
            })
            .collect();
        found.truncate(limit);
        Ok(found)
    }

    pub fn get_all_documents(
        &self,
        active_only: bool,
        doc_type: Option<&str>,
    ) -> Result<Vec<Document>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE (?1 = 0 OR is_active = 1) AND (?2 IS NULL OR doc_type = ?2)
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(storage_err("prepare get_all_documents"))?;
        let rows = stmt
            .query_map(params![active_only, doc_type], document_from_row)
            .map_err(storage_err("query get_all_documents"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("map document row"))
    }

    pub fn update_document(&self, id: i64, patch: &DocumentPatch) -> Result<Option<Document>, AppError> {
        let tags = patch.tags.as_deref().map(tags_json).transpose()?;
        let conn = self.open_conn()?;
        let n = conn
            .execute(
                "UPDATE documents SET
                    title = coalesce(?2, title),
                    description = coalesce(?3, description),
                    doc_type = coalesce(?4, doc_type),
                    url = coalesce(?5, url),
                    content = coalesce(?6, content),
                    tags = coalesce(?7, tags),
                    is_active = coalesce(?8, is_active),
                    updated_at = ?9
                 WHERE id = ?1",
                params![
                    id,
                    patch.title,
                    patch.description,
                    patch.doc_type,
                    patch.url,
                    patch.content,
                    tags,
                    patch.is_active,
                    now_iso8601()
                ],
            )
            .map_err(storage_err("update document"))?;
        if n == 0 {
            return Ok(None);
        }
        self.get_document(id)
    }

    pub fn delete_document(&self, id: i64) -> Result<bool, AppError> {
        let conn = self.open_conn()?;
        let n = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(storage_err("delete document"))?;
        Ok(n > 0)
    }
}
