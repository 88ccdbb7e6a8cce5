//! Axum handlers for `/api/*` routes.
//!
//! Each handler receives [`AdminState`] via [`axum::extract::State`], runs
//! its storage work on the blocking pool and answers with JSON.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::AdminState;
use crate::analytics::{anonymize_queries, anonymize_user, create_report, truncate_with_ellipsis};
use crate::error::AppError;
use crate::llm::ProviderKind;
use crate::storage::{NewDocument, QueryRecord, User, keys};

const ANALYTICS_WINDOW: usize = 1000;
const EXPORT_LIMIT: usize = 5000;

// ── Errors ────────────────────────────────────────────────────────────────────

pub(super) struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        warn!(error = %e, "admin api request failed");
        Self(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = if self.0.is_client_error() { "bad_request" } else { "internal" };
        (self.0, Json(json!({ "error": code, "message": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Request & response types ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct UsersParams {
    #[serde(default)]
    anonymize: bool,
}

#[derive(Deserialize)]
pub(super) struct QueriesParams {
    limit: Option<usize>,
    user_id: Option<i64>,
}

#[derive(Deserialize)]
pub(super) struct ExportParams {
    format: Option<String>,
    anonymize: Option<bool>,
}

#[derive(Deserialize)]
pub(super) struct SettingParams {
    value: String,
}

#[derive(Serialize)]
struct UserRow {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
    role: String,
    is_active: bool,
    total_requests: i64,
    created_at: String,
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            role: u.role.to_string(),
            is_active: u.is_active,
            total_requests: u.total_requests,
            created_at: u.created_at.clone(),
        }
    }
}

/// One exported query; also the CSV row layout.
#[derive(Serialize)]
struct QueryRow {
    id: i64,
    user_id: i64,
    question: String,
    answer: String,
    ai_provider: String,
    ai_model: Option<String>,
    response_time: Option<f64>,
    tokens_used: Option<i64>,
    category: Option<String>,
    created_at: String,
}

impl QueryRow {
    fn full(q: &QueryRecord) -> Self {
        Self {
            id: q.id,
            user_id: q.user_id,
            question: q.question.clone(),
            answer: q.answer.clone(),
            ai_provider: q.ai_provider.clone(),
            ai_model: q.ai_model.clone(),
            response_time: q.response_time,
            tokens_used: q.tokens_used,
            category: q.category.clone(),
            created_at: q.created_at.clone(),
        }
    }

    fn preview(q: &QueryRecord) -> Self {
        Self {
            question: truncate_with_ellipsis(&q.question, 100),
            answer: truncate_with_ellipsis(&q.answer, 200),
            ..Self::full(q)
        }
    }
}

fn counts(pairs: Vec<(String, i64)>) -> Vec<Value> {
    pairs
        .into_iter()
        .map(|(category, count)| json!({ "category": category, "count": count }))
        .collect()
}

// ── Health & statistics ───────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<AdminState>) -> Response {
    Json(state.comms.health().summary().await).into_response()
}

/// GET /api/stats
pub(super) async fn stats(State(state): State<AdminState>) -> ApiResult<Json<Value>> {
    let db = state.comms.consultant().db();
    let (users, stats, categories) = db
        .call("api stats", |db| {
            Ok((db.count_users()?, db.get_queries_stats()?, db.get_popular_categories(10)?))
        })
        .await?;
    Ok(Json(json!({
        "total_users": users,
        "total_queries": stats.total_queries,
        "avg_response_time": stats.avg_response_time,
        "popular_categories": counts(categories),
    })))
}

/// GET /api/users?anonymize=
pub(super) async fn users(
    State(state): State<AdminState>,
    Query(params): Query<UsersParams>,
) -> ApiResult<Json<Vec<Value>>> {
    let users = state
        .comms
        .consultant()
        .db()
        .call("api users", |db| db.get_all_users(None))
        .await?;
    let rows = users
        .iter()
        .map(|u| {
            let row = if params.anonymize { UserRow::from(&anonymize_user(u)) } else { UserRow::from(u) };
            serde_json::to_value(row).unwrap_or(Value::Null)
        })
        .collect();
    Ok(Json(rows))
}

/// GET /api/queries?limit=50&user_id=
pub(super) async fn queries(
    State(state): State<AdminState>,
    Query(params): Query<QueriesParams>,
) -> ApiResult<Json<Vec<Value>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 1000);
    let user_id = params.user_id;
    let records = state
        .comms
        .consultant()
        .db()
        .call("api queries", move |db| match user_id {
            Some(uid) => db.get_user_queries(uid, limit),
            None => db.recent_queries(limit),
        })
        .await?;
    let rows = records
        .iter()
        .map(|q| serde_json::to_value(QueryRow::preview(q)).unwrap_or(Value::Null))
        .collect();
    Ok(Json(rows))
}

/// GET /api/analytics/detailed
pub(super) async fn detailed_analytics(State(state): State<AdminState>) -> ApiResult<Json<Value>> {
    let week_ago = (Utc::now() - ChronoDuration::days(7)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let (stats, week, tokens, providers, top, categories) = state
        .comms
        .consultant()
        .db()
        .call("api detailed analytics", move |db| {
            Ok((
                db.get_queries_stats()?,
                db.queries_since(&week_ago)?,
                db.total_tokens()?,
                db.provider_breakdown()?,
                db.top_users(10)?,
                db.get_popular_categories(10)?,
            ))
        })
        .await?;

    let ai_providers: BTreeMap<String, i64> = providers.into_iter().collect();
    let top_users: Vec<Value> = top
        .iter()
        .map(|u| json!({ "id": u.id, "username": u.username, "requests": u.total_requests }))
        .collect();

    Ok(Json(json!({
        "total_queries": stats.total_queries,
        "week_queries": week,
        "avg_response_time": stats.avg_response_time,
        "total_tokens": tokens,
        "ai_providers": ai_providers,
        "top_users": top_users,
        "categories": counts(categories),
    })))
}

/// GET /api/analytics/anonymized
pub(super) async fn anonymized_analytics(State(state): State<AdminState>) -> ApiResult<Response> {
    let records = state
        .comms
        .consultant()
        .db()
        .call("api anonymized analytics", |db| db.recent_queries(ANALYTICS_WINDOW))
        .await?;
    Ok(Json(create_report(&records, true)).into_response())
}

/// GET /api/export/queries?format=json|csv&anonymize=true
pub(super) async fn export_queries(
    State(state): State<AdminState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Json<Value>> {
    let anonymize = params.anonymize.unwrap_or(true);
    let format = params.format.as_deref().unwrap_or("json").to_ascii_lowercase();
    if format != "json" && format != "csv" {
        return Err(ApiError::bad_request(format!("unsupported format: {format}")));
    }

    let mut records = state
        .comms
        .consultant()
        .db()
        .call("api export", |db| db.recent_queries(EXPORT_LIMIT))
        .await?;
    if anonymize {
        records = anonymize_queries(&records);
    }
    let rows: Vec<QueryRow> = records.iter().map(QueryRow::full).collect();
    info!(count = rows.len(), %format, anonymize, "queries exported");

    let data = if format == "csv" {
        Value::String(to_csv(&rows).map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e))?)
    } else {
        serde_json::to_value(&rows).unwrap_or(Value::Null)
    };
    Ok(Json(json!({
        "format": format,
        "data": data,
        "anonymized": anonymize,
        "count": rows.len(),
    })))
}

fn to_csv(rows: &[QueryRow]) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).map_err(|e| format!("csv encode: {e}"))?;
    }
    let bytes = writer.into_inner().map_err(|e| format!("csv flush: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("csv utf-8: {e}"))
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// GET /api/settings
pub(super) async fn settings(State(state): State<AdminState>) -> ApiResult<Response> {
    let settings = state
        .comms
        .consultant()
        .db()
        .call("api settings", |db| db.get_all_settings())
        .await?;
    Ok(Json(settings).into_response())
}

/// POST /api/settings/{key}?value=
pub(super) async fn update_setting(
    State(state): State<AdminState>,
    Path(key): Path<String>,
    Query(params): Query<SettingParams>,
) -> ApiResult<Json<Value>> {
    let value = params.value.trim().to_string();
    if key == keys::AI_PROVIDER {
        let kind: ProviderKind = value
            .parse()
            .map_err(|e: crate::llm::ProviderError| ApiError::bad_request(e.to_string()))?;
        if state.comms.consultant().router().get(kind).is_none() {
            return Err(ApiError::bad_request(format!("provider {kind} is not configured")));
        }
    }

    let (k, v) = (key.clone(), value.clone());
    state
        .comms
        .consultant()
        .db()
        .call("api set setting", move |db| db.set_setting(&k, &v, None))
        .await?;
    info!(%key, %value, "setting updated from admin panel");
    Ok(Json(json!({ "status": "success", "key": key, "value": value })))
}

// ── Documents ─────────────────────────────────────────────────────────────────

/// GET /api/documents
pub(super) async fn documents(State(state): State<AdminState>) -> ApiResult<Response> {
    let docs = state
        .comms
        .consultant()
        .db()
        .call("api documents", |db| db.get_all_documents(false, None))
        .await?;
    Ok(Json(docs).into_response())
}

/// POST /api/documents
pub(super) async fn create_document(
    State(state): State<AdminState>,
    Json(doc): Json<NewDocument>,
) -> ApiResult<Response> {
    if doc.title.trim().is_empty() || doc.doc_type.trim().is_empty() {
        return Err(ApiError::bad_request("title and doc_type are required"));
    }
    let created = state
        .comms
        .consultant()
        .db()
        .call("api create document", move |db| db.create_document(&doc))
        .await?;
    info!(id = created.id, "document created from admin panel");
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// DELETE /api/documents/{id}
pub(super) async fn delete_document(State(state): State<AdminState>, Path(id): Path<i64>) -> ApiResult<Response> {
    let removed = state
        .comms
        .consultant()
        .db()
        .call("api delete document", move |db| db.delete_document(id))
        .await?;
    if !removed {
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "not_found", "id": id }))).into_response());
    }
    info!(id, "document deleted from admin panel");
    Ok(Json(json!({ "status": "deleted", "id": id })).into_response())
}
