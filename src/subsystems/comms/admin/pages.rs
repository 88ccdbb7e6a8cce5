//! Server-rendered HTML pages of the admin panel.
//!
//! No templates or static assets; every page is a single string with inline
//! CSS. All dynamic values pass through [`escape`].

use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
};

use super::AdminState;
use super::api::ApiError;
use crate::analytics::summary;
use crate::storage::display_timestamp;

const STYLE: &str = "body{font-family:sans-serif;margin:2rem;background:#f5f6f8;color:#222}\
nav a{margin-right:1rem}\
.boxes{display:flex;gap:1rem;flex-wrap:wrap;margin:1rem 0}\
.box{background:#fff;border-radius:8px;padding:1rem 1.5rem;min-width:10rem;box-shadow:0 1px 3px #0002}\
.box b{display:block;font-size:1.6rem}\
table{border-collapse:collapse;background:#fff;margin:1rem 0}\
td,th{border:1px solid #ddd;padding:.4rem .8rem;text-align:left}";

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, bot_name: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html lang=\"ru\"><head><meta charset=\"utf-8\">\
         <title>{title} · {bot}</title><style>{STYLE}</style></head><body>\
         <h1>{title}</h1>\
         <nav><a href=\"/\">Главная</a><a href=\"/stats\">Статистика</a>\
         <a href=\"/analytics\">Аналитика</a><a href=\"/api/health\">Health</a></nav>\
         {body}</body></html>",
        title = escape(title),
        bot = escape(bot_name),
    ))
}

fn stat_box(label: &str, value: impl std::fmt::Display) -> String {
    format!("<div class=\"box\"><b>{}</b>{}</div>", escape(&value.to_string()), escape(label))
}

fn count_table(head: (&str, &str), rows: &[(String, i64)]) -> String {
    if rows.is_empty() {
        return "<p>Нет данных</p>".into();
    }
    let mut out = format!("<table><tr><th>{}</th><th>{}</th></tr>", escape(head.0), escape(head.1));
    for (name, count) in rows {
        out.push_str(&format!("<tr><td>{}</td><td>{count}</td></tr>", escape(name)));
    }
    out.push_str("</table>");
    out
}

// ── Pages ─────────────────────────────────────────────────────────────────────

/// GET /
pub(super) async fn root(State(state): State<AdminState>) -> Response {
    let config = state.comms.config();
    let health = state.comms.health().summary().await;
    let mut body = format!("<p>Состояние: <b>{}</b></p><table><tr><th>Компонент</th><th>OK</th><th>Сообщение</th></tr>", escape(health.status));
    for c in &health.components {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&c.id),
            if c.healthy { "✅" } else { "❌" },
            escape(&c.message),
        ));
    }
    body.push_str("</table><p>API: <code>/api/stats</code>, <code>/api/users</code>, \
                   <code>/api/queries</code>, <code>/api/analytics/detailed</code>, \
                   <code>/api/export/queries</code>, <code>/api/settings</code>, \
                   <code>/api/documents</code></p>");
    layout("Панель администратора", &config.bot_name, &body).into_response()
}

/// GET /stats
pub(super) async fn stats(State(state): State<AdminState>) -> Result<Response, ApiError> {
    let (users, stats, categories) = state
        .comms
        .consultant()
        .db()
        .call("page stats", |db| {
            Ok((db.count_users()?, db.get_queries_stats()?, db.get_popular_categories(10)?))
        })
        .await?;

    let body = format!(
        "<div class=\"boxes\">{}{}{}</div><h2>Популярные категории</h2>{}",
        stat_box("пользователей", users),
        stat_box("запросов", stats.total_queries),
        stat_box("среднее время ответа, с", format!("{:.2}", stats.avg_response_time)),
        count_table(("Категория", "Запросов"), &categories),
    );
    Ok(layout("Статистика", &state.comms.config().bot_name, &body).into_response())
}

/// GET /analytics
pub(super) async fn analytics(State(state): State<AdminState>) -> Result<Response, ApiError> {
    let (records, top) = state
        .comms
        .consultant()
        .db()
        .call("page analytics", |db| Ok((db.recent_queries(1000)?, db.top_users(10)?)))
        .await?;
    let s = summary(&records);

    let providers: Vec<(String, i64)> = s.ai_providers.iter().map(|(k, v)| (k.clone(), *v as i64)).collect();
    let categories: Vec<(String, i64)> = s.categories.iter().map(|(k, v)| (k.clone(), *v as i64)).collect();

    let mut users = String::from("<table><tr><th>ID</th><th>Username</th><th>Запросов</th><th>Последний запрос</th></tr>");
    for u in &top {
        users.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            u.id,
            escape(u.username.as_deref().unwrap_or("—")),
            u.total_requests,
            escape(&u.last_request_at.as_deref().map(|t| display_timestamp(t, true)).unwrap_or_default()),
        ));
    }
    users.push_str("</table>");

    let body = format!(
        "<p>По последним {} запросам.</p><div class=\"boxes\">{}{}{}</div>\
         <h2>AI провайдеры</h2>{}<h2>Категории</h2>{}<h2>Активные пользователи</h2>{}",
        records.len(),
        stat_box("запросов", s.total_queries),
        stat_box("среднее время ответа, с", format!("{:.2}", s.avg_response_time)),
        stat_box("токенов", s.total_tokens),
        count_table(("Провайдер", "Запросов"), &providers),
        count_table(("Категория", "Запросов"), &categories),
        users,
    );
    Ok(layout("Аналитика", &state.comms.config().bot_name, &body).into_response())
}
