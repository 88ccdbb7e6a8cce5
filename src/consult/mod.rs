//! The consultation pipeline shared by every chat front end.
//!
//! [`Consultant`] owns nothing platform specific: it takes a stored [`User`]
//! and the raw text, and returns an [`Outcome`] the channel renders. Rate
//! limiting, anonymization, knowledge-base lookup, provider routing,
//! persistence and auditing all happen here, in that order.

pub mod access;
pub mod session;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::analytics::truncate_with_ellipsis;
use crate::config::Config;
use crate::error::AppError;
use crate::knowledge::{KnowledgeBase, format_answer};
use crate::llm::assistant::{AssistantClient, AssistantInfo};
use crate::llm::prompts;
use crate::llm::router::ProviderRouter;
use crate::llm::{ChatMessage, CompletionOptions, ProviderError, ProviderKind};
use crate::privacy::{anonymize_personal_data, masked_user_id};
use crate::rate_limit::{LimitKind, RateLimiter};
use crate::storage::{Database, MessageRole, NewQuery, StoredMessage, User, keys};

pub use access::{AccessEvent, AccessGate, Admission, Denial};
pub use session::{DialogueSession, FaqContext, LastAnswer, SessionStore};

/// Questions shorter than this (in chars, after trimming) are rejected.
pub const MIN_QUESTION_CHARS: usize = 5;

/// Messages looked at when building the knowledge-base context query.
const CONTEXT_WINDOW: usize = 3;

const ASSISTANT_CATEGORY: &str = "assistant_query";

// ── Modes & outcomes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskMode {
    /// Chat completions through the provider router.
    Chat,
    /// The OpenAI assistant on the user's own thread.
    Assistant,
}

impl AskMode {
    pub fn limit_kind(&self) -> LimitKind {
        match self {
            AskMode::Chat => LimitKind::Question,
            AskMode::Assistant => LimitKind::AssistantQuestion,
        }
    }

    fn is_assistant(&self) -> bool {
        matches!(self, AskMode::Assistant)
    }
}

/// An AI-produced answer and the facts recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub provider: String,
    pub model: String,
    /// Seconds, rounded to two decimals.
    pub response_time: f64,
    pub tokens_used: Option<i64>,
    pub category: Option<String>,
    pub thread_id: Option<String>,
    pub personal_data: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// HTML notice with the spent budget and the wait time.
    RateLimited(String),
    TooShort,
    /// Expansion or rating without a stored knowledge-base hit or answer.
    NoContext,
    FaqMatch { formatted: String, token: u32, personal_data: bool },
    Answered(Answer),
    /// A rating was stored and nothing else happens.
    Recorded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_queries: usize,
    pub avg_response_time: f64,
    /// Up to five `(category, count)` pairs, most frequent first.
    pub categories: Vec<(String, usize)>,
    /// Up to five recent questions, newest first, cut at 50 chars.
    pub recent_questions: Vec<String>,
}

/// Stable six-digit token tying inline buttons to a question.
pub fn question_token(question: &str) -> u32 {
    let digest = Sha256::digest(question.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % 1_000_000
}

/// Knowledge-base query enriched with the tail of the conversation.
pub fn context_query(history: &[StoredMessage], question: &str) -> String {
    let tail = &history[history.len().saturating_sub(2)..];
    let parts: Vec<String> = tail
        .iter()
        .filter_map(|m| match m.role {
            MessageRole::User => Some(format!("Предыдущий вопрос: {}", m.content)),
            MessageRole::Assistant => Some(format!(
                "Предыдущий ответ: {}",
                truncate_with_ellipsis(&m.content, 100)
            )),
            MessageRole::System => None,
        })
        .collect();
    if parts.is_empty() {
        question.to_string()
    } else {
        format!("{} Текущий вопрос: {question}", parts.join(" "))
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

// One AI turn: what is stored as the question, what is sent, how it is audited.
struct Turn<'a> {
    question: &'a str,
    prompt: Option<String>,
    action: &'static str,
    personal_data: bool,
    faq: Option<&'a FaqContext>,
}

// ── Consultant ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Consultant {
    db: Database,
    kb: Arc<KnowledgeBase>,
    router: Arc<ProviderRouter>,
    assistant: Option<AssistantClient>,
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionStore>,
    bot_name: String,
    max_history: usize,
    categorize: bool,
    check_urls: bool,
}

impl Consultant {
    pub fn new(config: &Config, db: Database, kb: Arc<KnowledgeBase>, router: Arc<ProviderRouter>) -> Self {
        Self {
            db,
            kb,
            router,
            assistant: None,
            limiter: Arc::new(RateLimiter::new()),
            sessions: Arc::new(SessionStore::new()),
            bot_name: config.bot_name.clone(),
            max_history: config.ai.max_history_length,
            categorize: config.ai.enable_statistics,
            check_urls: config.knowledge.check_urls,
        }
    }

    pub fn with_assistant(mut self, client: AssistantClient) -> Self {
        self.assistant = Some(client);
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn assistant_enabled(&self) -> bool {
        self.assistant.is_some()
    }

    // ── Questions ────────────────────────────────────────────────────────────

    pub async fn ask(&self, user: &User, text: &str, mode: AskMode) -> Result<Outcome, AppError> {
        let kind = mode.limit_kind();
        if let Err(exceeded) = self.limiter.check(user.id, kind) {
            return Ok(Outcome::RateLimited(exceeded.message()));
        }
        self.limiter.record(user.id, kind);

        let mut question = text.trim();
        if mode.is_assistant() {
            question = question.strip_prefix('?').unwrap_or(question).trim();
        }
        if question.chars().count() < MIN_QUESTION_CHARS {
            return Ok(Outcome::TooShort);
        }

        let (question, personal_data) = anonymize_personal_data(question);
        info!(
            user = %masked_user_id(user.id, user.username.as_deref()),
            ?mode,
            chars = question.chars().count(),
            "question received"
        );

        let uid = user.id;
        let history = self
            .db
            .call("context history", move |db| db.get_user_messages(uid, CONTEXT_WINDOW))
            .await?;
        let query = context_query(&history, &question);
        debug!(%query, "knowledge-base query");

        if let Some(hit) = self.kb.best_match(&query, self.check_urls).await {
            if hit.score >= self.kb.threshold() {
                let token = question_token(&question);
                self.sessions.set_faq(
                    uid,
                    FaqContext {
                        user_question: question.clone(),
                        faq_question: hit.entry.question.clone(),
                        context: prompts::faq_context(&hit.entry),
                        score: hit.score,
                        token,
                        mode,
                    },
                );
                info!(score = hit.score, block = %hit.entry.block, "answered from knowledge base");
                return Ok(Outcome::FaqMatch { formatted: format_answer(&hit), token, personal_data });
            }
        }

        let turn = Turn {
            question: &question,
            prompt: None,
            action: match mode {
                AskMode::Chat => "question_asked",
                AskMode::Assistant => "assistant_question_asked",
            },
            personal_data,
            faq: None,
        };
        self.answer(user, mode, turn).await.map(Outcome::Answered)
    }

    /// Let the AI extend the knowledge-base answer offered last.
    pub async fn expand(&self, user: &User, mode: AskMode) -> Result<Outcome, AppError> {
        if let Err(exceeded) = self.limiter.check(user.id, LimitKind::ExpandAnswer) {
            return Ok(Outcome::RateLimited(exceeded.message()));
        }
        self.limiter.record(user.id, LimitKind::ExpandAnswer);

        let Some(faq) = self.sessions.faq(user.id) else {
            return Ok(Outcome::NoContext);
        };
        let prompt = prompts::faq_expansion_prompt(&faq.context, &faq.user_question);
        let turn = Turn {
            question: &faq.user_question,
            prompt: Some(prompt),
            action: match mode {
                AskMode::Chat => "expand_answer_requested",
                AskMode::Assistant => "assistant_expand_answer",
            },
            personal_data: false,
            faq: Some(&faq),
        };
        self.answer(user, mode, turn).await.map(Outcome::Answered)
    }

    /// Rate the knowledge-base answer. A thumbs-down hands the question to the AI.
    pub async fn rate_faq(&self, user: &User, helpful: bool, mode: AskMode) -> Result<Outcome, AppError> {
        let Some(faq) = self.sessions.faq(user.id) else {
            return Ok(Outcome::NoContext);
        };

        let mut action = String::from(if helpful { "faq_rated_helpful" } else { "faq_rated_unhelpful" });
        if mode.is_assistant() {
            action.push_str("_assistant");
        }
        self.audit(
            user.id,
            &action,
            json!({
                "user_question": faq.user_question,
                "faq_question": faq.faq_question,
                "similarity_score": faq.score,
                "rating": if helpful { "helpful" } else { "unhelpful" },
            }),
        )
        .await;

        if helpful {
            return Ok(Outcome::Recorded);
        }

        let turn = Turn {
            question: &faq.user_question,
            prompt: None,
            action: match mode {
                AskMode::Chat => "ai_after_negative_rating",
                AskMode::Assistant => "assistant_after_negative_rating",
            },
            personal_data: false,
            faq: None,
        };
        self.answer(user, mode, turn).await.map(Outcome::Answered)
    }

    /// Rate the last AI answer. The dialogue session is cleared either way.
    pub async fn rate_answer(&self, user: &User, helpful: bool, mode: AskMode) -> Result<Outcome, AppError> {
        let Some(last) = self.sessions.last_answer(user.id) else {
            return Ok(Outcome::NoContext);
        };
        let verdict = if helpful { "helpful" } else { "unhelpful" };
        let action = match mode {
            AskMode::Chat => format!("ai_rated_{verdict}"),
            AskMode::Assistant => format!("assistant_ai_rated_{verdict}"),
        };
        self.audit(
            user.id,
            &action,
            json!({
                "question": last.question.chars().take(100).collect::<String>(),
                "answer_length": last.answer.chars().count(),
                "rating": verdict,
            }),
        )
        .await;
        self.sessions.clear(user.id);
        Ok(Outcome::Recorded)
    }

    // ── Assistant housekeeping ───────────────────────────────────────────────

    /// Forget the user's assistant thread. Returns `false` when there was none.
    pub async fn reset_thread(&self, user: &User) -> Result<bool, AppError> {
        let Some(thread_id) = user.assistant_thread_id.clone() else {
            return Ok(false);
        };
        if let Some(client) = &self.assistant {
            client.delete_thread(&thread_id).await;
        }
        let uid = user.id;
        self.db
            .call("clear thread id", move |db| db.set_user_thread_id(uid, None))
            .await?;
        self.audit(uid, "assistant_thread_reset", json!({ "thread_id": thread_id }))
            .await;
        info!(user = %masked_user_id(uid, user.username.as_deref()), "assistant thread reset");
        Ok(true)
    }

    pub async fn assistant_info(&self) -> Result<AssistantInfo, AppError> {
        let client = self.assistant_client()?;
        self.ensure_assistant(client).await?;
        Ok(client.info().await?)
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    /// `None` until the user has asked something.
    pub async fn user_stats(&self, user: &User) -> Result<Option<UserStats>, AppError> {
        let uid = user.id;
        let queries = self
            .db
            .call("user queries", move |db| db.get_user_queries(uid, 100))
            .await?;
        if queries.is_empty() {
            return Ok(None);
        }

        let total = queries.len();
        let time_sum: f64 = queries.iter().map(|q| q.response_time.unwrap_or(0.0)).sum();

        let mut categories: Vec<(String, usize)> = Vec::new();
        for cat in queries.iter().filter_map(|q| q.category.as_deref()) {
            match categories.iter_mut().find(|(c, _)| c == cat) {
                Some((_, n)) => *n += 1,
                None => categories.push((cat.to_string(), 1)),
            }
        }
        categories.sort_by(|a, b| b.1.cmp(&a.1));
        categories.truncate(5);

        Ok(Some(UserStats {
            total_queries: total,
            avg_response_time: time_sum / total as f64,
            categories,
            recent_questions: queries
                .iter()
                .take(5)
                .map(|q| truncate_with_ellipsis(&q.question, 50))
                .collect(),
        }))
    }

    // ── Account ──────────────────────────────────────────────────────────────

    pub async fn accept_consent(&self, user: &User) -> Result<(), AppError> {
        let uid = user.id;
        self.db.call("accept gdpr", move |db| db.accept_gdpr(uid)).await?;
        self.audit(uid, "gdpr_accepted", json!({ "timestamp": crate::storage::now_iso8601() }))
            .await;
        info!(user = %masked_user_id(uid, user.username.as_deref()), "personal-data consent accepted");
        Ok(())
    }

    /// Erase the user everywhere: storage, dialogue state and rate-limit history.
    pub async fn forget_user(&self, user: &User) -> Result<bool, AppError> {
        let uid = user.id;
        self.audit(
            uid,
            "data_deletion_requested",
            json!({ "username": user.username, "confirmed": true }),
        )
        .await;
        let removed = self.db.call("delete user data", move |db| db.delete_user_data(uid)).await?;
        self.sessions.clear(uid);
        self.limiter.clear_user(uid);
        info!(user = %masked_user_id(uid, None), removed, "user data deleted");
        Ok(removed)
    }

    /// Persist the provider the router should try first.
    pub async fn set_preferred_provider(&self, admin: &User, kind: ProviderKind) -> Result<(), AppError> {
        if self.router.get(kind).is_none() {
            return Err(ProviderError::MissingCredentials(kind.as_str().to_string()).into());
        }
        self.db
            .call("set ai provider", move |db| {
                db.set_setting(keys::AI_PROVIDER, kind.as_str(), Some("Текущий AI провайдер"))
            })
            .await?;
        self.audit(admin.id, "ai_provider_changed", json!({ "provider": kind.as_str() }))
            .await;
        info!(provider = %kind, "preferred AI provider changed");
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn answer(&self, user: &User, mode: AskMode, turn: Turn<'_>) -> Result<Answer, AppError> {
        let answer = match mode {
            AskMode::Chat => self.answer_with_router(user, &turn).await?,
            AskMode::Assistant => self.answer_with_assistant(user, &turn).await?,
        };
        self.sessions.set_last_answer(
            user.id,
            LastAnswer { question: turn.question.to_string(), answer: answer.text.clone(), mode },
        );
        Ok(answer)
    }

    async fn answer_with_router(&self, user: &User, turn: &Turn<'_>) -> Result<Answer, AppError> {
        let uid = user.id;
        let limit = self.max_history;
        let history = self
            .db
            .call("chat history", move |db| db.get_user_messages(uid, limit))
            .await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(prompts::system_prompt(user.role, &self.bot_name)));
        messages.extend(history.into_iter().map(|m| ChatMessage { role: m.role, content: m.content }));
        messages.push(ChatMessage::user(turn.prompt.clone().unwrap_or_else(|| turn.question.to_string())));

        let started = Instant::now();
        let routed = self.router.complete(&messages, CompletionOptions::default()).await?;
        let response_time = elapsed_secs(started);

        let category = self.categorize(turn.question).await;
        let answer = Answer {
            text: routed.response.content,
            provider: routed.provider.as_str().to_string(),
            model: routed.response.model,
            response_time,
            tokens_used: routed.response.tokens_used,
            category,
            thread_id: None,
            personal_data: turn.personal_data,
        };
        self.persist(uid, turn, &answer).await?;
        Ok(answer)
    }

    async fn answer_with_assistant(&self, user: &User, turn: &Turn<'_>) -> Result<Answer, AppError> {
        let client = self.assistant_client()?;
        self.ensure_assistant(client).await?;

        let prompt = turn.prompt.as_deref().unwrap_or(turn.question);
        let started = Instant::now();
        let reply = client.ask(prompt, user.assistant_thread_id.as_deref()).await?;
        let response_time = elapsed_secs(started);

        let uid = user.id;
        if user.assistant_thread_id.as_deref() != Some(reply.thread_id.as_str()) {
            let thread_id = reply.thread_id.clone();
            self.db
                .call("store thread id", move |db| db.set_user_thread_id(uid, Some(&thread_id)))
                .await?;
            debug!(thread_id = %reply.thread_id, "assistant thread stored");
        }

        let answer = Answer {
            text: reply.content,
            provider: ProviderKind::OpenAi.as_str().to_string(),
            model: reply.model,
            response_time,
            tokens_used: reply.tokens_used,
            category: Some(ASSISTANT_CATEGORY.to_string()),
            thread_id: Some(reply.thread_id),
            personal_data: turn.personal_data,
        };
        self.persist(uid, turn, &answer).await?;
        Ok(answer)
    }

    async fn persist(&self, uid: i64, turn: &Turn<'_>, answer: &Answer) -> Result<(), AppError> {
        let query = NewQuery {
            user_id: uid,
            question: turn.question.to_string(),
            answer: answer.text.clone(),
            ai_provider: answer.provider.clone(),
            ai_model: Some(answer.model.clone()),
            response_time: Some(answer.response_time),
            tokens_used: answer.tokens_used,
            category: answer.category.clone(),
            documents_used: turn.faq.map(|f| json!([f.faq_question])),
        };
        let question = turn.question.to_string();
        let text = answer.text.clone();
        self.db
            .call("persist answer", move |db| {
                db.create_message(uid, MessageRole::User, &question)?;
                db.create_message(uid, MessageRole::Assistant, &text)?;
                db.increment_user_requests(uid)?;
                db.create_query(&query)
            })
            .await?;

        let mut details = json!({
            "category": answer.category,
            "response_time": answer.response_time,
            "tokens": answer.tokens_used,
            "provider": answer.provider,
            "model": answer.model,
        });
        if let Some(thread_id) = &answer.thread_id {
            details["thread_id"] = json!(thread_id);
        }
        if let Some(faq) = turn.faq {
            details["question"] = json!(faq.user_question);
        }
        self.audit(uid, turn.action, details).await;
        Ok(())
    }

    /// One-word category from the router; failures yield `None`.
    async fn categorize(&self, question: &str) -> Option<String> {
        if !self.categorize {
            return None;
        }
        let messages = [ChatMessage::user(prompts::categorization_prompt(question))];
        match self
            .router
            .complete(&messages, CompletionOptions::max_tokens(prompts::CATEGORIZE_MAX_TOKENS))
            .await
        {
            Ok(routed) => Some(prompts::normalize_category(&routed.response.content)),
            Err(e) => {
                warn!(error = %e, "categorization failed");
                None
            }
        }
    }

    fn assistant_client(&self) -> Result<&AssistantClient, ProviderError> {
        self.assistant
            .as_ref()
            .ok_or_else(|| ProviderError::Assistant("assistant mode is not configured".into()))
    }

    /// Resolve the assistant id, persisting it when it changed.
    async fn ensure_assistant(&self, client: &AssistantClient) -> Result<String, AppError> {
        let stored = self
            .db
            .call("get assistant id", |db| db.get_setting(keys::ASSISTANT_ID))
            .await?;
        let id = client.ensure_assistant(stored.as_deref()).await?;
        if stored.as_deref() != Some(id.as_str()) {
            let value = id.clone();
            self.db
                .call("set assistant id", move |db| {
                    db.set_setting(keys::ASSISTANT_ID, &value, Some("OpenAI Assistant ID"))
                })
                .await?;
        }
        Ok(id)
    }

    /// Audit failures are logged and never fail the user's request.
    async fn audit(&self, user_id: i64, action: &str, details: Value) {
        let action_owned = action.to_string();
        let result = self
            .db
            .call("audit", move |db| db.create_audit_log(Some(user_id), &action_owned, &details, None, None))
            .await;
        if let Err(e) = result {
            warn!(%action, error = %e, "audit log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::FaqEntry;
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::storage::{NewUser, UserRole};
    use tempfile::TempDir;

    fn entry() -> FaqEntry {
        FaqEntry {
            question: "Как часто проводить повторный инструктаж по охране труда?".into(),
            short_answer: "Не реже одного раза в шесть месяцев.".into(),
            legal_reference: "Постановление Правительства РФ № 2464".into(),
            legal_url: String::new(),
            block: "Инструктажи".into(),
            current_as_of: String::new(),
        }
    }

    fn setup() -> (TempDir, Consultant, User) {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        let db = Database::open(&cfg.database.path).unwrap();
        let router = ProviderRouter::new(vec![LlmProvider::Dummy(DummyProvider)], ProviderKind::Dummy, true);
        let kb = KnowledgeBase::from_entries(vec![entry()]);
        let consultant = Consultant::new(&cfg, db.clone(), Arc::new(kb), Arc::new(router));
        let user = db
            .create_user(&NewUser { id: 501, first_name: Some("Анна".into()), ..Default::default() }, UserRole::Employee)
            .unwrap();
        (dir, consultant, user)
    }

    fn msg(role: MessageRole, content: &str) -> StoredMessage {
        StoredMessage { id: 0, user_id: 1, role, content: content.into(), created_at: String::new() }
    }

    #[test]
    fn token_is_stable_and_bounded() {
        let a = question_token("Кто проводит инструктаж?");
        assert_eq!(a, question_token("Кто проводит инструктаж?"));
        assert!(a < 1_000_000);
        assert_ne!(a, question_token("Кто проводит обучение?"));
    }

    #[test]
    fn context_query_uses_last_two_messages() {
        assert_eq!(context_query(&[], "Текущий"), "Текущий");
        let long = "а".repeat(150);
        let history = vec![msg(MessageRole::User, "самый старый"), msg(MessageRole::User, "прошлый"), msg(MessageRole::Assistant, &long)];
        let q = context_query(&history, "новый");
        assert!(!q.contains("самый старый"));
        assert!(q.starts_with("Предыдущий вопрос: прошлый Предыдущий ответ: "));
        assert!(q.ends_with("... Текущий вопрос: новый"));
    }

    #[tokio::test]
    async fn short_question_rejected() {
        let (_d, c, user) = setup();
        assert_eq!(c.ask(&user, "  абв  ", AskMode::Chat).await.unwrap(), Outcome::TooShort);
        assert_eq!(c.ask(&user, "?абв", AskMode::Assistant).await.unwrap(), Outcome::TooShort);
    }

    #[tokio::test]
    async fn faq_hit_is_offered_and_stored() {
        let (_d, c, user) = setup();
        let out = c
            .ask(&user, "Как часто проводить повторный инструктаж по охране труда?", AskMode::Chat)
            .await
            .unwrap();
        let Outcome::FaqMatch { formatted, token, personal_data } = out else {
            panic!("expected FAQ match, got {out:?}");
        };
        assert!(formatted.contains("Найдено в базе знаний"));
        assert!(!personal_data);
        assert_eq!(c.sessions().faq(user.id).map(|f| f.token), Some(token));
    }

    #[tokio::test]
    async fn chat_answer_is_persisted_and_audited() {
        let (_d, c, user) = setup();
        let out = c.ask(&user, "Позвоните мне +7 999 123-45-67 про СИЗ", AskMode::Chat).await.unwrap();
        let Outcome::Answered(answer) = out else {
            panic!("expected an AI answer, got {out:?}");
        };
        assert!(answer.personal_data);
        assert_eq!(answer.provider, "dummy");
        assert!(answer.text.starts_with("[echo] "));
        assert!(!answer.text.contains("999"));
        assert_eq!(answer.category.as_deref(), Some("другое"));

        let db = c.db();
        let msgs = db.get_user_messages(user.id, 10).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].content.contains("[ТЕЛЕФОН]"));
        assert_eq!(db.get_user(user.id).unwrap().unwrap().total_requests, 1);
        let logs = db.get_user_audit_logs(user.id, 5).unwrap();
        assert_eq!(logs[0].action, "question_asked");
        assert!(c.sessions().last_answer(user.id).is_some());
    }

    #[tokio::test]
    async fn rate_limit_stops_eleventh_question() {
        let (_d, c, user) = setup();
        for _ in 0..10 {
            c.limiter().record(user.id, LimitKind::Question);
        }
        let out = c.ask(&user, "Нужен ли медосмотр поварам?", AskMode::Chat).await.unwrap();
        assert!(matches!(out, Outcome::RateLimited(m) if m.contains("Превышен лимит")));
    }

    #[tokio::test]
    async fn expand_needs_context_then_answers() {
        let (_d, c, user) = setup();
        assert_eq!(c.expand(&user, AskMode::Chat).await.unwrap(), Outcome::NoContext);

        c.ask(&user, "Как часто проводить повторный инструктаж по охране труда?", AskMode::Chat)
            .await
            .unwrap();
        let out = c.expand(&user, AskMode::Chat).await.unwrap();
        let Outcome::Answered(answer) = out else {
            panic!("expected expansion, got {out:?}");
        };
        assert!(answer.text.contains("Релевантная информация из базы знаний"));
        let logs = c.db().get_user_audit_logs(user.id, 5).unwrap();
        assert_eq!(logs[0].action, "expand_answer_requested");
    }

    #[tokio::test]
    async fn unhelpful_faq_falls_through_to_ai() {
        let (_d, c, user) = setup();
        c.ask(&user, "Как часто проводить повторный инструктаж по охране труда?", AskMode::Chat)
            .await
            .unwrap();
        assert_eq!(c.rate_faq(&user, true, AskMode::Chat).await.unwrap(), Outcome::Recorded);
        let out = c.rate_faq(&user, false, AskMode::Chat).await.unwrap();
        assert!(matches!(out, Outcome::Answered(_)));

        let actions: Vec<_> = c
            .db()
            .get_user_audit_logs(user.id, 10)
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert!(actions.contains(&"faq_rated_helpful".to_string()));
        assert!(actions.contains(&"faq_rated_unhelpful".to_string()));
        assert!(actions.contains(&"ai_after_negative_rating".to_string()));
    }

    #[tokio::test]
    async fn rating_answer_clears_session() {
        let (_d, c, user) = setup();
        assert_eq!(c.rate_answer(&user, true, AskMode::Chat).await.unwrap(), Outcome::NoContext);
        c.ask(&user, "Что входит в аптечку первой помощи?", AskMode::Chat).await.unwrap();
        assert_eq!(c.rate_answer(&user, false, AskMode::Chat).await.unwrap(), Outcome::Recorded);
        assert!(c.sessions().last_answer(user.id).is_none());
        let logs = c.db().get_user_audit_logs(user.id, 1).unwrap();
        assert_eq!(logs[0].action, "ai_rated_unhelpful");
        assert_eq!(logs[0].details["rating"], "unhelpful");
    }

    #[tokio::test]
    async fn assistant_mode_requires_client() {
        let (_d, c, user) = setup();
        let err = c.ask(&user, "?Что такое СОУТ и как её проводить?", AskMode::Assistant).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
        assert!(c.assistant_info().await.is_err());
    }

    #[tokio::test]
    async fn reset_thread_without_thread() {
        let (_d, c, user) = setup();
        assert!(!c.reset_thread(&user).await.unwrap());

        c.db().set_user_thread_id(user.id, Some("thread_1")).unwrap();
        let user = c.db().get_user(user.id).unwrap().unwrap();
        assert!(c.reset_thread(&user).await.unwrap());
        assert!(c.db().get_user(user.id).unwrap().unwrap().assistant_thread_id.is_none());
    }

    #[tokio::test]
    async fn stats_summarize_queries() {
        let (_d, c, user) = setup();
        assert!(c.user_stats(&user).await.unwrap().is_none());
        c.ask(&user, "Что входит в аптечку первой помощи?", AskMode::Chat).await.unwrap();
        c.ask(&user, "Нужно ли проводить СОУТ для помощника воспитателя в группе?", AskMode::Chat)
            .await
            .unwrap();
        let stats = c.user_stats(&user).await.unwrap().unwrap();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.categories, vec![("другое".to_string(), 2)]);
        assert_eq!(stats.recent_questions.len(), 2);
        assert!(stats.recent_questions[0].ends_with("..."));
    }

    #[tokio::test]
    async fn consent_and_forget() {
        let (_d, c, user) = setup();
        c.accept_consent(&user).await.unwrap();
        assert!(c.db().get_user(user.id).unwrap().unwrap().gdpr_accepted);

        c.ask(&user, "Что входит в аптечку первой помощи?", AskMode::Chat).await.unwrap();
        assert!(c.limiter().has_history(user.id));
        assert!(c.forget_user(&user).await.unwrap());
        assert!(c.db().get_user(user.id).unwrap().is_none());
        assert!(!c.limiter().has_history(user.id));
        assert!(c.sessions().last_answer(user.id).is_none());

        let actions: Vec<_> = c
            .db()
            .get_user_audit_logs(user.id, 10)
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(actions[0], "data_deletion_requested");
        assert!(actions.contains(&"gdpr_accepted".to_string()));
    }

    #[tokio::test]
    async fn provider_switch_needs_configured_provider() {
        let (_d, c, user) = setup();
        assert!(c.set_preferred_provider(&user, ProviderKind::OpenAi).await.is_err());
        c.set_preferred_provider(&user, ProviderKind::Dummy).await.unwrap();
        assert_eq!(c.db().get_setting(keys::AI_PROVIDER).unwrap().as_deref(), Some("dummy"));
    }
}
