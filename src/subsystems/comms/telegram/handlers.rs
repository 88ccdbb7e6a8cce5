//! Message and callback routing for the Telegram channel.
//!
//! Every update goes through the access gate first. Text is then routed in
//! a fixed order: commands, menu buttons, a pending `/ask` prompt, the `?`
//! assistant prefix, greetings, unknown commands, and finally a plain chat
//! question.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId, ParseMode, ReplyMarkup};
use teloxide::RequestError;
use tracing::{debug, info, warn};

use super::callbacks::CallbackAction;
use super::commands::parse_command;
use super::keyboards::{self, MenuButton};
use super::markdown::markdown_to_html;
use super::texts;
use super::{MAX_MESSAGE_LENGTH, chunk_text};
use crate::consult::{AccessEvent, AccessGate, Admission, Answer, AskMode, Outcome};
use crate::privacy::{masked_user_id, privacy_warning};
use crate::storage::{NewUser, User, UserRole};
use crate::subsystems::comms::CommsState;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(привет|здравствуй(те)?|добр(ый|ое|ого)\s+(день|утро|вечер|дня|утра|вечера)|доброй\s+ночи|hello|hi)\b")
        .expect("static greeting regex")
});

/// Short salutations only; a greeting followed by a real question is a question.
pub fn is_greeting(text: &str) -> bool {
    text.split_whitespace().count() <= 4 && !text.contains('?') && GREETING.is_match(text)
}

fn profile(from: &teloxide::types::User) -> NewUser {
    NewUser {
        id: from.id.0 as i64,
        username: from.username.clone(),
        first_name: Some(from.first_name.clone()),
        last_name: from.last_name.clone(),
    }
}

/// How an answer is framed on screen.
struct Frame {
    head: &'static str,
    tail: &'static str,
}

const PLAIN: Frame = Frame { head: "", tail: "" };

pub struct Handler {
    pub(super) state: Arc<CommsState>,
    pub(super) bot_username: String,
}

impl Handler {
    pub fn new(state: Arc<CommsState>, bot_username: impl Into<String>) -> Self {
        Self { state, bot_username: bot_username.into() }
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    pub async fn on_message(&self, bot: &Bot, msg: &Message) -> HandlerResult {
        let Some(from) = msg.from.as_ref() else {
            return Ok(());
        };
        let chat = msg.chat.id;
        let text = msg.text();

        let user = match self.state.gate().admit(profile(from), AccessEvent::Message(text)).await? {
            Admission::Allowed(user) => user,
            Admission::Denied(denial) => {
                self.send_html(bot, chat, denial.message(), None).await?;
                return Ok(());
            }
        };
        let Some(text) = text else {
            debug!(user = %masked_user_id(user.id, None), "ignoring non-text message");
            return Ok(());
        };

        if let Some(cmd) = parse_command(text, &self.bot_username) {
            debug!(user = %masked_user_id(user.id, None), ?cmd, "command");
            return self.on_command(bot, chat, &user, cmd).await;
        }

        if let Some(button) = MenuButton::from_text(text) {
            return self.on_menu_button(bot, chat, &user, button).await;
        }

        let consultant = self.state.consultant();
        if let Some(mode) = consultant.sessions().take_awaiting(user.id) {
            return self.run_question(bot, chat, &user, text, mode).await;
        }

        let trimmed = text.trim_start();
        if trimmed.starts_with('?') {
            if consultant.assistant_enabled() {
                return self.run_question(bot, chat, &user, trimmed, AskMode::Assistant).await;
            }
            let question = trimmed.trim_start_matches('?');
            return self.run_question(bot, chat, &user, question, AskMode::Chat).await;
        }

        if is_greeting(text) {
            self.send_html(bot, chat, texts::greeting(&user), None).await?;
            return Ok(());
        }

        if trimmed.starts_with('/') {
            self.send_html(bot, chat, texts::UNKNOWN_COMMAND, None).await?;
            return Ok(());
        }

        self.run_question(bot, chat, &user, text, AskMode::Chat).await
    }

    async fn on_menu_button(&self, bot: &Bot, chat: ChatId, user: &User, button: MenuButton) -> HandlerResult {
        let consultant = self.state.consultant();
        match button {
            MenuButton::Ask => self.prompt_question(bot, chat, user, AskMode::Chat).await?,
            MenuButton::Knowledge => {
                let text = texts::knowledge_overview(&consultant.knowledge().statistics());
                self.send_html(bot, chat, text, None).await?;
            }
            MenuButton::Documents => {
                let docs = consultant
                    .db()
                    .call("list documents", |db| db.get_all_documents(true, None))
                    .await?;
                self.send_html(bot, chat, texts::documents(&docs), None).await?;
            }
            MenuButton::Stats => self.show_stats(bot, chat, user).await?,
            MenuButton::Settings => {
                let text = texts::settings(user, consultant.assistant_enabled());
                self.send_html(bot, chat, text, None).await?;
            }
            MenuButton::Admin => self.show_admin_menu(bot, chat, user).await?,
        }
        Ok(())
    }

    async fn run_question(&self, bot: &Bot, chat: ChatId, user: &User, text: &str, mode: AskMode) -> HandlerResult {
        let status = self.send_html(bot, chat, texts::searching(mode), None).await?;
        let outcome = self.state.consultant().ask(user, text, mode).await;
        self.drop_status(bot, chat, status.id).await;
        self.render(bot, chat, user, outcome?, mode, &PLAIN).await
    }

    // ── Callbacks ────────────────────────────────────────────────────────────

    pub async fn on_callback(&self, bot: &Bot, q: &CallbackQuery) -> HandlerResult {
        let data = q.data.as_deref().unwrap_or_default();
        let user = match self.state.gate().admit(profile(&q.from), AccessEvent::Callback(data)).await? {
            Admission::Allowed(user) => user,
            Admission::Denied(denial) => {
                bot.answer_callback_query(q.id.clone()).text(denial.message()).show_alert(true).await?;
                return Ok(());
            }
        };

        let action = match data.parse::<CallbackAction>() {
            Ok(action) => action,
            Err(e) => {
                debug!(error = %e, "ignoring callback");
                bot.answer_callback_query(q.id.clone()).await?;
                return Ok(());
            }
        };
        let Some(message) = q.message.as_ref() else {
            bot.answer_callback_query(q.id.clone()).await?;
            return Ok(());
        };
        let chat = message.chat().id;
        let message_id = message.id();
        let consultant = self.state.consultant();

        match action {
            CallbackAction::ConsentRead => {
                bot.answer_callback_query(q.id.clone()).await?;
                let text = texts::agreement(&self.state.config().bot_name);
                self.send_html(bot, chat, text, Some(keyboards::consent(false).into())).await?;
            }
            CallbackAction::ConsentAccept => {
                consultant.accept_consent(&user).await?;
                bot.answer_callback_query(q.id.clone()).await?;
                self.edit_html(bot, chat, message_id, texts::CONSENT_ACCEPTED, None).await?;
                let menu = keyboards::main_menu(AccessGate::is_admin(&user));
                self.send_html(bot, chat, texts::MENU_PROMPT, Some(menu.into())).await?;
            }
            CallbackAction::ConsentDecline => {
                bot.answer_callback_query(q.id.clone()).await?;
                self.edit_html(bot, chat, message_id, texts::CONSENT_DECLINED, None).await?;
            }
            CallbackAction::ConfirmDelete => {
                consultant.forget_user(&user).await?;
                bot.answer_callback_query(q.id.clone()).await?;
                self.edit_html(bot, chat, message_id, texts::DATA_DELETED, None).await?;
            }
            CallbackAction::CancelDelete => {
                bot.answer_callback_query(q.id.clone()).await?;
                self.edit_html(bot, chat, message_id, texts::DELETE_CANCELLED, None).await?;
            }
            CallbackAction::AdminStats
            | CallbackAction::AdminUsers
            | CallbackAction::AdminAi
            | CallbackAction::AdminKnowledge
            | CallbackAction::AdminBack
            | CallbackAction::SetProvider(_) => {
                if !AccessGate::is_admin(&user) {
                    bot.answer_callback_query(q.id.clone()).text(texts::NO_ACCESS).show_alert(true).await?;
                    return Ok(());
                }
                self.on_admin_action(bot, q, &user, chat, message_id, action).await?;
            }
            CallbackAction::Expand { mode, user: owner, token } => {
                if owner != user.id {
                    bot.answer_callback_query(q.id.clone()).text(texts::FOREIGN_BUTTON).show_alert(true).await?;
                    return Ok(());
                }
                bot.answer_callback_query(q.id.clone()).await?;
                if !self.faq_token_matches(user.id, token) {
                    self.send_html(bot, chat, texts::NO_CONTEXT, None).await?;
                    return Ok(());
                }
                let status = self.send_html(bot, chat, texts::expanding(mode), None).await?;
                let outcome = consultant.expand(&user, mode).await;
                self.drop_status(bot, chat, status.id).await;
                let frame = Frame { head: texts::EXPANDED_PREFIX, tail: texts::expanded_footer(mode) };
                self.render(bot, chat, &user, outcome?, mode, &frame).await?;
            }
            CallbackAction::RateFaq { mode, helpful, token } => {
                if !self.faq_token_matches(user.id, token) {
                    bot.answer_callback_query(q.id.clone()).await?;
                    self.send_html(bot, chat, texts::NO_CONTEXT, None).await?;
                    return Ok(());
                }
                if helpful {
                    consultant.rate_faq(&user, true, mode).await?;
                    bot.answer_callback_query(q.id.clone()).text(texts::FAQ_THANKS).await?;
                    bot.edit_message_reply_markup(chat, message_id)
                        .reply_markup(keyboards::expand_only(mode, user.id, token))
                        .await?;
                    return Ok(());
                }
                bot.answer_callback_query(q.id.clone())
                    .text(texts::faq_unhelpful_alert(mode))
                    .show_alert(true)
                    .await?;
                bot.edit_message_reply_markup(chat, message_id).await?;
                let status = self.send_html(bot, chat, texts::asking_ai_again(mode), None).await?;
                let outcome = consultant.rate_faq(&user, false, mode).await;
                self.drop_status(bot, chat, status.id).await;
                self.render(bot, chat, &user, outcome?, mode, &PLAIN).await?;
            }
            CallbackAction::RateAnswer { mode, helpful } => {
                match consultant.rate_answer(&user, helpful, mode).await? {
                    Outcome::NoContext => {
                        bot.answer_callback_query(q.id.clone()).text(texts::NO_CONTEXT).show_alert(true).await?;
                    }
                    _ => {
                        bot.answer_callback_query(q.id.clone())
                            .text(texts::answer_rating_alert(helpful))
                            .show_alert(true)
                            .await?;
                        bot.edit_message_reply_markup(chat, message_id).await?;
                        if !helpful {
                            self.send_html(bot, chat, texts::unhelpful_followup(mode), None).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn on_admin_action(
        &self,
        bot: &Bot,
        q: &CallbackQuery,
        user: &User,
        chat: ChatId,
        message_id: MessageId,
        action: CallbackAction,
    ) -> HandlerResult {
        let consultant = self.state.consultant();
        let db = consultant.db();
        let router = consultant.router();

        let (text, markup) = match action {
            CallbackAction::AdminStats => {
                let (users, stats, categories) = db
                    .call("admin stats", |db| {
                        Ok((db.count_users()?, db.get_queries_stats()?, db.get_popular_categories(5)?))
                    })
                    .await?;
                (texts::admin_stats(users, &stats, &categories), keyboards::admin_back())
            }
            CallbackAction::AdminUsers => {
                let users = db.call("admin users", |db| db.get_all_users(None)).await?;
                let by_role: Vec<(UserRole, usize)> = UserRole::ALL
                    .into_iter()
                    .map(|role| (role, users.iter().filter(|u| u.role == role).count()))
                    .filter(|(_, n)| *n > 0)
                    .collect();
                (texts::admin_users(&by_role, users.len()), keyboards::admin_back())
            }
            CallbackAction::AdminAi => {
                let current = router.preferred().await;
                (
                    texts::admin_ai(current.display_name(), false),
                    keyboards::provider_picker(current, &router.available()),
                )
            }
            CallbackAction::AdminKnowledge => {
                let stats = consultant.knowledge().statistics();
                (texts::admin_knowledge(&stats), keyboards::admin_back())
            }
            CallbackAction::SetProvider(kind) => {
                if let Err(e) = consultant.set_preferred_provider(user, kind).await {
                    warn!(provider = %kind, error = %e, "provider switch refused");
                    bot.answer_callback_query(q.id.clone())
                        .text(texts::provider_unavailable(kind.display_name()))
                        .show_alert(true)
                        .await?;
                    return Ok(());
                }
                info!(admin = %masked_user_id(user.id, user.username.as_deref()), provider = %kind, "provider switched from chat");
                bot.answer_callback_query(q.id.clone())
                    .text(texts::provider_changed_alert(kind.display_name()))
                    .show_alert(true)
                    .await?;
                let markup = keyboards::provider_picker(kind, &router.available());
                self.edit_html(bot, chat, message_id, texts::admin_ai(kind.display_name(), true), Some(markup))
                    .await?;
                return Ok(());
            }
            _ => (texts::ADMIN_MENU.to_string(), keyboards::admin_menu()),
        };

        bot.answer_callback_query(q.id.clone()).await?;
        self.edit_html(bot, chat, message_id, text, Some(markup)).await?;
        Ok(())
    }

    fn faq_token_matches(&self, user_id: i64, token: u32) -> bool {
        self.state
            .consultant()
            .sessions()
            .faq(user_id)
            .is_some_and(|faq| faq.token == token)
    }

    // ── Rendering ────────────────────────────────────────────────────────────

    async fn render(
        &self,
        bot: &Bot,
        chat: ChatId,
        user: &User,
        outcome: Outcome,
        mode: AskMode,
        frame: &Frame,
    ) -> HandlerResult {
        match outcome {
            Outcome::RateLimited(notice) => {
                self.send_html(bot, chat, notice, None).await?;
            }
            Outcome::TooShort => {
                self.send_html(bot, chat, texts::TOO_SHORT, None).await?;
            }
            Outcome::NoContext => {
                self.send_html(bot, chat, texts::NO_CONTEXT, None).await?;
            }
            Outcome::FaqMatch { formatted, token, personal_data } => {
                if personal_data {
                    self.send_html(bot, chat, privacy_warning(), None).await?;
                }
                let markup = keyboards::faq_actions(mode, user.id, token);
                self.send_chunked(bot, chat, &PLAIN, &formatted, false, Some(markup)).await?;
            }
            Outcome::Answered(answer) => self.send_answer(bot, chat, &answer, mode, frame).await?,
            Outcome::Recorded => {}
        }
        Ok(())
    }

    async fn send_answer(&self, bot: &Bot, chat: ChatId, answer: &Answer, mode: AskMode, frame: &Frame) -> HandlerResult {
        if answer.personal_data {
            self.send_html(bot, chat, privacy_warning(), None).await?;
        }
        let body = if answer.text.trim().is_empty() { "(пустой ответ)" } else { answer.text.as_str() };
        self.send_chunked(bot, chat, frame, body, true, Some(keyboards::answer_rating(mode))).await?;
        Ok(())
    }

    /// Send `body` in pieces under the Telegram limit. The frame's head opens
    /// the first piece, its tail and the keyboard close the last one. A
    /// `markdown` body is model output and is converted chunk by chunk;
    /// otherwise it is already HTML.
    async fn send_chunked(
        &self,
        bot: &Bot,
        chat: ChatId,
        frame: &Frame,
        body: &str,
        markdown: bool,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), RequestError> {
        let tail = if frame.tail.is_empty() { String::new() } else { format!("\n\n{}", frame.tail) };
        let budget = MAX_MESSAGE_LENGTH
            .saturating_sub(frame.head.chars().count() + tail.chars().count())
            .max(1);
        let chunks = chunk_text(body, budget);
        let last = chunks.len().saturating_sub(1);
        let mut markup = markup;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut text = String::new();
            if i == 0 {
                text.push_str(frame.head);
            }
            if markdown {
                text.push_str(&markdown_to_html(chunk));
            } else {
                text.push_str(chunk);
            }
            let keyboard = if i == last {
                text.push_str(&tail);
                markup.take().map(ReplyMarkup::from)
            } else {
                None
            };
            self.send_html(bot, chat, text, keyboard).await?;
        }
        Ok(())
    }

    pub(super) async fn send_html(
        &self,
        bot: &Bot,
        chat: ChatId,
        text: impl Into<String>,
        markup: Option<ReplyMarkup>,
    ) -> Result<Message, RequestError> {
        let request = bot.send_message(chat, text.into()).parse_mode(ParseMode::Html);
        match markup {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        }
    }

    async fn edit_html(
        &self,
        bot: &Bot,
        chat: ChatId,
        message_id: MessageId,
        text: impl Into<String>,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, RequestError> {
        let request = bot.edit_message_text(chat, message_id, text.into()).parse_mode(ParseMode::Html);
        match markup {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        }
    }

    /// Remove a "searching..." notice. Failures are harmless.
    async fn drop_status(&self, bot: &Bot, chat: ChatId, message_id: MessageId) {
        if let Err(e) = bot.delete_message(chat, message_id).await {
            debug!(error = %e, "could not delete status message");
        }
    }
}
