//! Slash commands.

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use super::handlers::{Handler, HandlerResult};
use super::{keyboards, texts};
use crate::consult::{AccessGate, AskMode};
use crate::privacy::masked_user_id;
use crate::storage::User;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Команды бота:")]
pub enum Command {
    #[command(description = "начать работу")]
    Start,
    #[command(description = "справка")]
    Help,
    #[command(description = "задать вопрос")]
    Ask,
    #[command(description = "вопрос нейроассистенту")]
    AskAssistant,
    #[command(description = "информация о нейроассистенте")]
    AssistantInfo,
    #[command(description = "сбросить диалог с нейроассистентом")]
    ResetThread,
    #[command(description = "моя статистика")]
    Stats,
    #[command(description = "мои персональные данные")]
    Gdpr,
    #[command(description = "удалить мои данные")]
    DeleteMyData,
    #[command(hide)]
    Admin,
    #[command(hide)]
    RateLimits,
    #[command(hide)]
    ClearRateLimit(String),
    #[command(hide)]
    UserRateLimit(String),
}

/// Parse a command, tolerating `/start` deep-link payloads and admin
/// commands sent without their argument.
pub fn parse_command(text: &str, bot_username: &str) -> Option<Command> {
    if let Ok(cmd) = Command::parse(text, bot_username) {
        return Some(cmd);
    }
    let head = text.split_whitespace().next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or(head);
    match name {
        "start" => Some(Command::Start),
        "clear_rate_limit" => Some(Command::ClearRateLimit(String::new())),
        "user_rate_limit" => Some(Command::UserRateLimit(String::new())),
        _ => None,
    }
}

enum UserIdArg {
    Missing,
    Invalid,
    Id(i64),
}

fn user_id_arg(raw: &str) -> UserIdArg {
    let raw = raw.trim();
    if raw.is_empty() {
        return UserIdArg::Missing;
    }
    match raw.parse() {
        Ok(id) => UserIdArg::Id(id),
        Err(_) => UserIdArg::Invalid,
    }
}

impl Handler {
    pub(super) async fn on_command(&self, bot: &Bot, chat: ChatId, user: &User, cmd: Command) -> HandlerResult {
        let consultant = self.state.consultant();
        match cmd {
            Command::Start => {
                if user.gdpr_accepted {
                    self.send_html(bot, chat, texts::welcome_back(user), Some(keyboards::main_menu(AccessGate::is_admin(user)).into()))
                        .await?;
                } else {
                    self.send_html(bot, chat, texts::CONSENT_REQUEST, Some(keyboards::consent(true).into()))
                        .await?;
                }
            }
            Command::Help => {
                self.send_html(bot, chat, texts::HELP, Some(keyboards::main_menu(AccessGate::is_admin(user)).into()))
                    .await?;
            }
            Command::Ask => self.prompt_question(bot, chat, user, AskMode::Chat).await?,
            Command::AskAssistant => self.prompt_question(bot, chat, user, AskMode::Assistant).await?,
            Command::AssistantInfo => {
                if !consultant.assistant_enabled() {
                    self.send_html(bot, chat, texts::ASSISTANT_DISABLED, None).await?;
                    return Ok(());
                }
                let text = match consultant.assistant_info().await {
                    Ok(info) => texts::assistant_info(&info, user.assistant_thread_id.as_deref()),
                    Err(e) => {
                        warn!(error = %e, "assistant info unavailable");
                        texts::ASSISTANT_INFO_FAILED.to_string()
                    }
                };
                self.send_html(bot, chat, text, None).await?;
            }
            Command::ResetThread => {
                consultant.sessions().clear(user.id);
                let text = if consultant.reset_thread(user).await? { texts::THREAD_RESET } else { texts::NO_THREAD };
                self.send_html(bot, chat, text, None).await?;
            }
            Command::Stats => self.show_stats(bot, chat, user).await?,
            Command::Gdpr => {
                self.send_html(bot, chat, texts::gdpr_overview(user), Some(keyboards::read_agreement().into()))
                    .await?;
            }
            Command::DeleteMyData => {
                self.send_html(bot, chat, texts::DELETE_CONFIRM, Some(keyboards::confirm_delete().into()))
                    .await?;
            }
            Command::Admin => self.show_admin_menu(bot, chat, user).await?,
            Command::RateLimits => {
                if self.require_admin(bot, chat, user).await? {
                    self.send_html(bot, chat, texts::rate_limits(consultant.limiter()), None).await?;
                }
            }
            Command::ClearRateLimit(arg) => {
                if !self.require_admin(bot, chat, user).await? {
                    return Ok(());
                }
                let text = match user_id_arg(&arg) {
                    UserIdArg::Missing => texts::user_id_usage("clear_rate_limit"),
                    UserIdArg::Invalid => texts::BAD_USER_ID.to_string(),
                    UserIdArg::Id(target) => {
                        consultant.limiter().clear_user(target);
                        info!(
                            admin = %masked_user_id(user.id, user.username.as_deref()),
                            target = %masked_user_id(target, None),
                            "rate limits cleared by admin"
                        );
                        texts::rate_limit_cleared(target)
                    }
                };
                self.send_html(bot, chat, text, None).await?;
            }
            Command::UserRateLimit(arg) => {
                if !self.require_admin(bot, chat, user).await? {
                    return Ok(());
                }
                let text = match user_id_arg(&arg) {
                    UserIdArg::Missing => texts::user_id_usage("user_rate_limit"),
                    UserIdArg::Invalid => texts::BAD_USER_ID.to_string(),
                    UserIdArg::Id(target) if !consultant.limiter().has_history(target) => texts::no_rate_history(target),
                    UserIdArg::Id(target) => texts::user_rate_limit(consultant.limiter(), target),
                };
                self.send_html(bot, chat, text, None).await?;
            }
        }
        Ok(())
    }

    pub(super) async fn prompt_question(&self, bot: &Bot, chat: ChatId, user: &User, mode: AskMode) -> HandlerResult {
        let consultant = self.state.consultant();
        let prompt = match mode {
            AskMode::Chat => texts::ASK_PROMPT,
            AskMode::Assistant if !consultant.assistant_enabled() => {
                self.send_html(bot, chat, texts::ASSISTANT_DISABLED, None).await?;
                return Ok(());
            }
            AskMode::Assistant => texts::ASK_ASSISTANT_PROMPT,
        };
        consultant.sessions().set_awaiting(user.id, mode);
        self.send_html(bot, chat, prompt, None).await?;
        Ok(())
    }

    pub(super) async fn show_stats(&self, bot: &Bot, chat: ChatId, user: &User) -> HandlerResult {
        let text = match self.state.consultant().user_stats(user).await? {
            Some(stats) => texts::user_stats(user, &stats),
            None => texts::NO_STATS.to_string(),
        };
        self.send_html(bot, chat, text, None).await?;
        Ok(())
    }

    pub(super) async fn show_admin_menu(&self, bot: &Bot, chat: ChatId, user: &User) -> HandlerResult {
        if !AccessGate::is_admin(user) {
            self.send_html(bot, chat, texts::ADMIN_PANEL_DENIED, None).await?;
            return Ok(());
        }
        self.send_html(bot, chat, texts::ADMIN_MENU, Some(keyboards::admin_menu().into())).await?;
        Ok(())
    }

    /// Reply with the admin-only notice unless `user` is an admin.
    async fn require_admin(&self, bot: &Bot, chat: ChatId, user: &User) -> Result<bool, teloxide::RequestError> {
        if AccessGate::is_admin(user) {
            return Ok(true);
        }
        warn!(user = %masked_user_id(user.id, user.username.as_deref()), "admin command refused");
        self.send_html(bot, chat, texts::ADMIN_ONLY, None).await?;
        Ok(false)
    }
}
