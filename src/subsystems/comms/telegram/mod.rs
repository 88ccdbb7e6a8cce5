//! Telegram channel: long-polls the Bot API and hands every update to
//! [`handlers::Handler`].

pub mod callbacks;
pub mod commands;
pub mod handlers;
pub mod keyboards;
pub mod markdown;
pub mod texts;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::state::CommsState;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::supervisor::health::ids;
use commands::Command;
use handlers::Handler;

// ── Constants ────────────────────────────────────────────────────────────────

/// Telegram has a 4096 character limit per message.
/// We chunk at 4000 to be safe.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Split `text` into pieces of at most `max` chars, preferring to break at
/// a newline in the second half of a piece. Always returns at least one piece.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max).min(chars.len());
        if end < chars.len() {
            if let Some(nl) = chars[start..end].iter().rposition(|c| *c == '\n') {
                if nl >= max / 2 {
                    end = start + nl + 1;
                }
            }
        }
        out.push(chars[start..end].iter().collect());
        start = end;
    }
    out
}

// ── TelegramChannel ──────────────────────────────────────────────────────────

pub struct TelegramChannel {
    state: Arc<CommsState>,
}

impl TelegramChannel {
    pub fn new(state: Arc<CommsState>) -> Self {
        Self { state }
    }
}

impl Component for TelegramChannel {
    fn id(&self) -> &str {
        ids::TELEGRAM
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.state, shutdown))
    }
}

// ── run_telegram ─────────────────────────────────────────────────────────────

async fn run_telegram(state: Arc<CommsState>, shutdown: CancellationToken) -> Result<(), AppError> {
    let health = state.health().reporter(ids::TELEGRAM);
    let Some(token) = state.config().secrets.telegram_bot_token.clone() else {
        warn!("TELEGRAM_BOT_TOKEN not set, telegram channel exiting");
        health.set_unhealthy("bot token not configured").await;
        return Ok(());
    };

    let bot = Bot::new(token);
    let me = match bot.get_me().await {
        Ok(me) => me,
        Err(e) => {
            health.set_unhealthy(format!("getMe failed: {e}")).await;
            return Err(AppError::Comms(format!("telegram getMe failed: {e}")));
        }
    };
    let username = me.username().to_string();
    info!(bot = %username, "telegram channel starting");

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "could not register bot commands");
    }
    health
        .set_healthy_with("polling", Some(serde_json::json!({ "bot": username })))
        .await;

    let handler = Arc::new(Handler::new(state, username));
    let on_message = handler.clone();
    let on_callback = handler;

    let tree = dptree::entry()
        .branch(Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let handler = on_message.clone();
            async move {
                if let Err(e) = handler.on_message(&bot, &msg).await {
                    warn!(error = %e, "message handler failed");
                    let _ = bot.send_message(msg.chat.id, texts::GENERIC_ERROR).await;
                }
                respond(())
            }
        }))
        .branch(Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
            let handler = on_callback.clone();
            async move {
                if let Err(e) = handler.on_callback(&bot, &q).await {
                    warn!(error = %e, "callback handler failed");
                    if let Some(message) = q.message.as_ref() {
                        let _ = bot.send_message(message.chat().id, texts::GENERIC_ERROR).await;
                    }
                }
                respond(())
            }
        }));

    let mut dispatcher = Dispatcher::builder(bot, tree).build();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!("shutdown signal received, closing telegram channel");
        }
        _ = dispatcher.dispatch() => {
            warn!("telegram dispatcher exited unexpectedly");
            health.set_unhealthy("dispatcher exited").await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("коротко", 4000), vec!["коротко".to_string()]);
        assert_eq!(chunk_text("", 4000), vec![String::new()]);
    }

    #[test]
    fn chunks_count_chars_not_bytes() {
        let text = "я".repeat(9000);
        let chunks = chunk_text(&text, MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_LENGTH));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn prefers_newline_breaks() {
        let text = format!("{}\n{}", "а".repeat(8), "б".repeat(8));
        let chunks = chunk_text(&text, 12);
        assert_eq!(chunks[0], format!("{}\n", "а".repeat(8)));
        assert_eq!(chunks[1], "б".repeat(8));
    }
}
