//! Comms subsystem: every external surface of the bot.
//!
//! Each channel (Telegram, the admin HTTP panel) implements
//! [`Component`] and captures its shared [`Arc<CommsState>`] at
//! construction time. [`channels`] builds the list from config; the caller
//! spawns them together with the rest of the components.

#[cfg(feature = "admin-panel")]
pub mod admin;
mod state;
#[cfg(feature = "channel-telegram")]
pub mod telegram;

pub use state::CommsState;

use std::sync::Arc;

use tracing::info;

use crate::subsystems::runtime::Component;

/// Build the configured channels.
pub fn channels(state: Arc<CommsState>) -> Vec<Box<dyn Component>> {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-telegram")]
    {
        if state.config().telegram_should_load() {
            info!("loading telegram channel");
            components.push(Box::new(telegram::TelegramChannel::new(state.clone())));
        } else {
            info!("telegram channel disabled or TELEGRAM_BOT_TOKEN missing");
        }
    }

    #[cfg(feature = "admin-panel")]
    {
        if state.config().admin_should_load() {
            info!(bind = %state.config().admin.bind, "loading admin panel");
            components.push(Box::new(admin::AdminPanel::new(state.clone())));
        } else {
            info!("admin panel disabled or ADMIN_SECRET_KEY missing");
        }
    }

    if components.is_empty() {
        info!("no comms channels configured");
    }
    components
}
