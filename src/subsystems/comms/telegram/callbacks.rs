//! Inline-button payloads.
//!
//! Telegram caps callback data at 64 bytes, so every payload is a short
//! `name[:arg[:arg]]` string. Parsing is strict: anything unrecognised is
//! rejected and answered with a silent callback acknowledgement.

use std::fmt;
use std::str::FromStr;

use crate::consult::AskMode;
use crate::consult::access::{CONSENT_ACCEPT, CONSENT_DECLINE, CONSENT_READ};
use crate::llm::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    ConsentRead,
    ConsentAccept,
    ConsentDecline,
    ConfirmDelete,
    CancelDelete,
    AdminStats,
    AdminUsers,
    AdminAi,
    AdminKnowledge,
    AdminBack,
    SetProvider(ProviderKind),
    /// Expand the knowledge-base answer for `user` if `token` still matches.
    Expand { mode: AskMode, user: i64, token: u32 },
    /// Rate the knowledge-base answer identified by `token`.
    RateFaq { mode: AskMode, helpful: bool, token: u32 },
    /// Rate the last AI answer.
    RateAnswer { mode: AskMode, helpful: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCallback(pub String);

impl fmt::Display for UnknownCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown callback payload: {}", self.0)
    }
}

impl std::error::Error for UnknownCallback {}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::ConsentRead => f.write_str(CONSENT_READ),
            CallbackAction::ConsentAccept => f.write_str(CONSENT_ACCEPT),
            CallbackAction::ConsentDecline => f.write_str(CONSENT_DECLINE),
            CallbackAction::ConfirmDelete => f.write_str("confirm_delete_data"),
            CallbackAction::CancelDelete => f.write_str("cancel_delete_data"),
            CallbackAction::AdminStats => f.write_str("admin_stats"),
            CallbackAction::AdminUsers => f.write_str("admin_users"),
            CallbackAction::AdminAi => f.write_str("admin_ai"),
            CallbackAction::AdminKnowledge => f.write_str("admin_kb"),
            CallbackAction::AdminBack => f.write_str("admin_back"),
            CallbackAction::SetProvider(kind) => write!(f, "ai_provider_{}", kind.as_str()),
            CallbackAction::Expand { mode, user, token } => {
                let name = match mode {
                    AskMode::Chat => "expand_answer",
                    AskMode::Assistant => "expand_assistant",
                };
                write!(f, "{name}:{user}:{token}")
            }
            CallbackAction::RateFaq { mode, helpful, token } => {
                let prefix = match mode {
                    AskMode::Chat => "rate_",
                    AskMode::Assistant => "rate_assistant_",
                };
                let verdict = if *helpful { "helpful" } else { "unhelpful" };
                write!(f, "{prefix}{verdict}:{token}")
            }
            CallbackAction::RateAnswer { mode, helpful } => {
                let prefix = match mode {
                    AskMode::Chat => "rate_ai_",
                    AskMode::Assistant => "rate_assistant_ai_",
                };
                let verdict = if *helpful { "helpful" } else { "unhelpful" };
                write!(f, "{prefix}{verdict}")
            }
        }
    }
}

impl FromStr for CallbackAction {
    type Err = UnknownCallback;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownCallback(s.to_string());
        let action = match s {
            CONSENT_READ => CallbackAction::ConsentRead,
            CONSENT_ACCEPT => CallbackAction::ConsentAccept,
            CONSENT_DECLINE => CallbackAction::ConsentDecline,
            "confirm_delete_data" => CallbackAction::ConfirmDelete,
            "cancel_delete_data" => CallbackAction::CancelDelete,
            "admin_stats" => CallbackAction::AdminStats,
            "admin_users" => CallbackAction::AdminUsers,
            "admin_ai" => CallbackAction::AdminAi,
            "admin_kb" => CallbackAction::AdminKnowledge,
            "admin_back" => CallbackAction::AdminBack,
            "rate_ai_helpful" => CallbackAction::RateAnswer { mode: AskMode::Chat, helpful: true },
            "rate_ai_unhelpful" => CallbackAction::RateAnswer { mode: AskMode::Chat, helpful: false },
            "rate_assistant_ai_helpful" => CallbackAction::RateAnswer { mode: AskMode::Assistant, helpful: true },
            "rate_assistant_ai_unhelpful" => {
                CallbackAction::RateAnswer { mode: AskMode::Assistant, helpful: false }
            }
            _ => {
                if let Some(kind) = s.strip_prefix("ai_provider_") {
                    return kind.parse().map(CallbackAction::SetProvider).map_err(|_| unknown());
                }

                let mut parts = s.split(':');
                let name = parts.next().unwrap_or_default();
                let args: Vec<&str> = parts.collect();
                match (name, args.as_slice()) {
                    ("expand_answer" | "expand_assistant", [user, token]) => CallbackAction::Expand {
                        mode: if name == "expand_answer" { AskMode::Chat } else { AskMode::Assistant },
                        user: user.parse().map_err(|_| unknown())?,
                        token: token.parse().map_err(|_| unknown())?,
                    },
                    (
                        "rate_helpful" | "rate_unhelpful" | "rate_assistant_helpful" | "rate_assistant_unhelpful",
                        [token],
                    ) => CallbackAction::RateFaq {
                        mode: if name.starts_with("rate_assistant_") { AskMode::Assistant } else { AskMode::Chat },
                        helpful: name.ends_with("_helpful") && !name.ends_with("_unhelpful"),
                        token: token.parse().map_err(|_| unknown())?,
                    },
                    _ => return Err(unknown()),
                }
            }
        };
        Ok(action)
    }
}
