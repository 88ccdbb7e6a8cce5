//! Reply and inline keyboards.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use super::callbacks::CallbackAction;
use crate::consult::AskMode;
use crate::llm::ProviderKind;

// ── Main menu ────────────────────────────────────────────────────────────────

pub const BTN_ASK: &str = "❓ Задать вопрос";
pub const BTN_KNOWLEDGE: &str = "📚 База знаний";
pub const BTN_DOCUMENTS: &str = "📄 Документы";
pub const BTN_STATS: &str = "📊 Моя статистика";
pub const BTN_SETTINGS: &str = "⚙️ Настройки";
pub const BTN_ADMIN: &str = "👤 Админ-панель";

/// A press on one of the main-menu reply buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuButton {
    Ask,
    Knowledge,
    Documents,
    Stats,
    Settings,
    Admin,
}

impl MenuButton {
    pub fn from_text(text: &str) -> Option<Self> {
        Some(match text.trim() {
            BTN_ASK => MenuButton::Ask,
            BTN_KNOWLEDGE => MenuButton::Knowledge,
            BTN_DOCUMENTS => MenuButton::Documents,
            BTN_STATS => MenuButton::Stats,
            BTN_SETTINGS => MenuButton::Settings,
            BTN_ADMIN => MenuButton::Admin,
            _ => return None,
        })
    }
}

pub fn main_menu(is_admin: bool) -> KeyboardMarkup {
    let mut rows = vec![
        vec![KeyboardButton::new(BTN_ASK)],
        vec![KeyboardButton::new(BTN_KNOWLEDGE), KeyboardButton::new(BTN_DOCUMENTS)],
        vec![KeyboardButton::new(BTN_STATS), KeyboardButton::new(BTN_SETTINGS)],
    ];
    if is_admin {
        rows.push(vec![KeyboardButton::new(BTN_ADMIN)]);
    }
    KeyboardMarkup::new(rows)
        .resize_keyboard()
        .input_field_placeholder("Выберите действие или напишите вопрос...")
}

// ── Inline ───────────────────────────────────────────────────────────────────

fn button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.to_string())
}

pub fn consent(with_read: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if with_read {
        rows.push(vec![button("📄 Читать соглашение", CallbackAction::ConsentRead)]);
    }
    rows.push(vec![
        button("✅ Принимаю", CallbackAction::ConsentAccept),
        button("❌ Отказаться", CallbackAction::ConsentDecline),
    ]);
    InlineKeyboardMarkup::new(rows)
}

pub fn read_agreement() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("📄 Читать соглашение", CallbackAction::ConsentRead)]])
}

pub fn confirm_delete() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Да", CallbackAction::ConfirmDelete),
        button("❌ Нет", CallbackAction::CancelDelete),
    ]])
}

pub fn admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("📊 Статистика", CallbackAction::AdminStats)],
        vec![button("👥 Пользователи", CallbackAction::AdminUsers)],
        vec![button("🤖 Настройки AI", CallbackAction::AdminAi)],
        vec![button("📚 База знаний", CallbackAction::AdminKnowledge)],
    ])
}

pub fn admin_back() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("🔙 Назад", CallbackAction::AdminBack)]])
}

/// Provider picker; `available` decides which rows appear.
pub fn provider_picker(current: ProviderKind, available: &[ProviderKind]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = available
        .iter()
        .map(|kind| {
            let label = if *kind == current {
                format!("✅ {} (активен)", kind.display_name())
            } else {
                kind.display_name().to_string()
            };
            vec![button(&label, CallbackAction::SetProvider(*kind))]
        })
        .collect();
    rows.push(vec![button("🔙 Назад", CallbackAction::AdminBack)]);
    InlineKeyboardMarkup::new(rows)
}

/// Buttons under a knowledge-base answer.
pub fn faq_actions(mode: AskMode, user: i64, token: u32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![expand_button(mode, user, token)],
        vec![
            button("👍 Полезно", CallbackAction::RateFaq { mode, helpful: true, token }),
            button("👎 Не помогло", CallbackAction::RateFaq { mode, helpful: false, token }),
        ],
    ])
}

/// What stays after the user liked a knowledge-base answer.
pub fn expand_only(mode: AskMode, user: i64, token: u32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![expand_button(mode, user, token)]])
}

fn expand_button(mode: AskMode, user: i64, token: u32) -> InlineKeyboardButton {
    let label = match mode {
        AskMode::Chat => "🤖 Расширить ответ через AI",
        AskMode::Assistant => "🤖 Расширить через нейроассистента",
    };
    button(label, CallbackAction::Expand { mode, user, token })
}

/// Buttons under an AI answer.
pub fn answer_rating(mode: AskMode) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("👍 Полезно", CallbackAction::RateAnswer { mode, helpful: true }),
        button("👎 Не помогло", CallbackAction::RateAnswer { mode, helpful: false }),
    ]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_row_only_for_admins() {
        assert_eq!(main_menu(false).keyboard.len(), 3);
        let admin = main_menu(true);
        assert_eq!(admin.keyboard.len(), 4);
        assert_eq!(admin.keyboard[3][0].text, BTN_ADMIN);
    }

    #[test]
    fn menu_buttons_round_trip_through_text() {
        assert_eq!(MenuButton::from_text(BTN_STATS), Some(MenuButton::Stats));
        assert_eq!(MenuButton::from_text("📊 Моя статистика "), Some(MenuButton::Stats));
        assert_eq!(MenuButton::from_text("статистика"), None);
    }

    #[test]
    fn provider_picker_marks_active() {
        let kb = provider_picker(ProviderKind::GigaChat, &[ProviderKind::OpenAi, ProviderKind::GigaChat, ProviderKind::Dummy]);
        assert_eq!(kb.inline_keyboard.len(), 4);
        assert_eq!(kb.inline_keyboard[0][0].text, "OpenAI");
        assert_eq!(kb.inline_keyboard[1][0].text, "✅ GigaChat (активен)");
        assert_eq!(kb.inline_keyboard[3][0].text, "🔙 Назад");
    }
}
