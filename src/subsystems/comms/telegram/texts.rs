//! User-facing message texts. Everything sent with `ParseMode::Html`
//! escapes user content through [`escape_html`]; model answers go through
//! [`super::markdown::markdown_to_html`].

use crate::consult::{AskMode, UserStats};
use crate::knowledge::KbStatistics;
use crate::llm::assistant::AssistantInfo;
use crate::rate_limit::{LimitKind, RateLimiter};
use crate::storage::{Document, QueryStats, User, UserRole, display_timestamp};

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn display_name(user: &User) -> String {
    escape_html(user.first_name.as_deref().unwrap_or("пользователь"))
}

// ── Start & consent ──────────────────────────────────────────────────────────

pub const CONSENT_REQUEST: &str = "👋 Добро пожаловать в бот-консультант по охране труда и технике безопасности в ДОУ!\n\n\
Я помогу вам с вопросами по:\n\
✅ Трудовому законодательству РФ\n\
✅ Охране труда в детских садах\n\
✅ СанПиН и нормативным документам\n\
✅ Проведению инструктажей\n\
✅ СОУТ и расследованию несчастных случаев\n\n\
⚠️ <b>Согласие на обработку персональных данных (ФЗ-152)</b>\n\n\
Для работы бота необходимо ваше согласие на обработку персональных данных:\n\
• Telegram ID\n\
• Имя пользователя\n\
• История запросов\n\n\
Данные используются исключительно для функционирования бота и не передаются третьим лицам.\n\
Вы можете в любой момент удалить свои данные командой /gdpr";

pub fn welcome_back(user: &User) -> String {
    format!(
        "👋 С возвращением, {}!\n\n\
         Ваша роль: <b>{}</b>\n\
         Всего запросов: {}\n\n\
         Задайте мне вопрос по охране труда или выберите действие из меню ниже 👇",
        display_name(user),
        user.role,
        user.total_requests
    )
}

pub const CONSENT_ACCEPTED: &str = "✅ Спасибо! Согласие на обработку персональных данных принято.\n\n\
Теперь вы можете пользоваться всеми функциями бота!";

pub const MENU_PROMPT: &str = "Задайте мне вопрос по охране труда или выберите действие из меню 👇";

pub const CONSENT_DECLINED: &str = "❌ К сожалению, без согласия на обработку персональных данных использование бота невозможно.\n\n\
Если передумаете, отправьте /start снова.";

pub fn agreement(bot_name: &str) -> String {
    format!(
        "📄 <b>СОГЛАШЕНИЕ ОБ ОБРАБОТКЕ ПЕРСОНАЛЬНЫХ ДАННЫХ</b>\n\n\
<b>1. ОБЩИЕ ПОЛОЖЕНИЯ</b>\n\n\
Настоящее Соглашение разработано в соответствии с Федеральным законом от 27.07.2006 № 152-ФЗ «О персональных данных». \
Используя Telegram-бот «{bot}» (далее — Бот), Пользователь даёт согласие на обработку персональных данных на условиях настоящего Соглашения.\n\n\
<b>2. КАКИЕ ДАННЫЕ МЫ СОБИРАЕМ</b>\n\n\
• Telegram ID\n• Имя пользователя (username)\n• Имя и фамилия, если указаны в профиле\n\
• История запросов к Боту\n• Дата и время обращений\n• Статистика использования\n\n\
<b>3. ЦЕЛИ ОБРАБОТКИ</b>\n\n\
• Идентификация Пользователя\n• Консультации по охране труда\n• Сохранение контекста диалога\n\
• Улучшение качества ответов\n• Статистика использования\n• Безопасность системы\n\n\
<b>4. ПЕРЕДАЧА ТРЕТЬИМ ЛИЦАМ И АНОНИМИЗАЦИЯ</b>\n\n\
⚠️ <b>ВАЖНО:</b> ваши идентификационные данные (ID, имя, фамилия, username) НЕ передаются третьим лицам.\n\
AI-сервисам передаётся только текст вопросов и ответов. Телефоны, email, паспортные данные и СНИЛС \
в тексте вопроса автоматически заменяются метками до отправки.\n\n\
<b>5. СРОК ХРАНЕНИЯ</b>\n\n\
• В течение всего периода использования Бота\n• До запроса на удаление данных\n• Логи действий: не более 1 года\n\n\
<b>6. ПРАВА ПОЛЬЗОВАТЕЛЯ</b>\n\n\
✅ Получить информацию о хранимых данных: /gdpr\n\
✅ Потребовать удаления всех данных: /delete_my_data\n\
✅ Отозвать согласие в любой момент\n\n\
<b>7. СОГЛАСИЕ</b>\n\n\
Нажимая «✅ Принимаю», вы подтверждаете, что ознакомились с Соглашением и даёте согласие на обработку персональных данных.",
        bot = escape_html(bot_name)
    )
}

// ── Personal data ────────────────────────────────────────────────────────────

pub fn gdpr_overview(user: &User) -> String {
    format!(
        "🔒 <b>Управление персональными данными (ФЗ-152)</b>\n\n\
<b>Ваши данные:</b>\n\
• Telegram ID: {id}\n\
• Имя пользователя: @{username}\n\
• Имя: {name}\n\
• Роль: {role}\n\
• Дата регистрации: {created}\n\
• Согласие принято: {consent}\n\n\
<b>Какие данные мы храним:</b>\n\
• Информация о профиле (ID, имя, username)\n\
• История ваших вопросов и ответов\n\
• Статистика использования бота\n\
• Логи действий (для безопасности)\n\n\
<b>Ваши права:</b>\n\
✅ Просмотр собранных данных\n\
✅ Удаление всех данных\n\n\
⚠️ <b>Удаление данных</b>\n\
После удаления вы не сможете пользоваться ботом без повторной регистрации.\n\n\
Для удаления данных отправьте: /delete_my_data",
        id = user.id,
        username = escape_html(user.username.as_deref().unwrap_or("не указан")),
        name = escape_html(user.first_name.as_deref().unwrap_or("не указано")),
        role = user.role,
        created = display_timestamp(&user.created_at, true),
        consent = if user.gdpr_accepted { "✅ Да" } else { "❌ Нет" },
    )
}

pub const DELETE_CONFIRM: &str = "⚠️ <b>Подтверждение удаления данных</b>\n\n\
Вы уверены, что хотите удалить все свои данные?\n\n\
Будут удалены:\n\
• Ваш профиль\n\
• История вопросов и ответов\n\
• Вся статистика\n\n\
Это действие <b>необратимо</b>!";

pub const DATA_DELETED: &str = "✅ <b>Данные успешно удалены</b>\n\n\
Все ваши персональные данные были удалены из системы.\n\n\
Спасибо, что пользовались нашим ботом!\n\
Если захотите вернуться, отправьте /start";

pub const DELETE_CANCELLED: &str = "❌ Удаление данных отменено.\n\nВаши данные сохранены.";

// ── Help & menus ─────────────────────────────────────────────────────────────

pub const HELP: &str = "ℹ️ <b>Справка</b>\n\n\
Я отвечаю на вопросы по охране труда в дошкольных учреждениях: инструктажи, обучение, \
медосмотры, СИЗ, СОУТ, документация, несчастные случаи, пожарная безопасность и СанПиН.\n\n\
<b>Как задать вопрос:</b>\n\
• Просто напишите его в чат\n\
• Начните с <code>?</code>, чтобы спросить нейроассистента\n\n\
<b>Команды:</b>\n\
/ask — задать вопрос\n\
/ask_assistant — вопрос нейроассистенту\n\
/assistant_info — информация о нейроассистенте\n\
/reset_thread — начать новый диалог с нейроассистентом\n\
/stats — моя статистика\n\
/gdpr — мои персональные данные\n\
/delete_my_data — удалить мои данные\n\n\
Сначала я ищу ответ в базе знаний. Если он не подходит, его можно расширить через AI \
или оценить, и тогда вопрос уйдёт AI автоматически.\n\n\
⚠️ Не указывайте в вопросах телефоны, паспортные данные и другие персональные сведения.";

pub const ASK_PROMPT: &str = "❓ Задайте ваш вопрос по охране труда.\n\n\
Я постараюсь дать развернутый ответ со ссылками на законодательство РФ.";

pub const ASK_ASSISTANT_PROMPT: &str = "🤖 <b>Режим нейроассистента</b>\n\n\
Задайте ваш вопрос по охране труда. Я использую OpenAI Assistant API \
с доступом к базе знаний и специализированными инструкциями.\n\n\
Ваши вопросы и ответы сохраняются в отдельном потоке (thread), \
что позволяет мне помнить контекст предыдущих обращений.";

pub fn greeting(user: &User) -> String {
    format!(
        "👋 Здравствуйте, {}!\n\nЗадайте вопрос по охране труда, и я постараюсь помочь.",
        display_name(user)
    )
}

pub const UNKNOWN_COMMAND: &str = "🤔 Неизвестная команда. Список команд: /help";

pub fn settings(user: &User, assistant_enabled: bool) -> String {
    format!(
        "⚙️ <b>Настройки</b>\n\n\
         Роль: <b>{}</b>\n\
         Нейроассистент: {}\n\
         Диалог с нейроассистентом: {}\n\n\
         Управление данными: /gdpr\n\
         Сбросить диалог: /reset_thread",
        user.role,
        if assistant_enabled { "✅ доступен" } else { "❌ не настроен" },
        if user.assistant_thread_id.is_some() { "активен" } else { "не начат" },
    )
}

pub fn knowledge_overview(stats: &KbStatistics) -> String {
    if stats.total_questions == 0 {
        return "📚 База знаний пока пуста. Все вопросы обрабатывает AI.".to_string();
    }
    let mut out = format!(
        "📚 <b>База знаний</b>\n\nВсего вопросов: {}\n\n<b>Разделы:</b>\n",
        stats.total_questions
    );
    for (block, n) in &stats.blocks {
        out.push_str(&format!("  • {}: {n}\n", escape_html(block)));
    }
    out.push_str("\nПросто задайте вопрос, и я поищу ответ в этих разделах.");
    out
}

pub fn documents(docs: &[Document]) -> String {
    if docs.is_empty() {
        return "📄 Документы пока не добавлены.".to_string();
    }
    let mut out = String::from("📄 <b>Нормативные документы</b>\n\n");
    for d in docs {
        out.push_str(&format!("• <b>{}</b>", escape_html(&d.title)));
        if let Some(url) = &d.url {
            out.push_str(&format!("\n  {}", escape_html(url)));
        }
        out.push('\n');
    }
    out
}

// ── Questions ────────────────────────────────────────────────────────────────

pub const TOO_SHORT: &str = "❌ Вопрос слишком короткий. Пожалуйста, сформулируйте вопрос подробнее.";

pub const GENERIC_ERROR: &str = "❌ Произошла ошибка при обработке запроса. Попробуйте позже.";

pub const NO_CONTEXT: &str = "❌ Не удалось получить контекст вопроса. Попробуйте задать вопрос заново.";

pub const FOREIGN_BUTTON: &str = "❌ Эта кнопка относится к чужому вопросу.";

pub fn searching(mode: AskMode) -> &'static str {
    match mode {
        AskMode::Chat => "🔍 Ищу ответ в базе знаний...",
        AskMode::Assistant => "🔍 Ищу ответ в базе знаний и обращаюсь к нейроассистенту...",
    }
}

pub fn expanding(mode: AskMode) -> &'static str {
    match mode {
        AskMode::Chat => "🤖 Готовлю расширенный ответ от AI...",
        AskMode::Assistant => "🤖 Готовлю расширенный ответ от нейроассистента...",
    }
}

pub const EXPANDED_PREFIX: &str = "🤖 Расширенный ответ от AI:\n\n";

pub fn expanded_footer(mode: AskMode) -> &'static str {
    match mode {
        AskMode::Chat => "✅ <b>Использована база знаний + AI</b>",
        AskMode::Assistant => "✅ <b>Использована база знаний + нейроассистент</b>",
    }
}

pub const FAQ_THANKS: &str = "✅ Спасибо за оценку!";

pub fn faq_unhelpful_alert(mode: AskMode) -> &'static str {
    match mode {
        AskMode::Chat => "📝 Спасибо за обратную связь! Попробую найти более подходящий ответ.",
        AskMode::Assistant => "📝 Спасибо за обратную связь! Обращаюсь к нейроассистенту.",
    }
}

pub fn asking_ai_again(mode: AskMode) -> &'static str {
    match mode {
        AskMode::Chat => "🤖 Обращаюсь к AI для более точного ответа...",
        AskMode::Assistant => "🤖 Обращаюсь к нейроассистенту для более точного ответа...",
    }
}

pub fn answer_rating_alert(helpful: bool) -> &'static str {
    if helpful { "👍 Спасибо за обратную связь!" } else { "📝 Спасибо за обратную связь!" }
}

pub fn unhelpful_followup(mode: AskMode) -> &'static str {
    match mode {
        AskMode::Chat => {
            "Спасибо за обратную связь! Это поможет нам улучшить качество ответов.\n\n\
             Вы можете:\n\
             • Переформулировать вопрос для получения другого ответа\n\
             • Обратиться к администратору через /help"
        }
        AskMode::Assistant => {
            "Спасибо за обратную связь! Это поможет нам улучшить качество ответов нейроассистента.\n\n\
             Вы можете:\n\
             • Переформулировать вопрос для получения другого ответа\n\
             • Сбросить историю диалога через /reset_thread\n\
             • Обратиться к администратору через /help"
        }
    }
}

// ── Stats & assistant ────────────────────────────────────────────────────────

pub const NO_STATS: &str = "📊 У вас пока нет статистики.\n\n\
Задайте первый вопрос, чтобы начать собирать статистику!";

pub fn user_stats(user: &User, stats: &UserStats) -> String {
    let mut out = format!(
        "📊 <b>Ваша статистика</b>\n\n\
         👤 Пользователь: {}\n\
         🆔 ID: {}\n\
         📝 Роль: {}\n\n\
         ❓ Всего запросов: {}\n\
         ⏱ Среднее время ответа: {:.2} сек\n\
         📅 Зарегистрирован: {}\n\n",
        escape_html(user.first_name.as_deref().unwrap_or("Без имени")),
        user.id,
        user.role,
        stats.total_queries,
        stats.avg_response_time,
        display_timestamp(&user.created_at, false),
    );
    if !stats.categories.is_empty() {
        out.push_str("<b>Популярные категории:</b>\n");
        for (category, n) in &stats.categories {
            out.push_str(&format!("  • {}: {n}\n", escape_html(category)));
        }
        out.push('\n');
    }
    if !stats.recent_questions.is_empty() {
        out.push_str("<b>Последние вопросы:</b>\n");
        for (i, q) in stats.recent_questions.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, escape_html(q)));
        }
    }
    out
}

pub fn assistant_info(info: &AssistantInfo, thread_id: Option<&str>) -> String {
    format!(
        "🤖 <b>Информация о нейроассистенте</b>\n\n\
<b>ID:</b> <code>{id}</code>\n\
<b>Название:</b> {name}\n\
<b>Модель:</b> {model}\n\
<b>Инструменты:</b> {tools}\n\n\
<b>Ваш Thread ID:</b> <code>{thread}</code>\n\n\
<b>Как использовать:</b>\n\
• Начните вопрос с символа <code>?</code> (например: <code>? Какие инструктажи нужны в ДОУ?</code>)\n\
• Используйте команду /ask_assistant\n\
• История диалога сохраняется в вашем thread\n\
• Чтобы начать новый диалог: /reset_thread",
        id = escape_html(&info.id),
        name = escape_html(info.name.as_deref().unwrap_or("без названия")),
        model = escape_html(&info.model),
        tools = escape_html(&info.tools.join(", ")),
        thread = escape_html(thread_id.unwrap_or("Не создан")),
    )
}

pub const ASSISTANT_INFO_FAILED: &str = "❌ Не удалось получить информацию о нейроассистенте. \
Возможно, он еще не создан.";

pub const ASSISTANT_DISABLED: &str = "❌ Нейроассистент не настроен. Задайте вопрос в обычном режиме.";

pub const THREAD_RESET: &str = "✅ История диалога с нейроассистентом сброшена.\n\
Следующий вопрос начнет новый диалог.";

pub const NO_THREAD: &str = "ℹ️ У вас еще нет активного диалога с нейроассистентом.";

// ── Admin ────────────────────────────────────────────────────────────────────

pub const ADMIN_PANEL_DENIED: &str = "❌ У вас нет прав доступа к админ-панели.";
pub const ADMIN_ONLY: &str = "❌ Эта команда доступна только администраторам.";
pub const NO_ACCESS: &str = "❌ Нет доступа";

pub fn provider_unavailable(provider: &str) -> String {
    format!("❌ Провайдер {provider} не настроен")
}
pub const ADMIN_MENU: &str = "👤 <b>Панель администратора</b>\n\nВыберите раздел:";

pub fn admin_stats(total_users: i64, stats: &QueryStats, categories: &[(String, i64)]) -> String {
    let mut out = format!(
        "📊 <b>Статистика системы</b>\n\n\
         👥 Всего пользователей: {total_users}\n\
         ❓ Всего запросов: {}\n\
         ⏱ Среднее время ответа: {} сек\n\n",
        stats.total_queries, stats.avg_response_time
    );
    if !categories.is_empty() {
        out.push_str("<b>Популярные категории:</b>\n");
        for (category, n) in categories {
            out.push_str(&format!("  • {}: {n}\n", escape_html(category)));
        }
    }
    out
}

pub fn admin_users(by_role: &[(UserRole, usize)], total: usize) -> String {
    let mut out = String::from("👥 <b>Пользователи системы</b>\n\n");
    for (role, n) in by_role {
        out.push_str(&format!("<b>{role}:</b> {n} чел.\n"));
    }
    out.push_str(&format!("\n<b>Всего:</b> {total}"));
    out
}

pub fn admin_ai(current: &str, changed: bool) -> String {
    let tail = if changed { "✅ Провайдер успешно изменен!" } else { "Выберите провайдера:" };
    format!("🤖 <b>Настройки AI</b>\n\nТекущий провайдер: <b>{current}</b>\n\n{tail}")
}

pub fn provider_changed_alert(provider: &str) -> String {
    format!("✅ AI провайдер изменен на {provider}")
}

pub fn admin_knowledge(stats: &KbStatistics) -> String {
    let mut out = format!(
        "📚 <b>База знаний</b>\n\n\
         Всего вопросов: {}\n\
         Со ссылками на нормы: {}\n\
         Без ссылок: {}\n\n",
        stats.total_questions, stats.questions_with_urls, stats.questions_without_urls
    );
    if !stats.blocks.is_empty() {
        out.push_str("<b>Разделы:</b>\n");
        for (block, n) in &stats.blocks {
            out.push_str(&format!("  • {}: {n}\n", escape_html(block)));
        }
    }
    out
}

pub fn rate_limits(limiter: &RateLimiter) -> String {
    let mut out = String::from("⏱ <b>Настройки Rate Limits:</b>\n\n");
    for (kind, limit) in limiter.limits() {
        out.push_str(&format!(
            "<b>{}</b>\n├ Тип: <code>{}</code>\n├ Лимит: {} запросов\n└ Окно: {} мин ({} сек)\n\n",
            limit.display_name,
            kind,
            limit.max_requests,
            limit.window_seconds / 60,
            limit.window_seconds
        ));
    }
    out.push_str(&format!(
        "📊 <b>Статистика:</b>\n└ Активных пользователей: {}\n\n",
        limiter.tracked_users()
    ));
    out.push_str(
        "💡 <b>Команды:</b>\n\
         • <code>/clear_rate_limit USER_ID</code> - очистить лимиты пользователя\n\
         • <code>/user_rate_limit USER_ID</code> - статистика пользователя",
    );
    out
}

pub fn user_id_usage(command: &str) -> String {
    format!("❌ Укажите USER_ID:\n<code>/{command} USER_ID</code>")
}

pub const BAD_USER_ID: &str = "❌ Неверный формат USER_ID. Должно быть число.";

pub fn rate_limit_cleared(user_id: i64) -> String {
    format!("✅ Rate limits очищены для пользователя <code>{user_id}</code>")
}

pub fn no_rate_history(user_id: i64) -> String {
    format!("ℹ️ Пользователь <code>{user_id}</code> не имеет истории запросов.")
}

pub fn user_rate_limit(limiter: &RateLimiter, user_id: i64) -> String {
    let mut out = format!("📊 <b>Rate Limit статистика пользователя {user_id}:</b>\n\n");
    for kind in LimitKind::ALL {
        let used = limiter.used(user_id, kind);
        if used == 0 {
            continue;
        }
        let limit = kind.limit();
        out.push_str(&format!(
            "<b>{}</b>\n├ Использовано: {used}/{}\n└ Осталось: {}\n\n",
            limit.display_name,
            limit.max_requests,
            limiter.remaining(user_id, kind)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 42,
            username: Some("anna".into()),
            first_name: Some("Анна <b>".into()),
            last_name: None,
            role: UserRole::SpecialistOtDou,
            is_active: true,
            is_blocked: false,
            assistant_thread_id: None,
            gdpr_accepted: true,
            gdpr_accepted_at: None,
            total_requests: 3,
            last_request_at: None,
            created_at: "2025-10-17T09:30:00Z".into(),
            updated_at: "2025-10-17T09:30:00Z".into(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }

    #[test]
    fn welcome_back_escapes_name() {
        let t = welcome_back(&user());
        assert!(t.contains("Анна &lt;b&gt;"));
        assert!(t.contains("specialist_ot_dou"));
        assert!(t.contains("Всего запросов: 3"));
    }

    #[test]
    fn stats_text_lists_categories() {
        let stats = UserStats {
            total_queries: 2,
            avg_response_time: 1.234,
            categories: vec![("сиз".into(), 2)],
            recent_questions: vec!["Какие СИЗ положены?".into()],
        };
        let t = user_stats(&user(), &stats);
        assert!(t.contains("Среднее время ответа: 1.23 сек"));
        assert!(t.contains("• сиз: 2"));
        assert!(t.contains("1. Какие СИЗ положены?"));
    }

    #[test]
    fn user_rate_limit_skips_unused_kinds() {
        let limiter = RateLimiter::new();
        limiter.record(7, LimitKind::ExpandAnswer);
        let t = user_rate_limit(&limiter, 7);
        assert!(t.contains("расширенные ответы"));
        assert!(t.contains("Использовано: 1/3"));
        assert!(!t.contains("обычные вопросы"));
    }
}
