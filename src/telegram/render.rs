//! Pure text and keyboard builders for the bot. Every card is derived from
//! the draft alone, so re-rendering after an edit replaces the same message.

use time::{Date, Month};

use crate::constants::UNCATEGORIZED_LABEL;
use crate::models::{DayTotals, LedgerEntry, TxKind};
use crate::telegram::draft::{EditField, TransactionDraft};
use crate::telegram::transport::{Button, Keyboard};

pub const EXPIRED_TEXT: &str = "❌ Действие устарело. Отправьте запись заново.";
pub const CANCELLED_TEXT: &str = "❌ Отменено.";
pub const NOTHING_TODAY_TEXT: &str = "📊 Сегодня записей нет.";
pub const ADD_FORMAT_HINT: &str = "❌ Формат: /add 25.50 Описание";
pub const PARSE_FAILED_HINT: &str =
    "⚠️ Не удалось распознать запись.\n\nПопробуйте команду:\n/add 60000 Описание";
pub const NOT_UNDERSTOOD_HINT: &str =
    "🤔 Не понял. Опишите иначе или используйте:\n/add 60000 Описание";
pub const NO_WEB_APP_TEXT: &str = "⚠️ Не задан URL веб-приложения.";
pub const WEB_APP_BUTTON_LABEL: &str = "Открыть Web App";

const COMMANDS_TEXT: &str = "/add [сумма] [описание] — добавить расход\n\
                             /today — записи за сегодня\n\
                             /help — список команд";

/// Inline button actions. The string forms are what Telegram echoes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Confirm,
    Cancel,
    Edit,
    EditField(EditField),
    EditCancel,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "tx_confirm" => Some(CallbackAction::Confirm),
            "tx_cancel" => Some(CallbackAction::Cancel),
            "tx_edit" => Some(CallbackAction::Edit),
            "edit_cancel" => Some(CallbackAction::EditCancel),
            _ => data
                .strip_prefix("edit_")
                .and_then(EditField::from_name)
                .map(CallbackAction::EditField),
        }
    }

    pub fn data(&self) -> String {
        match self {
            CallbackAction::Confirm => "tx_confirm".to_string(),
            CallbackAction::Cancel => "tx_cancel".to_string(),
            CallbackAction::Edit => "tx_edit".to_string(),
            CallbackAction::EditCancel => "edit_cancel".to_string(),
            CallbackAction::EditField(field) => format!("edit_{}", field.name()),
        }
    }
}

fn button(label: &str, action: CallbackAction) -> Button {
    Button::callback(label, &action.data())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

/// Rounds to whole units and groups thousands with spaces: `2 000 000`.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }
    if rounded < 0.0 {
        grouped.insert(0, '-');
    }
    grouped
}

fn month_abbreviation(month: Month) -> &'static str {
    match month {
        Month::January => "янв",
        Month::February => "фев",
        Month::March => "мар",
        Month::April => "апр",
        Month::May => "мая",
        Month::June => "июн",
        Month::July => "июл",
        Month::August => "авг",
        Month::September => "сен",
        Month::October => "окт",
        Month::November => "ноя",
        Month::December => "дек",
    }
}

pub fn format_date_label(date: Date, today: Date) -> String {
    if date == today {
        return "Сегодня".to_string();
    }
    if today.previous_day() == Some(date) {
        return "Вчера".to_string();
    }
    format!(
        "{} {} {}",
        date.day(),
        month_abbreviation(date.month()),
        date.year()
    )
}

fn summary_text(draft: &TransactionDraft, currency_symbol: &str, today: Date) -> String {
    let kind = match draft.kind {
        TxKind::Income => "📈 Доход",
        TxKind::Expense => "📉 Расход",
    };
    format!(
        "🤖 Добавить запись?\n\n{kind}\n💰 {} {currency_symbol}\n📅 {}\n📁 {}\n📝 {}",
        format_amount(draft.amount),
        format_date_label(draft.date, today),
        draft.category,
        draft.description,
    )
}

pub fn confirm_keyboard() -> Keyboard {
    Keyboard::new().row(vec![
        button("✅ Добавить", CallbackAction::Confirm),
        button("✏️ Изменить", CallbackAction::Edit),
        button("❌ Отмена", CallbackAction::Cancel),
    ])
}

pub fn confirmation_card(draft: &TransactionDraft, currency_symbol: &str, today: Date) -> Card {
    Card {
        text: summary_text(draft, currency_symbol, today),
        keyboard: Some(confirm_keyboard()),
    }
}

pub fn edit_menu(draft: &TransactionDraft, currency_symbol: &str, today: Date) -> Card {
    let pick = |label: &str, field: EditField| button(label, CallbackAction::EditField(field));
    let keyboard = Keyboard::new()
        .row(vec![
            pick("↕️ Тип", EditField::Type),
            pick("💰 Сумма", EditField::Amount),
        ])
        .row(vec![
            pick("📅 Дата", EditField::Date),
            pick("📁 Категория", EditField::Category),
        ])
        .row(vec![
            pick("📝 Описание", EditField::Desc),
            button("← Назад", CallbackAction::EditCancel),
        ]);

    Card {
        text: format!(
            "{}\n\n✏️ Что изменить?",
            summary_text(draft, currency_symbol, today)
        ),
        keyboard: Some(keyboard),
    }
}

/// Prompt shown while waiting for a typed value. `category_names` is only
/// used for the category field.
pub fn edit_prompt(field: EditField, category_names: &str) -> Card {
    let text = match field {
        EditField::Amount => "💰 Введите новую сумму:\n(например: 60000, 60к, 2млн)".to_string(),
        EditField::Type => "↕️ Введите тип:\nрасход или доход".to_string(),
        EditField::Date => "📅 Введите дату:\nсегодня / вчера / 23 / 23.02 / 23.02.2026".to_string(),
        EditField::Category => format!("📁 Введите категорию:\n{category_names}"),
        EditField::Desc => "📝 Введите новое описание:".to_string(),
    };
    Card {
        text,
        keyboard: Some(Keyboard::new().row(vec![button("← Отмена", CallbackAction::EditCancel)])),
    }
}

pub fn saved_text(draft: &TransactionDraft, currency_symbol: &str, today: Date) -> String {
    let icon = match draft.kind {
        TxKind::Income => "💚",
        TxKind::Expense => "💸",
    };
    format!(
        "{icon} Сохранено!\n\n{} {currency_symbol} — {}\n📁 {}\n📅 {}",
        format_amount(draft.amount),
        draft.description,
        draft.category,
        format_date_label(draft.date, today),
    )
}

pub fn today_summary(entries: &[LedgerEntry], totals: &DayTotals, currency_symbol: &str) -> String {
    if entries.is_empty() {
        return NOTHING_TODAY_TEXT.to_string();
    }

    let lines = entries
        .iter()
        .map(|entry| {
            let icon = match entry.kind {
                TxKind::Income => "📈",
                TxKind::Expense => "📉",
            };
            format!(
                "{icon} {} {currency_symbol} — {} [{}]",
                format_amount(entry.amount),
                entry.description.as_deref().unwrap_or_default(),
                entry.category_name.as_deref().unwrap_or(UNCATEGORIZED_LABEL),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "📊 За сегодня:\n{lines}\n\n📉 Расходы: {} {currency_symbol}\n📈 Доходы:  {} {currency_symbol}",
        format_amount(totals.expense),
        format_amount(totals.income),
    )
}

pub fn help_text() -> String {
    format!(
        "🤖 Команды:\n\n{COMMANDS_TEXT}\n\n💡 Или просто пишите:\n\
         «купил еду на 60к сумов»\n\
         «получил зарплату 2 млн»\n\
         «вчера потратил 15000 на транспорт»"
    )
}

pub fn welcome_card(web_app_url: &str) -> Card {
    Card {
        text: format!(
            "🚀 Добро пожаловать в MYDY!\n\nКоманды:\n{COMMANDS_TEXT}\n\n💡 Или просто пишите:\n«купил еду на 60к сумов»"
        ),
        keyboard: Some(
            Keyboard::new().row(vec![Button::web_app(WEB_APP_BUTTON_LABEL, web_app_url)]),
        ),
    }
}
