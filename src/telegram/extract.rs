use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use time::Date;

use crate::models::TxKind;
use crate::telegram::parse::{parse_amount, parse_kind};
use crate::utils::format_iso_date;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "Ты парсер финансовых записей. Из текста извлеки данные и верни ТОЛЬКО валидный JSON без пояснений.";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:json)?\s*|\s*```").unwrap());

/// Transaction fields pulled out of free text by the AI gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct AiTransaction {
    pub kind: TxKind,
    pub amount: f64,
    pub description: String,
    pub category: String,
    /// Raw date as returned by the model; `None` when it gave none.
    pub date: Option<String>,
}

pub fn extraction_prompt(text: &str, category_names: &str, currency_symbol: &str, today: Date) -> String {
    format!(
        "Сегодня: {today}\n\
         Доступные категории: {category_names}\n\
         Валюта: {currency_symbol}\n\n\
         Текст пользователя: \"{text}\"\n\n\
         Верни JSON строго в формате:\n\
         {{\n  \
           \"type\": \"expense\" или \"income\",\n  \
           \"amount\": число (без символов валюты),\n  \
           \"description\": \"краткое описание на русском\",\n  \
           \"category\": \"одна категория из списка выше\",\n  \
           \"date\": \"YYYY-MM-DD или null если дата не указана\"\n\
         }}",
        today = format_iso_date(today),
    )
}

/// Pulls the first JSON object out of a model reply. Returns `None` unless
/// the object carries a usable positive amount.
pub fn parse_ai_reply(reply: &str) -> Option<AiTransaction> {
    let cleaned = CODE_FENCE.replace_all(reply, "");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&cleaned[start..=end]).ok()?;

    let amount = match value.get("amount")? {
        Value::Number(number) => number.as_f64().filter(|amount| *amount > 0.0)?,
        Value::String(text) => parse_amount(text)?,
        _ => return None,
    };

    let text_field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let kind = parse_kind(&text_field("type"));
    let date = Some(text_field("date")).filter(|date| !date.is_empty() && date != "null");

    Some(AiTransaction {
        kind,
        amount,
        description: text_field("description"),
        category: text_field("category"),
        date,
    })
}
