use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use time::{Date, Duration};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ai::{AiGateway, ChatTurn, HttpAiGateway};
use crate::constants::*;
use crate::error::{CoreError, CoreResult};
use crate::{categories, ledger};
use crate::models::{CategoryTotal, DayTotals, LedgerEntry, TxKind};
use crate::{AppState, Db};
use crate::settings;
use crate::telegram::render::format_amount;
use crate::utils::{db_error_with_context, format_iso_date, local_today, validate_string_length};

#[derive(Deserialize)]
pub struct ChatPayload {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

pub fn system_prompt(today: Date, totals: &DayTotals, currency_symbol: &str) -> String {
    format!(
        "Ты личный ассистент в приложении MYDY: задачи, финансы и продуктивность. \
         Отвечай кратко и по делу, на языке пользователя.\n\n\
         Сегодня: {}\n\
         Расходы за сегодня: {} {currency_symbol}\n\
         Доходы за сегодня: {} {currency_symbol}",
        format_iso_date(today),
        format_amount(totals.expense),
        format_amount(totals.income),
    )
}

/// Keeps the last turns of well-formed history and appends the new message.
pub fn build_messages(history: Vec<ChatTurn>, message: &str) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = history
        .into_iter()
        .filter(|turn| {
            matches!(turn.role.as_str(), "user" | "assistant") && !turn.content.trim().is_empty()
        })
        .collect();
    if turns.len() > AI_CHAT_HISTORY_LIMIT {
        turns.drain(..turns.len() - AI_CHAT_HISTORY_LIMIT);
    }
    turns.push(ChatTurn::user(message.trim()));
    turns
}

/// Streams the reply as server-sent events: `{"chunk": ..}` per fragment,
/// `{"error": ..}` if the provider fails, then `[DONE]`.
pub async fn chat(
    State(app_state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    validate_string_length(&payload.message, "Message", MAX_CHAT_MESSAGE_LENGTH)?;

    let db = &app_state.db;
    let config = settings::load_ai_config(db)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;
    if config.api_key.is_none() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "AI API key is not configured".to_string(),
        ));
    }

    let offset = settings::load_utc_offset(db)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;
    let today = local_today(offset);
    let totals = ledger::totals_on(db, today)
        .await
        .map_err(|_| db_error_with_context("failed to load today's entries"))?;
    let symbol = settings::get_or(db, SETTING_CURRENCY_SYMBOL, DEFAULT_CURRENCY_SYMBOL)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;

    let system = system_prompt(today, &totals, &symbol);
    let messages = build_messages(payload.history, &payload.message);
    let gateway = HttpAiGateway::new(app_state.http.clone(), config);

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    tokio::spawn(async move {
        let chunks = tx.clone();
        let mut on_chunk = move |text: &str| {
            let _ = chunks.send(Event::default().data(json!({ "chunk": text }).to_string()));
        };

        if let Err(err) = gateway
            .stream(&system, &messages, AI_CHAT_MAX_TOKENS, &mut on_chunk)
            .await
        {
            tracing::warn!(error = %err, "AI chat stream failed");
            let _ = tx.send(Event::default().data(json!({ "error": err.to_string() }).to_string()));
        }
        let _ = tx.send(Event::default().data("[DONE]"));
    });

    let events = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub const FEEDBACK_EMPTY_TEXT: &str =
    "Сегодня расходов ещё нет. Начните добавлять расходы, чтобы получить анализ.";
const FEEDBACK_SYSTEM_PROMPT: &str =
    "Ты финансовый аналитик. Отвечай на русском языке, кратко и структурированно.";

pub fn feedback_prompt(
    today: Date,
    currency_symbol: &str,
    expenses: &[LedgerEntry],
    totals: &DayTotals,
    yesterday_expense: f64,
    by_category: &[CategoryTotal],
) -> String {
    let mut prompt = format!("Расходы за {} ({currency_symbol}):\n", format_iso_date(today));
    for entry in expenses {
        prompt.push_str(&format!(
            "- {} {currency_symbol}: {} [{}]\n",
            format_amount(entry.amount),
            entry.description.as_deref().unwrap_or_default(),
            entry.category_name.as_deref().unwrap_or(UNCATEGORIZED_LABEL),
        ));
    }

    prompt.push_str(&format!(
        "Итого: {} {currency_symbol} | Доходы: {} {currency_symbol}",
        format_amount(totals.expense),
        format_amount(totals.income),
    ));
    if yesterday_expense > 0.0 {
        prompt.push_str(&format!(
            " | Вчера расходы: {} {currency_symbol}",
            format_amount(yesterday_expense)
        ));
    }

    let groups: Vec<String> = by_category
        .iter()
        .map(|group| format!("{} {}", group.name, format_amount(group.total)))
        .collect();
    prompt.push_str(&format!("\nПо категориям: {}\n\n", groups.join(", ")));
    prompt.push_str("Дай краткий анализ (4-6 пунктов).");
    prompt
}

/// Short AI analysis of today's spending. A day without expenses gets a
/// fixed reply and never reaches the provider.
pub async fn daily_feedback(db: &Db, gateway: &dyn AiGateway, today: Date) -> CoreResult<String> {
    let entries = ledger::entries_on(db, today).await?;
    let expenses: Vec<LedgerEntry> = entries
        .iter()
        .filter(|entry| entry.kind == TxKind::Expense)
        .cloned()
        .collect();
    if expenses.is_empty() {
        return Ok(FEEDBACK_EMPTY_TEXT.to_string());
    }

    let yesterday = today.checked_sub(Duration::days(1)).unwrap_or(today);
    let yesterday_expense = ledger::totals_on(db, yesterday).await?.expense;
    let known = categories::list(db).await?;
    let symbol = settings::get_or(db, SETTING_CURRENCY_SYMBOL, DEFAULT_CURRENCY_SYMBOL).await?;

    let prompt = feedback_prompt(
        today,
        &symbol,
        &expenses,
        &ledger::totals(&entries),
        yesterday_expense,
        &ledger::expenses_by_category(&expenses, &known),
    );
    gateway
        .complete(
            FEEDBACK_SYSTEM_PROMPT,
            &[ChatTurn::user(prompt)],
            AI_FEEDBACK_MAX_TOKENS,
        )
        .await
}

pub async fn ai_feedback(
    State(app_state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let db = &app_state.db;
    let config = settings::load_ai_config(db)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;
    let offset = settings::load_utc_offset(db)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;
    let gateway = HttpAiGateway::new(app_state.http.clone(), config);

    match daily_feedback(db, &gateway, local_today(offset)).await {
        Ok(analysis) => Ok(Json(json!({ "analysis": analysis }))),
        Err(CoreError::ConfigMissing(_)) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "AI API key is not configured".to_string(),
        )),
        Err(CoreError::Transport(message)) => {
            tracing::warn!(error = %message, "AI feedback failed");
            Err((StatusCode::BAD_GATEWAY, message))
        }
        Err(err) => {
            tracing::error!(error = %err, "AI feedback failed");
            Err(db_error_with_context("failed to build feedback"))
        }
    }
}
