use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use teloxide::types::Update;
use time::Date;

use crate::ai::{AiGateway, ChatTurn, HttpAiGateway};
use crate::categories;
use crate::constants::*;
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::models::{Category, EntrySource, NewLedgerEntry, TxKind};
use crate::notification_target;
use crate::settings::{self, DispatchConfig};
use crate::telegram::draft::{DraftFields, DraftStore, EditField, EditOutcome};
use crate::telegram::extract::{
    AiTransaction, EXTRACTION_SYSTEM_PROMPT, extraction_prompt, parse_ai_reply,
};
use crate::telegram::inbound::InboundEvent;
use crate::telegram::parse::{parse_amount, parse_date};
use crate::telegram::render::{self, CallbackAction, Card};
use crate::telegram::transport::{ChatTransport, TelegramTransport, register_webhook};
use crate::utils::{db_error_with_context, local_today, validate_string_length};
use crate::{AppState, Db};

/// Everything one inbound update is handled with.
pub struct BotContext<'a> {
    pub db: &'a Db,
    pub transport: &'a dyn ChatTransport,
    pub ai: &'a dyn AiGateway,
    pub config: &'a DispatchConfig,
    pub today: Date,
}

impl BotContext<'_> {
    async fn say(&self, chat_id: i64, text: &str) {
        if let Err(err) = self.transport.send_message(chat_id, text, None).await {
            tracing::warn!(chat_id, error = %err, "Telegram sendMessage failed");
        }
    }

    async fn show(&self, chat_id: i64, message_id: i32, card: &Card) {
        if let Err(err) = self
            .transport
            .edit_message(chat_id, message_id, &card.text, card.keyboard.as_ref())
            .await
        {
            tracing::warn!(chat_id, message_id, error = %err, "Telegram editMessageText failed");
        }
    }

    async fn show_text(&self, chat_id: i64, message_id: i32, text: &str) {
        self.show(
            chat_id,
            message_id,
            &Card {
                text: text.to_string(),
                keyboard: None,
            },
        )
        .await;
    }

    fn symbol(&self) -> &str {
        &self.config.currency_symbol
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command<'a> {
    Start,
    Add(&'a str),
    Today,
    Help,
}

impl<'a> Command<'a> {
    /// Recognises `/cmd` and `/cmd@botname`, with arguments after whitespace.
    fn parse(text: &'a str) -> Option<Self> {
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        match name {
            "/start" => Some(Command::Start),
            "/add" => Some(Command::Add(rest)),
            "/today" => Some(Command::Today),
            "/help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// Single entry point for inbound updates.
pub async fn handle_event(ctx: &BotContext<'_>, event: InboundEvent) -> CoreResult<()> {
    notification_target::record(ctx.db, event.chat_id()).await?;

    match event {
        InboundEvent::Message { chat_id, text } => handle_message(ctx, chat_id, &text).await,
        InboundEvent::Callback {
            chat_id,
            message_id,
            data,
            callback_id,
        } => handle_callback(ctx, chat_id, message_id, &data, &callback_id).await,
    }
}

async fn handle_message(ctx: &BotContext<'_>, chat_id: i64, text: &str) -> CoreResult<()> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let store = DraftStore::new(ctx.db);
    if let Some(draft) = store.load(chat_id).await?
        && draft.editing_field.is_some()
    {
        return handle_edit_response(ctx, &store, chat_id, text).await;
    }

    match Command::parse(text) {
        Some(Command::Start) => handle_start(ctx, chat_id).await,
        Some(Command::Add(args)) => handle_add(ctx, chat_id, args).await,
        Some(Command::Today) => handle_today(ctx, chat_id).await,
        Some(Command::Help) => {
            ctx.say(chat_id, &render::help_text()).await;
            Ok(())
        }
        None => handle_smart_add(ctx, &store, chat_id, text).await,
    }
}

async fn handle_edit_response(
    ctx: &BotContext<'_>,
    store: &DraftStore<'_>,
    chat_id: i64,
    text: &str,
) -> CoreResult<()> {
    match store.apply_edit_value(chat_id, text, ctx.today).await? {
        EditOutcome::Applied(draft) => {
            if let Some(message_id) = draft.outbound_message_id {
                let card = render::confirmation_card(&draft, ctx.symbol(), ctx.today);
                ctx.show(chat_id, message_id, &card).await;
            }
        }
        EditOutcome::Rejected { hint, .. } => ctx.say(chat_id, hint).await,
        EditOutcome::NoDraft | EditOutcome::NotEditing(_) => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn handle_start(ctx: &BotContext<'_>, chat_id: i64) -> CoreResult<()> {
    let Some(url) = ctx.config.web_app_url.as_deref() else {
        ctx.say(chat_id, render::NO_WEB_APP_TEXT).await;
        return Ok(());
    };

    let card = render::welcome_card(url);
    if let Err(err) = ctx
        .transport
        .send_message(chat_id, &card.text, card.keyboard.as_ref())
        .await
    {
        tracing::warn!(chat_id, error = %err, "Failed to send welcome message");
    }
    Ok(())
}

async fn handle_add(ctx: &BotContext<'_>, chat_id: i64, args: &str) -> CoreResult<()> {
    let parsed = args
        .split_once(char::is_whitespace)
        .and_then(|(amount, description)| {
            let description = description.trim();
            let amount = parse_amount(amount)?;
            (!description.is_empty()).then_some((amount, description))
        });
    let Some((amount, description)) = parsed else {
        ctx.say(chat_id, render::ADD_FORMAT_HINT).await;
        return Ok(());
    };

    let entry = NewLedgerEntry {
        amount,
        description: description.to_string(),
        category_id: None,
        date: ctx.today,
        source: EntrySource::Telegram,
        kind: TxKind::Expense,
    };

    match ledger::create_entry(ctx.db, entry).await {
        Ok(entry) => {
            let text = format!(
                "✅ Добавлено: {}{} — {}",
                ctx.symbol(),
                entry.amount,
                entry.description.unwrap_or_default()
            );
            ctx.say(chat_id, &text).await;
            Ok(())
        }
        Err(CoreError::Validation(message)) => {
            ctx.say(chat_id, &format!("❌ {message}")).await;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn handle_today(ctx: &BotContext<'_>, chat_id: i64) -> CoreResult<()> {
    let entries = ledger::entries_on(ctx.db, ctx.today).await?;
    let totals = ledger::totals(&entries);
    ctx.say(chat_id, &render::today_summary(&entries, &totals, ctx.symbol()))
        .await;
    Ok(())
}

/// Free text goes to the AI gateway for extraction. Gateway failures turn
/// into a hint; nothing is stored unless the reply is usable.
async fn handle_smart_add(
    ctx: &BotContext<'_>,
    store: &DraftStore<'_>,
    chat_id: i64,
    text: &str,
) -> CoreResult<()> {
    if let Err(err) = ctx.transport.send_typing(chat_id).await {
        tracing::debug!(chat_id, error = %err, "sendChatAction failed");
    }

    let known = categories::list(ctx.db).await?;
    let parsed = match extract_transaction(ctx, chat_id, text, &known).await {
        Ok(parsed) => parsed,
        Err(CoreError::ParseFailure(hint)) => {
            ctx.say(chat_id, &hint).await;
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let category = categories::resolve(&known, &parsed.category);
    let fields = DraftFields {
        kind: parsed.kind,
        amount: parsed.amount,
        description: parsed.description,
        category: category
            .map(|category| category.name.clone())
            .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string()),
        category_id: category.map(|category| category.id),
        date: parsed
            .date
            .as_deref()
            .map(|date| parse_date(date, ctx.today))
            .unwrap_or(ctx.today),
    };

    let draft = store.start(chat_id, fields).await?;
    let card = render::confirmation_card(&draft, ctx.symbol(), ctx.today);
    match ctx
        .transport
        .send_message(chat_id, &card.text, card.keyboard.as_ref())
        .await
    {
        Ok(message_id) => {
            if !store.bind_message(chat_id, draft.id, message_id).await? {
                tracing::info!(chat_id, "Draft replaced before its card was bound");
            }
        }
        Err(err) => tracing::warn!(chat_id, error = %err, "Failed to send confirmation card"),
    }
    Ok(())
}

/// Gateway errors and unusable replies both become `ParseFailure` carrying
/// the hint for the user.
async fn extract_transaction(
    ctx: &BotContext<'_>,
    chat_id: i64,
    text: &str,
    known: &[Category],
) -> CoreResult<AiTransaction> {
    let prompt = extraction_prompt(text, &categories::names(known), ctx.symbol(), ctx.today);

    let reply = ctx
        .ai
        .complete(EXTRACTION_SYSTEM_PROMPT, &[ChatTurn::user(prompt)], AI_PARSE_MAX_TOKENS)
        .await
        .map_err(|err| {
            tracing::error!(chat_id, error = %err, "Telegram smart parse failed");
            CoreError::ParseFailure(render::PARSE_FAILED_HINT.to_string())
        })?;

    parse_ai_reply(&reply).ok_or_else(|| {
        tracing::info!(chat_id, "AI reply had no usable transaction");
        CoreError::ParseFailure(render::NOT_UNDERSTOOD_HINT.to_string())
    })
}

// ---------------------------------------------------------------------------
// Inline keyboard callbacks
// ---------------------------------------------------------------------------

async fn handle_callback(
    ctx: &BotContext<'_>,
    chat_id: i64,
    message_id: i32,
    data: &str,
    callback_id: &str,
) -> CoreResult<()> {
    tracing::info!(chat_id, data, "Telegram callback");

    if let Err(err) = ctx.transport.answer_callback(callback_id).await {
        tracing::warn!(chat_id, error = %err, "Telegram answerCallbackQuery failed");
    }

    let store = DraftStore::new(ctx.db);
    let Some(draft) = store.load(chat_id).await? else {
        ctx.show_text(chat_id, message_id, render::EXPIRED_TEXT).await;
        return Ok(());
    };

    let Some(action) = CallbackAction::parse(data) else {
        tracing::debug!(chat_id, data, "Ignoring unknown callback");
        return Ok(());
    };

    match action {
        CallbackAction::Confirm => match store.confirm(chat_id).await {
            Ok(confirmed) => {
                let text = render::saved_text(&confirmed.draft, ctx.symbol(), ctx.today);
                ctx.show_text(chat_id, message_id, &text).await;
            }
            Err(CoreError::NoDraft(_)) => {
                ctx.show_text(chat_id, message_id, render::EXPIRED_TEXT).await;
            }
            Err(CoreError::Validation(message)) => {
                tracing::warn!(chat_id, error = %message, "Ledger refused draft");
                ctx.say(chat_id, &format!("⚠️ Не удалось сохранить: {message}"))
                    .await;
            }
            Err(err) => return Err(err),
        },
        CallbackAction::Cancel => {
            store.cancel(chat_id).await?;
            ctx.show_text(chat_id, message_id, render::CANCELLED_TEXT).await;
        }
        CallbackAction::Edit => {
            let card = render::edit_menu(&draft, ctx.symbol(), ctx.today);
            ctx.show(chat_id, message_id, &card).await;
        }
        CallbackAction::EditField(field) => {
            if store.begin_edit(chat_id, field, message_id).await?.is_some() {
                let names = match field {
                    EditField::Category => categories::names(&categories::list(ctx.db).await?),
                    _ => String::new(),
                };
                ctx.show(chat_id, message_id, &render::edit_prompt(field, &names))
                    .await;
            }
        }
        CallbackAction::EditCancel => {
            if let Some(draft) = store.end_edit(chat_id).await? {
                let card = render::confirmation_card(&draft, ctx.symbol(), ctx.today);
                ctx.show(chat_id, message_id, &card).await;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

/// Bot API webhook. Always answers `{"ok": true}` so Telegram never retries.
pub async fn webhook(State(app_state): State<AppState>, body: Bytes) -> Json<Value> {
    let accepted = Json(json!({ "ok": true }));

    let update = match serde_json::from_slice::<Update>(&body) {
        Ok(update) => update,
        Err(err) => {
            tracing::debug!(error = %err, "Ignoring malformed webhook payload");
            return accepted;
        }
    };
    let Some(event) = InboundEvent::from_update(&update) else {
        return accepted;
    };

    if let Err(err) = dispatch(&app_state, event).await {
        tracing::error!(error = %err, "Telegram update handling failed");
    }
    accepted
}

async fn dispatch(app_state: &AppState, event: InboundEvent) -> CoreResult<()> {
    let db = &app_state.db;
    let config = settings::load_dispatch_config(db, app_state.config.app_url.as_deref()).await?;

    let Some(token) = config.bot_token.as_deref() else {
        notification_target::record(db, event.chat_id()).await?;
        tracing::info!("Telegram bot token not set, skipping update");
        return Ok(());
    };

    let transport = TelegramTransport::new(token, app_state.http.clone());
    let ai = HttpAiGateway::new(app_state.http.clone(), settings::load_ai_config(db).await?);
    let ctx = BotContext {
        db,
        transport: &transport,
        ai: &ai,
        config: &config,
        today: local_today(config.utc_offset),
    };
    handle_event(&ctx, event).await
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub token: String,
}

pub fn webhook_url(app_url: &str) -> String {
    let base = app_url.trim_end_matches('/');
    let base = match base.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => base.to_string(),
    };
    format!("{base}/api/telegram/webhook")
}

pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<Value>, (StatusCode, String)> {
    validate_string_length(&payload.token, "Bot token", MAX_API_KEY_LENGTH)?;
    let token = payload.token.trim();

    let Some(app_url) = app_state.config.app_url.as_deref() else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "APP_URL is not configured".to_string(),
        ));
    };

    let bot_name = register_webhook(token, &webhook_url(app_url), app_state.http.clone())
        .await
        .map_err(|err| match err {
            CoreError::Validation(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            other => (StatusCode::UNPROCESSABLE_ENTITY, other.to_string()),
        })?;

    settings::set(&app_state.db, SETTING_TELEGRAM_BOT_TOKEN, Some(token))
        .await
        .map_err(|_| db_error_with_context("failed to save bot token"))?;

    tracing::info!(bot = %bot_name, "Telegram webhook registered");
    Ok(Json(json!({
        "ok": true,
        "message": format!("Telegram бот @{bot_name} подключён"),
    })))
}
