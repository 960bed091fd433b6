use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, CallbackQueryId, ChatAction, InlineKeyboardButton, InlineKeyboardMarkup,
    MessageId, ParseMode, WebAppInfo,
};

use crate::constants::UPDATES_LOOKBACK_LIMIT;
use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Keyboard layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    WebApp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(label: &str, data: &str) -> Self {
        Self {
            label: label.to_string(),
            action: ButtonAction::Callback(data.to_string()),
        }
    }

    pub fn web_app(label: &str, url: &str) -> Self {
        Self {
            label: label.to_string(),
            action: ButtonAction::WebApp(url.to_string()),
        }
    }
}

/// Inline keyboard as rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|button| match &button.action {
                ButtonAction::Callback(data) => Some(data.as_str()),
                ButtonAction::WebApp(_) => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends plain text and returns the new message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> CoreResult<i32>;

    async fn send_html(&self, chat_id: i64, text: &str) -> CoreResult<()>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> CoreResult<()>;

    async fn answer_callback(&self, callback_id: &str) -> CoreResult<()>;

    async fn send_typing(&self, chat_id: i64) -> CoreResult<()>;

    /// Chat of the most recent pending update, if any.
    async fn latest_chat_id(&self) -> CoreResult<Option<i64>>;
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str, http: reqwest::Client) -> Self {
        Self {
            bot: Bot::with_client(token, http),
        }
    }
}

fn markup(keyboard: &Keyboard) -> CoreResult<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(keyboard.rows.len());
    for row in &keyboard.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            buttons.push(match &button.action {
                ButtonAction::Callback(data) => {
                    InlineKeyboardButton::callback(button.label.clone(), data.clone())
                }
                ButtonAction::WebApp(url) => {
                    let url = Url::parse(url).map_err(|err| {
                        CoreError::Validation(format!("invalid web app url '{url}': {err}"))
                    })?;
                    InlineKeyboardButton::web_app(button.label.clone(), WebAppInfo { url })
                }
            });
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> CoreResult<i32> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard)?);
        }
        let message = request.await.map_err(CoreError::transport)?;
        Ok(message.id.0)
    }

    async fn send_html(&self, chat_id: i64, text: &str) -> CoreResult<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(CoreError::transport)?;
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> CoreResult<()> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard)?);
        }
        request.await.map_err(CoreError::transport)?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> CoreResult<()> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await
            .map_err(CoreError::transport)?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> CoreResult<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(CoreError::transport)?;
        Ok(())
    }

    async fn latest_chat_id(&self) -> CoreResult<Option<i64>> {
        let updates = self
            .bot
            .get_updates()
            .limit(UPDATES_LOOKBACK_LIMIT)
            .timeout(0)
            .await
            .map_err(CoreError::transport)?;

        Ok(updates
            .iter()
            .rev()
            .find_map(|update| update.chat().map(|chat| chat.id.0)))
    }
}

// ---------------------------------------------------------------------------
// Webhook registration
// ---------------------------------------------------------------------------

/// Checks the token with `getMe`, then points the bot's webhook at
/// `webhook_url`. Returns the bot username. Errors carry a user-facing
/// message.
pub async fn register_webhook(
    token: &str,
    webhook_url: &str,
    http: reqwest::Client,
) -> CoreResult<String> {
    let url = Url::parse(webhook_url)
        .map_err(|err| CoreError::Validation(format!("Некорректный адрес webhook: {err}")))?;
    let bot = Bot::with_client(token, http);

    let me = bot.get_me().await.map_err(|err| {
        tracing::warn!(error = %err, "Telegram getMe failed");
        CoreError::Validation("Неверный токен бота. Проверьте токен от @BotFather.".to_string())
    })?;

    bot.set_webhook(url)
        .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
        .await
        .map_err(|err| {
            CoreError::Validation(format!("Не удалось зарегистрировать webhook: {err}"))
        })?;

    Ok(me.username().to_string())
}
