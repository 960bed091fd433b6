#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicI32, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use mydy_server::{
    AppState, CoreError, CoreResult, Db, build_router,
    ai::{AiGateway, ChatTurn},
    config::Config,
    database,
    models::CreateCategoryPayload,
    settings::DispatchConfig,
    telegram::{BotContext, transport::{ChatTransport, Keyboard}},
};
use serde_json::{Value, json};
use time::{Date, UtcOffset, macros::date};
use tower::util::ServiceExt;

pub const TEST_API_TOKEN: &str = "test-api-token-0123456789";

#[derive(Clone)]
pub struct TestConfig {
    pub temp_dir_path: String,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let temp_dir_path = temp_dir.path().to_string_lossy().to_string();
        std::mem::forget(temp_dir);
        Ok(Self { temp_dir_path })
    }

    pub fn data_path(&self) -> String {
        self.temp_dir_path.clone()
    }
}

pub async fn test_db() -> anyhow::Result<Db> {
    let test_config = TestConfig::new()?;
    database::init_db(&test_config.data_path())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub async fn setup_test_app() -> anyhow::Result<TestApp> {
    let test_config = TestConfig::new()?;
    let db = database::init_db(&test_config.data_path())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_path: test_config.data_path(),
        api_token: TEST_API_TOKEN.to_string(),
        app_url: None,
        deadline_check_interval_secs: 300,
    };

    let app_state = AppState {
        db,
        http: reqwest::Client::new(),
        config: Arc::new(config),
    };

    Ok(TestApp {
        router: build_router(app_state.clone()),
        state: app_state,
    })
}

/// Sends a request and returns the status and body. `token` adds the bearer
/// header.
pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> anyhow::Result<(StatusCode, String)> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = builder
        .body(body)
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;

    Ok((status, String::from_utf8(body.to_vec())?))
}

pub async fn create_category(db: &Db, name: &str) -> anyhow::Result<i64> {
    let category = mydy_server::categories::create(
        db,
        &CreateCategoryPayload {
            name: name.to_string(),
            color: None,
            icon: None,
        },
    )
    .await?;
    Ok(category.id)
}

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Html {
        chat_id: i64,
        text: String,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Answer(String),
    Typing(i64),
}

/// Records every outbound call. Message ids count up from 100.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_sends: AtomicBool,
    pub latest_chat: Option<i64>,
    next_message_id: AtomicI32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI32::new(100),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let transport = Self::new();
        transport.fail_sends.store(true, Ordering::SeqCst);
        transport
    }

    pub fn with_latest_chat(chat_id: i64) -> Self {
        Self {
            latest_chat: Some(chat_id),
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn html_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Html { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_edit(&self) -> Option<(i32, String, Option<Keyboard>)> {
        self.sent().into_iter().rev().find_map(|sent| match sent {
            Sent::Edit {
                message_id,
                text,
                keyboard,
                ..
            } => Some((message_id, text, keyboard)),
            _ => None,
        })
    }

    pub fn last_message(&self) -> Option<(String, Option<Keyboard>)> {
        self.sent().into_iter().rev().find_map(|sent| match sent {
            Sent::Message { text, keyboard, .. } => Some((text, keyboard)),
            _ => None,
        })
    }

    fn check(&self) -> CoreResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            Err(CoreError::Transport("mock transport down".to_string()))
        } else {
            Ok(())
        }
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> CoreResult<i32> {
        self.check()?;
        self.record(Sent::Message {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_html(&self, chat_id: i64, text: &str) -> CoreResult<()> {
        self.check()?;
        self.record(Sent::Html {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> CoreResult<()> {
        self.check()?;
        self.record(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> CoreResult<()> {
        self.record(Sent::Answer(callback_id.to_string()));
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> CoreResult<()> {
        self.record(Sent::Typing(chat_id));
        Ok(())
    }

    async fn latest_chat_id(&self) -> CoreResult<Option<i64>> {
        Ok(self.latest_chat)
    }
}

/// Returns a canned completion, or a transport error when `reply` is `None`.
pub struct MockAi {
    pub reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockAi {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AiGateway for MockAi {
    async fn complete(
        &self,
        _system: &str,
        messages: &[ChatTurn],
        _max_tokens: u32,
    ) -> CoreResult<String> {
        if let Some(last) = messages.last() {
            self.prompts.lock().unwrap().push(last.content.clone());
        }
        self.reply
            .clone()
            .ok_or_else(|| CoreError::Transport("provider unavailable".to_string()))
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> CoreResult<String> {
        let reply = self.complete(system, messages, max_tokens).await?;
        on_chunk(&reply);
        Ok(reply)
    }
}

// 2026-03-10 10:00 UTC
const UPDATE_DATE: i64 = 1_773_136_800;

fn private_chat(chat_id: i64) -> Value {
    json!({ "id": chat_id, "type": "private", "first_name": "Тест" })
}

fn user(id: i64, is_bot: bool) -> Value {
    json!({ "id": id, "is_bot": is_bot, "first_name": "Тест" })
}

/// A Bot API `message` update with the given body fields merged in.
pub fn message_update(update_id: i64, chat_id: i64, fields: Value) -> Value {
    let mut message = json!({
        "message_id": 1,
        "date": UPDATE_DATE,
        "chat": private_chat(chat_id),
        "from": user(chat_id, false),
    });
    if let (Some(message), Value::Object(fields)) = (message.as_object_mut(), fields) {
        message.extend(fields);
    }
    json!({ "update_id": update_id, "message": message })
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Value {
    message_update(update_id, chat_id, json!({ "text": text }))
}

/// A button press on a bot message carrying `data`.
pub fn callback_update(update_id: i64, chat_id: i64, message_id: i32, data: &str) -> Value {
    json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb-{update_id}"),
            "from": user(chat_id, false),
            "chat_instance": "instance-1",
            "data": data,
            "message": {
                "message_id": message_id,
                "date": UPDATE_DATE,
                "chat": private_chat(chat_id),
                "from": user(1, true),
                "text": "Проверьте транзакцию"
            }
        }
    })
}

pub fn today() -> Date {
    date!(2026 - 03 - 10)
}

pub fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        bot_token: Some("123:test".to_string()),
        currency_symbol: "$".to_string(),
        utc_offset: UtcOffset::UTC,
        web_app_url: Some("https://mydy.example.com/tma".to_string()),
    }
}

pub fn bot_context<'a>(
    db: &'a Db,
    transport: &'a MockTransport,
    ai: &'a MockAi,
    config: &'a DispatchConfig,
) -> BotContext<'a> {
    BotContext {
        db,
        transport,
        ai,
        config,
        today: today(),
    }
}
