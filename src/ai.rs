use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::constants::*;
use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Anthropic,
    OpenAi,
    Groq,
}

impl AiProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(AiProvider::Anthropic),
            "openai" => Some(AiProvider::OpenAi),
            "groq" => Some(AiProvider::Groq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::Anthropic => "anthropic",
            AiProvider::OpenAi => "openai",
            AiProvider::Groq => "groq",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::Anthropic => DEFAULT_AI_MODEL,
            AiProvider::OpenAi => "gpt-4o-mini",
            AiProvider::Groq => "llama-3.3-70b-versatile",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            AiProvider::Anthropic => ANTHROPIC_MESSAGES_URL,
            AiProvider::OpenAi => OPENAI_CHAT_URL,
            AiProvider::Groq => GROQ_CHAT_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// HTTP client shared by every AI call: one attempt per invocation, bounded
/// by a request timeout.
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(AI_REQUEST_TIMEOUT_SECS))
        .build()
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AiGateway: Send + Sync {
    /// One-shot completion returning the full response text.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
    ) -> CoreResult<String>;

    /// Streaming completion. `on_chunk` sees every text fragment as it
    /// arrives; the assembled text is returned at the end.
    async fn stream(
        &self,
        system: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> CoreResult<String>;
}

#[derive(Clone)]
pub struct HttpAiGateway {
    http: Client,
    config: AiConfig,
}

impl HttpAiGateway {
    pub fn new(http: Client, config: AiConfig) -> Self {
        Self { http, config }
    }

    fn request(&self, body: &Value) -> CoreResult<RequestBuilder> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(CoreError::ConfigMissing("AI API key"))?;

        let builder = self.http.post(self.config.provider.endpoint()).json(body);
        Ok(match self.config.provider {
            AiProvider::Anthropic => builder
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION),
            AiProvider::OpenAi | AiProvider::Groq => builder.bearer_auth(api_key),
        })
    }

    async fn send(&self, body: &Value) -> CoreResult<reqwest::Response> {
        let response = self
            .request(body)?
            .send()
            .await
            .map_err(|err| CoreError::Transport(format!("Failed to contact AI provider: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Transport(format!(
                "{} error: {} {}",
                self.config.provider.as_str(),
                status,
                text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl AiGateway for HttpAiGateway {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
    ) -> CoreResult<String> {
        let body = request_body(&self.config, system, messages, max_tokens, false);
        let value: Value = self
            .send(&body)
            .await?
            .json()
            .await
            .map_err(|_| CoreError::Transport("Failed to parse AI response".to_string()))?;

        extract_completion_text(self.config.provider, &value)
            .ok_or_else(|| CoreError::Transport("AI response missing text".to_string()))
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> CoreResult<String> {
        let body = request_body(&self.config, system, messages, max_tokens, true);
        let response = self.send(&body).await?;

        let mut decoder = SseDecoder::new(self.config.provider);
        let mut full = String::new();
        let mut bytes = response.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(CoreError::transport)?;
            for text in decoder.push(&chunk)? {
                full.push_str(&text);
                on_chunk(&text);
            }
            if decoder.is_done() {
                break;
            }
        }

        Ok(full)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Anthropic takes `system` as a top-level field; OpenAI-style providers
/// expect it as the first message.
pub fn request_body(
    config: &AiConfig,
    system: &str,
    messages: &[ChatTurn],
    max_tokens: u32,
    stream: bool,
) -> Value {
    let mut body = match config.provider {
        AiProvider::Anthropic => json!({
            "model": config.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": messages,
        }),
        AiProvider::OpenAi | AiProvider::Groq => {
            let mut all = Vec::with_capacity(messages.len() + 1);
            all.push(json!({ "role": "system", "content": system }));
            all.extend(messages.iter().map(|turn| json!(turn)));
            json!({
                "model": config.model,
                "max_tokens": max_tokens,
                "messages": all,
            })
        }
    };

    if stream && let Some(map) = body.as_object_mut() {
        map.insert("stream".to_string(), json!(true));
    }
    body
}

pub fn extract_completion_text(provider: AiProvider, value: &Value) -> Option<String> {
    match provider {
        AiProvider::Anthropic => {
            let parts: Vec<&str> = value
                .get("content")?
                .as_array()?
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(""))
            }
        }
        AiProvider::OpenAi | AiProvider::Groq => value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Incremental decoder for provider server-sent events.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
pub struct SseDecoder {
    provider: AiProvider,
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new(provider: AiProvider) -> Self {
        Self {
            provider,
            buffer: Vec::new(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, bytes: &[u8]) -> CoreResult<Vec<String>> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while !self.done {
            let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                self.done = true;
                break;
            }

            let Ok(event) = serde_json::from_str::<Value>(data) else {
                continue;
            };
            if let Some(text) = self.event_text(&event)?
                && !text.is_empty()
            {
                chunks.push(text);
            }
        }

        Ok(chunks)
    }

    fn event_text(&mut self, event: &Value) -> CoreResult<Option<String>> {
        match self.provider {
            AiProvider::Anthropic => match event.get("type").and_then(Value::as_str) {
                Some("content_block_delta")
                    if event.pointer("/delta/type").and_then(Value::as_str)
                        == Some("text_delta") =>
                {
                    Ok(event
                        .pointer("/delta/text")
                        .and_then(Value::as_str)
                        .map(str::to_string))
                }
                Some("message_stop") => {
                    self.done = true;
                    Ok(None)
                }
                Some("error") => Err(CoreError::Transport(
                    event
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .unwrap_or("stream error")
                        .to_string(),
                )),
                _ => Ok(None),
            },
            AiProvider::OpenAi | AiProvider::Groq => Ok(event
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .map(str::to_string)),
        }
    }
}
