use thiserror::Error;

/// Failures raised inside the Telegram and deadline core.
///
/// None of these are fatal: the dispatch and scheduler entry points log them
/// and still answer their transport with a normal response.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unusable AI or command output. Carries the hint shown to the user.
    #[error("parse failure: {0}")]
    ParseFailure(String),
    /// Network or API error talking to the AI provider or the chat platform.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The chat has no pending transaction draft.
    #[error("no pending draft for chat {0}")]
    NoDraft(i64),
    /// Credentials or a destination are not configured.
    #[error("configuration missing: {0}")]
    ConfigMissing(&'static str),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] libsql::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        CoreError::Transport(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
