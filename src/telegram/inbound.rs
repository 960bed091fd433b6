use teloxide::types::{Update, UpdateKind};

/// The two kinds of update the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message {
        chat_id: i64,
        text: String,
    },
    Callback {
        chat_id: i64,
        message_id: i32,
        data: String,
        callback_id: String,
    },
}

impl InboundEvent {
    /// Maps a Bot API update. Other update kinds, and callbacks on
    /// inline-mode messages, yield `None`.
    pub fn from_update(update: &Update) -> Option<Self> {
        match &update.kind {
            UpdateKind::Message(message) => Some(InboundEvent::Message {
                chat_id: message.chat.id.0,
                text: message.text().unwrap_or_default().trim().to_string(),
            }),
            UpdateKind::CallbackQuery(query) => {
                let message = query.message.as_ref()?;
                Some(InboundEvent::Callback {
                    chat_id: message.chat().id.0,
                    message_id: message.id().0,
                    data: query.data.clone().unwrap_or_default(),
                    callback_id: query.id.0.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::Message { chat_id, .. } | InboundEvent::Callback { chat_id, .. } => {
                *chat_id
            }
        }
    }
}
