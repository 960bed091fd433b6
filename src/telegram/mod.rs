//! Telegram bot: conversational transaction entry with AI parsing and
//! inline-keyboard editing.

pub mod draft;
pub mod extract;
pub mod handlers;
pub mod inbound;
pub mod parse;
pub mod render;
pub mod transport;

pub use handlers::{BotContext, handle_event, register, webhook};
