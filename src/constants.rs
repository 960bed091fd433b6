// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DATABASE_FILE: &str = "mydy.db";
pub const MIN_API_TOKEN_LENGTH: usize = 16;
pub const DEFAULT_DEADLINE_CHECK_INTERVAL_SECS: u64 = 300;

// Setting keys
pub const SETTING_CURRENCY: &str = "currency";
pub const SETTING_CURRENCY_SYMBOL: &str = "currency_symbol";
pub const SETTING_INITIAL_BALANCE: &str = "initial_balance";
pub const SETTING_AI_PROVIDER: &str = "ai_provider";
pub const SETTING_AI_API_KEY: &str = "ai_api_key";
pub const SETTING_AI_MODEL: &str = "ai_model";
pub const SETTING_GROQ_API_KEY: &str = "groq_api_key";
pub const SETTING_JINA_API_KEY: &str = "jina_api_key";
pub const SETTING_USER_UTC_OFFSET: &str = "user_utc_offset";
pub const SETTING_DEADLINE_NOTIFICATIONS: &str = "deadline_notifications";
pub const SETTING_TELEGRAM_BOT_TOKEN: &str = "telegram_bot_token";
pub const SETTING_TELEGRAM_CHAT_ID: &str = "telegram_chat_id";

pub const SECRET_SETTINGS: [&str; 4] = [
    SETTING_AI_API_KEY,
    SETTING_TELEGRAM_BOT_TOKEN,
    SETTING_GROQ_API_KEY,
    SETTING_JINA_API_KEY,
];

pub const PENDING_TX_KEY_PREFIX: &str = "telegram_pending_tx_";
pub const DEADLINE_FLAG_KEY_PREFIX: &str = "deadline_notified_";

// Defaults
pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";
pub const DEFAULT_AI_PROVIDER: &str = "anthropic";
pub const DEFAULT_AI_MODEL: &str = "claude-sonnet-4-6";
pub const DEFAULT_UTC_OFFSET: &str = "+00:00";
pub const UNCATEGORIZED_LABEL: &str = "Без категории";

// AI gateway
pub const AI_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const AI_PARSE_MAX_TOKENS: u32 = 256;
pub const AI_CHAT_MAX_TOKENS: u32 = 2048;
pub const AI_CHAT_HISTORY_LIMIT: usize = 100;
pub const AI_FEEDBACK_MAX_TOKENS: u32 = 1024;
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

// Deadline notifications
pub const DEADLINE_THRESHOLDS_HOURS: [i64; 3] = [12, 3, 1];
pub const DEADLINE_WINDOW_MINUTES: i64 = 5;
pub const DEADLINE_CLEANUP_HOUR: u8 = 3;
pub const DEADLINE_TEST_TASK_LIMIT: u32 = 3;
pub const UPDATES_LOOKBACK_LIMIT: u8 = 10;

// Validation limits
pub const MAX_CURRENCY_LENGTH: usize = 10;
pub const MAX_CURRENCY_SYMBOL_LENGTH: usize = 5;
pub const MAX_API_KEY_LENGTH: usize = 500;
pub const MAX_AI_MODEL_LENGTH: usize = 100;
pub const MAX_CATEGORY_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 255;
pub const MAX_TASK_TITLE_LENGTH: usize = 255;
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 2000;
pub const MAX_AMOUNT: f64 = 99_999_999.99;

// Error messages
pub const ERR_UNAUTHORIZED: &str = "Not authorized";
