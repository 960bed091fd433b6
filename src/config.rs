use crate::constants::*;

/// Process configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_path: String,
    pub api_token: String,
    /// Public base URL, e.g. `https://mydy.example.com`.
    pub app_url: Option<String>,
    pub deadline_check_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| DEFAULT_PORT.to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        let data_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());

        let api_token = std::env::var("API_TOKEN")
            .map_err(|_| "API_TOKEN environment variable is required".to_string())?;
        if api_token.len() < MIN_API_TOKEN_LENGTH {
            return Err(format!(
                "API_TOKEN must be at least {} characters",
                MIN_API_TOKEN_LENGTH
            ));
        }

        let app_url = std::env::var("APP_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let deadline_check_interval_secs = match std::env::var("DEADLINE_CHECK_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| format!("Invalid DEADLINE_CHECK_INTERVAL_SECS: {}", raw))?,
            Err(_) => DEFAULT_DEADLINE_CHECK_INTERVAL_SECS,
        };

        Ok(Self {
            host,
            port,
            data_path,
            api_token,
            app_url,
            deadline_check_interval_secs,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
