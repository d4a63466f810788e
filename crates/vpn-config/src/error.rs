//! Error types for configuration loading.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {0}")]
    NotFound(std::path::PathBuf),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] ini::Error),

    #[error("[TelegramBot] token must be set")]
    MissingBotToken,

    #[error("[TelegramBot] admins entry {0:?} is not a valid integer id")]
    InvalidAdminId(String),

    #[error("[Xray] {0} must be set")]
    MissingXraySetting(&'static str),

    #[error("[WireguardServer] Junk must be exactly 6 whitespace-separated values (S1 S2 H1 H2 H3 H4), got {0}")]
    InvalidJunk(usize),

    #[error("[WireguardServer] {0} is not a valid number: {1}")]
    InvalidNumber(&'static str, String),
}
