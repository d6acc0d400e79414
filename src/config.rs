use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

const DEFAULT_MAX_FILE_SIZE_MB: u64 = 50;
const DEFAULT_TEMP_DIR: &str = "/tmp/telegram_bot_downloads";
const HTTP_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingBotToken,
    #[error("could not create temp directory {0}: {1}")]
    TempDir(PathBuf, std::io::Error),
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Optional proxy URL passed through to yt-dlp (`--proxy`).
    pub proxy: Option<String>,
    /// Transport size ceiling in bytes.
    pub max_file_size: u64,
    /// Shared download directory for per-request temp files.
    pub temp_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .and_then(|value| non_empty(&value).map(ToString::to_string))
            .ok_or(ConfigError::MissingBotToken)?;

        let proxy = std::env::var("INSTAGRAM_PROXY")
            .ok()
            .and_then(|value| non_empty(&value).map(ToString::to_string));
        if proxy.is_none() {
            warn!("INSTAGRAM_PROXY is not set; yt-dlp will connect directly.");
        }

        let max_file_size_mb = read_u64_env("MAX_FILE_SIZE_MB")
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);

        let temp_dir = std::env::var("TEMP_DIR")
            .ok()
            .and_then(|value| non_empty(&value).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR));

        std::fs::create_dir_all(&temp_dir)
            .map_err(|error| ConfigError::TempDir(temp_dir.clone(), error))?;

        Ok(Self {
            bot_token,
            proxy,
            max_file_size: max_file_size_mb * 1024 * 1024,
            temp_dir,
        })
    }

    /// HTTP client for the mirror APIs and direct media downloads. Routes
    /// through the configured proxy when one is set.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder().connect_timeout(HTTP_CONNECT_TIMEOUT);
        if let Some(proxy) = self.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        builder.build()
    }
}

pub fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
