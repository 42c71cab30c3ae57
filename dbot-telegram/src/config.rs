//! Transport configuration, loaded from the environment.
//!
//! BOT_TOKEN is required; everything else has a default. Binaries load `.env` with dotenvy
//! before calling [`TelegramConfig::from_env`].

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use dbot_callback::CodecConfig;
use reqwest::Url;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SIGN_LENGTH: usize = 6;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// BOT_TOKEN. Also the callback signing secret.
    pub bot_token: String,
    /// TELEGRAM_API_URL
    pub telegram_api_url: String,
    /// LOG_FILE
    pub log_file: Option<String>,
    /// WEBHOOK_URL; polling is used when unset.
    pub webhook_url: Option<String>,
    /// WEBHOOK_SECRET, sent back by Telegram in X-Telegram-Bot-Api-Secret-Token.
    pub webhook_secret: Option<String>,
    /// WEBHOOK_ADDR, the local listen address.
    pub webhook_addr: String,
    /// POLL_TIMEOUT_SECS, the getUpdates long-poll timeout.
    pub poll_timeout_secs: u64,
    /// CALLBACK_SIGN_LENGTH
    pub callback_sign_length: usize,
    /// CALLBACK_SIGN
    pub callback_sign: bool,
}

impl TelegramConfig {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?;
        let telegram_api_url =
            env::var("TELEGRAM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let log_file = env::var("LOG_FILE").ok();
        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());
        let webhook_secret = env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());
        let webhook_addr =
            env::var("WEBHOOK_ADDR").unwrap_or_else(|_| DEFAULT_WEBHOOK_ADDR.to_string());
        let poll_timeout_secs = parse_var("POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?;
        let callback_sign_length = parse_var("CALLBACK_SIGN_LENGTH", DEFAULT_SIGN_LENGTH)?;
        let callback_sign = parse_var("CALLBACK_SIGN", true)?;

        Ok(Self {
            bot_token,
            telegram_api_url,
            log_file,
            webhook_url,
            webhook_secret,
            webhook_addr,
            poll_timeout_secs,
            callback_sign_length,
            callback_sign,
        })
    }

    /// Token set, defaults for the rest.
    pub fn with_token(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            telegram_api_url: DEFAULT_API_URL.to_string(),
            log_file: None,
            webhook_url: None,
            webhook_secret: None,
            webhook_addr: DEFAULT_WEBHOOK_ADDR.to_string(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            callback_sign_length: DEFAULT_SIGN_LENGTH,
            callback_sign: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("BOT_TOKEN is empty");
        }
        if Url::parse(&self.telegram_api_url).is_err() {
            anyhow::bail!(
                "TELEGRAM_API_URL is not a valid URL: {}",
                self.telegram_api_url
            );
        }
        if let Some(ref url) = self.webhook_url {
            let parsed =
                Url::parse(url).with_context(|| format!("WEBHOOK_URL is not a valid URL: {url}"))?;
            if parsed.scheme() != "https" {
                anyhow::bail!("WEBHOOK_URL must use https: {url}");
            }
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.webhook_addr
            .parse()
            .with_context(|| format!("WEBHOOK_ADDR is not a socket address: {}", self.webhook_addr))
    }

    /// Local route the webhook listens on: the path of WEBHOOK_URL, `/` when unset.
    pub fn webhook_path(&self) -> String {
        self.webhook_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .map(|u| u.path().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Callback codec settings; the bot token is the signing secret.
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            sign: self.callback_sign,
            sign_length: self.callback_sign_length,
            ..CodecConfig::with_secret(self.bot_token.clone())
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 9] = [
        "BOT_TOKEN",
        "TELEGRAM_API_URL",
        "LOG_FILE",
        "WEBHOOK_URL",
        "WEBHOOK_SECRET",
        "WEBHOOK_ADDR",
        "POLL_TIMEOUT_SECS",
        "CALLBACK_SIGN_LENGTH",
        "CALLBACK_SIGN",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    /// **Test: only BOT_TOKEN set yields documented defaults.**
    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("BOT_TOKEN", "test_token");

        let config = TelegramConfig::from_env().unwrap();

        assert_eq!(config.bot_token, "test_token");
        assert_eq!(config.telegram_api_url, DEFAULT_API_URL);
        assert!(config.log_file.is_none());
        assert!(config.webhook_url.is_none());
        assert_eq!(config.webhook_addr, DEFAULT_WEBHOOK_ADDR);
        assert_eq!(config.poll_timeout_secs, 30);
        assert_eq!(config.callback_sign_length, 6);
        assert!(config.callback_sign);
        assert_eq!(config.webhook_path(), "/");
        config.validate().unwrap();
        clear_env();
    }

    /// **Test: custom values are read and webhook path comes from WEBHOOK_URL.**
    #[test]
    #[serial]
    fn test_from_env_custom_values() {
        clear_env();
        env::set_var("BOT_TOKEN", "custom_token");
        env::set_var("TELEGRAM_API_URL", "http://localhost:8081");
        env::set_var("WEBHOOK_URL", "https://bot.example.com/telegram/hook");
        env::set_var("WEBHOOK_SECRET", "s3cret");
        env::set_var("WEBHOOK_ADDR", "127.0.0.1:8443");
        env::set_var("POLL_TIMEOUT_SECS", "5");
        env::set_var("CALLBACK_SIGN_LENGTH", "8");
        env::set_var("CALLBACK_SIGN", "false");

        let config = TelegramConfig::from_env().unwrap();

        assert_eq!(config.telegram_api_url, "http://localhost:8081");
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.webhook_path(), "/telegram/hook");
        assert_eq!(config.listen_addr().unwrap().port(), 8443);
        assert_eq!(config.poll_timeout(), Duration::from_secs(5));

        let codec = config.codec_config();
        assert_eq!(codec.secret, "custom_token");
        assert_eq!(codec.sign_length, 8);
        assert!(!codec.sign);
        config.validate().unwrap();
        clear_env();
    }

    /// **Test: missing BOT_TOKEN is an error.**
    #[test]
    #[serial]
    fn test_from_env_requires_token() {
        clear_env();
        assert!(TelegramConfig::from_env().is_err());
    }

    /// **Test: unparsable numeric values are rejected instead of silently defaulted.**
    #[test]
    #[serial]
    fn test_from_env_rejects_bad_number() {
        clear_env();
        env::set_var("BOT_TOKEN", "t");
        env::set_var("POLL_TIMEOUT_SECS", "soon");
        let err = TelegramConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("POLL_TIMEOUT_SECS"));
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = TelegramConfig::with_token("t");
        config.telegram_api_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = TelegramConfig::with_token("t");
        config.webhook_url = Some("http://insecure.example.com/hook".to_string());
        assert!(config.validate().is_err());

        let mut config = TelegramConfig::with_token("t");
        config.webhook_addr = "nowhere".to_string();
        assert!(config.validate().is_err());
    }
}
