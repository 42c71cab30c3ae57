//! # dbot-telegram
//!
//! Telegram transport for [`handler_chain::Bot`]: the HTTP [`dbot_core::Api`] implementation,
//! environment config, the long-polling loop and the webhook server. Holds no bot logic.

mod api;
mod config;
mod polling;
mod webhook;

pub use api::TelegramApi;
pub use config::{
    TelegramConfig, DEFAULT_API_URL, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_SIGN_LENGTH,
    DEFAULT_WEBHOOK_ADDR,
};
pub use polling::{run_polling, Poller, PollingOptions};
pub use webhook::{register_webhook, serve_webhook, webhook_router, SECRET_HEADER};
