use std::sync::Arc;

use dbot_core::init_tracing;
use dbot_telegram::{TelegramApi, TelegramConfig};
use telegram_bot_examples::{counter, launch, log_file_ready};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = TelegramConfig::from_env()?;
    config.validate()?;

    log_file_ready(config.log_file.as_deref())?;
    init_tracing(config.log_file.as_deref())?;

    let api = Arc::new(TelegramApi::from_config(&config)?);
    let bot = counter::build(api, config.codec_config())?;
    info!(log_file = ?config.log_file, "Counter Bot started");

    launch(bot, &config).await
}
