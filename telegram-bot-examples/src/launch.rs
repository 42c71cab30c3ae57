use std::path::Path;

use dbot_telegram::{register_webhook, serve_webhook, Poller, PollingOptions, TelegramConfig};
use handler_chain::Bot;
use tracing::info;

/// Serves `bot` over the webhook when WEBHOOK_URL is set, by long polling otherwise, until
/// Ctrl-C.
pub async fn launch(bot: Bot, config: &TelegramConfig) -> anyhow::Result<()> {
    for handler in bot.describe() {
        info!(handler = %handler, "registered handler");
    }

    match &config.webhook_url {
        Some(url) => {
            register_webhook(bot.sender(), url, config.webhook_secret.as_deref(), None).await?;
            serve_webhook(bot, config, shutdown_signal()).await
        }
        None => {
            bot.start();
            Poller::new(bot.clone(), PollingOptions::from_config(config))
                .run_until(shutdown_signal())
                .await;
            bot.shutdown();
            Ok(())
        }
    }
}

/// Creates the parent directory of the log file, if there is one.
pub fn log_file_ready(log_file: Option<&str>) -> anyhow::Result<()> {
    if let Some(parent) = log_file.and_then(|f| Path::new(f).parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available: run until killed.
        std::future::pending::<()>().await;
    }
}
