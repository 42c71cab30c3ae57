//! Long polling: `getUpdates` with an advancing offset, each update dispatched on its own task.

use std::future::Future;
use std::time::Duration;

use dbot_core::{DbotError, Result, Update, UpdateKind};
use handler_chain::Bot;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TelegramConfig;

#[derive(Debug, Clone)]
pub struct PollingOptions {
    pub timeout: Duration,
    /// `None` leaves the platform default in place.
    pub allowed_updates: Option<Vec<UpdateKind>>,
    /// Pause after a failed getUpdates before trying again.
    pub error_backoff: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_POLL_TIMEOUT_SECS),
            allowed_updates: None,
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl PollingOptions {
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            timeout: config.poll_timeout(),
            ..Self::default()
        }
    }

    pub fn allowed_updates(mut self, kinds: impl IntoIterator<Item = UpdateKind>) -> Self {
        self.allowed_updates = Some(kinds.into_iter().collect());
        self
    }

    /// Asks for every update kind, including the ones Telegram withholds by default.
    pub fn receive_all(self) -> Self {
        self.allowed_updates(UpdateKind::ALL)
    }

    fn params(&self, offset: i64) -> Value {
        let mut params = json!({
            "offset": offset,
            "timeout": self.timeout.as_secs(),
        });
        if let Some(kinds) = &self.allowed_updates {
            params["allowed_updates"] =
                Value::from(kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>());
        }
        params
    }
}

pub struct Poller {
    bot: Bot,
    options: PollingOptions,
    offset: i64,
}

impl Poller {
    pub fn new(bot: Bot, options: PollingOptions) -> Self {
        Self {
            bot,
            options,
            offset: 0,
        }
    }

    /// Next `offset` sent to getUpdates: one past the highest update id seen.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// One getUpdates round. Every received update advances the offset, including ones that
    /// cannot be dispatched. Returns the spawned processing tasks.
    pub async fn poll_once(&mut self) -> Result<Vec<JoinHandle<()>>> {
        let response = self
            .bot
            .sender()
            .call("getUpdates", self.options.params(self.offset))
            .await?;
        if !response.ok {
            return Err(DbotError::Api(format!(
                "getUpdates failed: {}",
                response.description.unwrap_or_default()
            )));
        }

        let raw_updates = match response.result {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let mut tasks = Vec::with_capacity(raw_updates.len());
        for raw in raw_updates {
            if let Some(id) = raw.get("update_id").and_then(Value::as_i64) {
                self.offset = self.offset.max(id + 1);
            }
            match Update::from_json(raw) {
                Ok(update) => tasks.push(spawn_dispatch(self.bot.clone(), update)),
                Err(e) => error!(error = %e, "Unsupported update"),
            }
        }
        if !tasks.is_empty() {
            debug!(count = tasks.len(), offset = self.offset, "step: updates received");
        }
        Ok(tasks)
    }

    /// Polls forever. Failures are logged and retried after the backoff.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!(
            timeout_secs = self.options.timeout.as_secs(),
            allowed_updates = ?self.options.allowed_updates,
            "step: polling started"
        );
        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, offset = self.offset, "getUpdates failed, retrying");
                tokio::time::sleep(self.options.error_backoff).await;
            }
        }
    }

    /// Polls until `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => info!("step: polling stopped"),
        }
    }
}

/// Starts the bot's background work and polls forever.
pub async fn run_polling(bot: Bot, options: PollingOptions) {
    bot.start();
    Poller::new(bot, options).run().await;
}

pub(crate) fn spawn_dispatch(bot: Bot, update: Update) -> JoinHandle<()> {
    tokio::spawn(async move {
        let update_id = update.update_id;
        if let Err(e) = bot.process(update).await {
            error!(update_id = update_id, error = %e, "Error processing update");
        }
    })
}
