use std::collections::HashSet;

use async_trait::async_trait;
use dbot_core::{CallbackArg, Result, Update, UserId};
use handler_chain::{Action, Context, Outcome, UpdateObserver};
use tracing::{debug, info, instrument, warn};

/// Logs each update and passes. Register with `use_always` so the allow-set never hides
/// updates from the log; as an observer it also records the end of processing.
pub struct LoggingMiddleware;

#[async_trait]
impl Action for LoggingMiddleware {
    #[instrument(skip(self, ctx, _args))]
    async fn run(&self, ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
        let from = ctx.update().from();
        info!(
            update_id = ctx.update().update_id,
            kind = %ctx.kind(),
            user_id = ?ctx.sender_id(),
            username = %from.as_ref().and_then(|u| u.username.as_deref()).unwrap_or("unknown"),
            content_type = ctx.update().content_type(),
            text = %ctx.text().unwrap_or(""),
            age_secs = ?ctx.update().age(),
            "Received update"
        );
        Ok(Outcome::Pass)
    }
}

#[async_trait]
impl UpdateObserver for LoggingMiddleware {
    async fn on_update(&self, update: &Update) {
        debug!(
            update_id = update.update_id,
            kind = %update.kind,
            "Processed update"
        );
    }
}

/// Stops the handler walk for senders outside the allowlist, and for updates without a sender.
pub struct AllowlistMiddleware {
    allowed_users: HashSet<UserId>,
}

impl AllowlistMiddleware {
    pub fn new(allowed_users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            allowed_users: allowed_users.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, user_id: UserId) -> bool {
        self.allowed_users.contains(&user_id)
    }
}

#[async_trait]
impl Action for AllowlistMiddleware {
    #[instrument(skip(self, ctx, _args))]
    async fn run(&self, ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
        match ctx.sender_id() {
            Some(user_id) if self.is_allowed(user_id) => {
                debug!(user_id = user_id, "User authorized");
                Ok(Outcome::Pass)
            }
            user_id => {
                warn!(user_id = ?user_id, "Unauthorized access attempt");
                Ok(Outcome::Handled)
            }
        }
    }
}
