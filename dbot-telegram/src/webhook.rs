//! Webhook transport: an axum router that acknowledges each POSTed update and dispatches it
//! on a spawned task, plus `setWebhook` registration.
//!
//! Response codes:
//! - non-POST requests: 200, ignored
//! - secret header mismatch: 404
//! - body that is not JSON: 400
//! - everything else: 200 before processing starts

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::Router;
use dbot_core::{DbotError, MessageSender, Result, Update, UpdateKind};
use handler_chain::Bot;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::config::TelegramConfig;
use crate::polling::spawn_dispatch;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    bot: Bot,
    secret: Option<Arc<str>>,
}

/// Router serving `path`. With a secret, requests must carry it in [`SECRET_HEADER`].
pub fn webhook_router(bot: Bot, path: &str, secret: Option<String>) -> Router {
    let state = WebhookState {
        bot,
        secret: secret.map(Arc::from),
    };
    Router::new().route(path, any(receive)).with_state(state)
}

async fn receive(
    State(state): State<WebhookState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if method != Method::POST {
        return StatusCode::OK;
    }

    if let Some(secret) = &state.secret {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret.as_ref()) {
            warn!("Received update with invalid secret token");
            return StatusCode::NOT_FOUND;
        }
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = %e, "Webhook body is not JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    match Update::from_json(raw) {
        Ok(update) => {
            spawn_dispatch(state.bot.clone(), update);
        }
        Err(e) => error!(error = %e, "Unsupported update"),
    }
    StatusCode::OK
}

/// Binds the configured address and serves the webhook route until `shutdown` resolves.
#[instrument(skip(bot, config, shutdown))]
pub async fn serve_webhook(
    bot: Bot,
    config: &TelegramConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = config.listen_addr()?;
    let path = config.webhook_path();
    let router = webhook_router(bot.clone(), &path, config.webhook_secret.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    bot.start();
    info!(addr = %addr, path = %path, "step: webhook listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    bot.shutdown();
    info!("step: webhook stopped");
    Ok(())
}

/// Points Telegram at `url`. Skips the call when the webhook is already set to `url`.
pub async fn register_webhook(
    sender: &MessageSender,
    url: &str,
    secret: Option<&str>,
    allowed_updates: Option<&[UpdateKind]>,
) -> Result<()> {
    let info = sender.call("getWebhookInfo", Value::Null).await?;
    let current = info
        .result
        .as_ref()
        .and_then(|r| r.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if current == url {
        info!(url = %url, "step: webhook already registered");
        return Ok(());
    }

    let mut params = json!({ "url": url });
    if let Some(secret) = secret {
        params["secret_token"] = Value::from(secret);
    }
    if let Some(kinds) = allowed_updates {
        params["allowed_updates"] =
            Value::from(kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>());
    }

    let response = sender.call("setWebhook", params).await?;
    if !response.ok {
        return Err(DbotError::Api(format!(
            "setWebhook failed: {}",
            response.description.unwrap_or_default()
        )));
    }
    info!(url = %url, "step: webhook registered");
    Ok(())
}
