//! [`Api`] over the Telegram Bot HTTP API: `POST {base}/bot{token}/{method}` with a JSON body,
//! or a multipart form when a local file is uploaded.

use std::time::Duration;

use async_trait::async_trait;
use dbot_core::{Api, DbotError, FileUpload, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::TelegramConfig;

/// Slack added to the long-poll timeout so the HTTP client never cuts a getUpdates short.
const REQUEST_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TelegramApi {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramApi {
    pub fn new(base_url: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(poll_timeout + REQUEST_SLACK)
            .build()
            .map_err(|e| DbotError::Api(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        Self::new(
            &config.telegram_api_url,
            &config.bot_token,
            config.poll_timeout(),
        )
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }
}

/// Error statuses still carry the `{ok: false, description}` envelope, so the body is returned
/// whenever it is JSON. Only non-JSON bodies are errors.
async fn envelope(method: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| DbotError::Api(format!("{method}: invalid response ({status}): {}", e.without_url())))?;
    debug!(method = %method, status = %status, "api response");
    Ok(body)
}

#[async_trait]
impl Api for TelegramApi {
    #[instrument(skip(self, params))]
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        let response = self
            .client
            .post(self.method_url(method))
            .json(&params)
            .send()
            .await
            .map_err(|e| DbotError::Api(format!("{method}: {}", e.without_url())))?;
        envelope(method, response).await
    }

    /// Scalars go as plain form fields, objects and arrays as JSON text.
    #[instrument(skip(self, params, file), fields(file = %file.file_name))]
    async fn upload(&self, method: &str, params: Value, file: FileUpload) -> Result<Value> {
        let mut form = Form::new();
        if let Value::Object(params) = params {
            for (key, value) in params {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                form = form.text(key, text);
            }
        }
        form = form.part(file.field, Part::bytes(file.bytes).file_name(file.file_name));

        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| DbotError::Api(format!("{method}: {}", e.without_url())))?;
        envelope(method, response).await
    }
}
