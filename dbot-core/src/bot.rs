//! Outbound capability.
//!
//! [`Api`] is the single seam to the remote platform: `call(method, params) -> JSON`, plus
//! `upload` for calls that carry a local file. It is transport-agnostic; dbot-telegram
//! implements it over HTTP, tests substitute a recorder.
//! [`MessageSender`] layers parse mode and the suppressible error registry on top.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{DbotError, ErrorKind, Result};
use crate::message::{MediaMessage, OutgoingMessage, ParseMode, ATTACH_PART};

/// Description fragment the platform uses for markup it could not parse.
const PARSE_ERROR_MARKER: &str = "can't parse entities";

/// Raw remote call. Returns the response envelope (`{ ok, result | description }`) as JSON;
/// transport failures are `Err`.
#[async_trait]
pub trait Api: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value>;

    /// Multipart call carrying `file` next to `params`. Transports that cannot upload refuse.
    async fn upload(&self, method: &str, params: Value, file: FileUpload) -> Result<Value> {
        let _ = (params, file);
        Err(DbotError::Api(format!("{method}: this transport cannot upload files")))
    }
}

/// One local file sent as a multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    /// Multipart field name.
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// The `ok` / `description` envelope of a Bot API response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    pub ok: bool,
    pub result: Option<Value>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

impl ApiResponse {
    pub fn from_value(value: &Value) -> Self {
        Self {
            ok: value.get("ok").and_then(Value::as_bool).unwrap_or(false),
            result: value.get("result").cloned(),
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            error_code: value.get("error_code").and_then(Value::as_i64),
        }
    }

    /// `message_id` of a sent or edited message.
    pub fn message_id(&self) -> Option<i64> {
        self.result
            .as_ref()
            .and_then(|r| r.get("message_id"))
            .and_then(Value::as_i64)
    }

    fn is_parse_error(&self) -> bool {
        !self.ok
            && self
                .description
                .as_deref()
                .is_some_and(|d| d.contains(PARSE_ERROR_MARKER))
    }
}

/// Acknowledgement of a button press.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallbackAnswer {
    pub text: Option<String>,
    pub show_alert: bool,
    pub url: Option<String>,
}

impl CallbackAnswer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            show_alert: true,
            url: None,
        }
    }

    fn to_params(&self, query_id: &str) -> Value {
        let mut params = Map::new();
        params.insert("callback_query_id".into(), Value::from(query_id));
        if let Some(text) = &self.text {
            params.insert("text".into(), Value::from(text.as_str()));
        }
        if self.show_alert {
            params.insert("show_alert".into(), Value::Bool(true));
        }
        if let Some(url) = &self.url {
            params.insert("url".into(), Value::from(url.as_str()));
        }
        Value::Object(params)
    }
}

/// Results for an inline query. Defaults: one second cache, personal results, no next page.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineAnswer {
    pub results: Vec<Value>,
    pub cache_time: u32,
    pub is_personal: bool,
    pub next_offset: String,
}

impl InlineAnswer {
    pub fn new(results: Vec<Value>) -> Self {
        Self {
            results,
            cache_time: 1,
            is_personal: true,
            next_offset: String::new(),
        }
    }

    pub fn next_offset(mut self, offset: impl Into<String>) -> Self {
        self.next_offset = offset.into();
        self
    }

    fn to_params(&self, query_id: &str) -> Value {
        json!({
            "inline_query_id": query_id,
            "results": self.results,
            "cache_time": self.cache_time,
            "is_personal": self.is_personal,
            "next_offset": self.next_offset,
        })
    }
}

/// Sends and edits messages through an [`Api`], injecting parse mode and mapping platform
/// markup errors to [`DbotError::TextParse`] unless that kind is suppressed.
#[derive(Clone)]
pub struct MessageSender {
    api: Arc<dyn Api>,
    parse_mode: ParseMode,
    suppressed: HashSet<ErrorKind>,
}

impl MessageSender {
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self {
            api,
            parse_mode: ParseMode::default(),
            suppressed: HashSet::new(),
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    /// Opts out of an error kind: failed responses of that kind are returned as-is.
    pub fn suppress(mut self, kind: ErrorKind) -> Self {
        self.suppressed.insert(kind);
        self
    }

    pub fn is_suppressed(&self, kind: ErrorKind) -> bool {
        self.suppressed.contains(&kind)
    }

    pub fn parse_mode(&self) -> ParseMode {
        self.parse_mode
    }

    pub fn api(&self) -> &Arc<dyn Api> {
        &self.api
    }

    /// Calls `method` and checks the envelope. Non-parse failures are returned as responses
    /// with `ok == false`; no retry.
    pub async fn call(&self, method: &str, params: Value) -> Result<ApiResponse> {
        debug!(method = %method, "api call");
        let raw = self.api.call(method, params).await?;
        self.check(method, ApiResponse::from_value(&raw))
    }

    pub async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<ApiResponse> {
        let method = message.send_method();
        let params = message.send_params(chat_id, self.parse_mode);
        match message.local_media() {
            Some(media) => self.upload(method, params, media, media.kind.field()).await,
            None => self.call(method, params).await,
        }
    }

    pub async fn edit(
        &self,
        chat_id: i64,
        message_id: i64,
        original_has_text: bool,
        message: &OutgoingMessage,
    ) -> Result<ApiResponse> {
        let (method, params) =
            message.edit_request(chat_id, message_id, original_has_text, self.parse_mode);
        match message.local_media() {
            Some(media) => self.upload(method, params, media, ATTACH_PART).await,
            None => self.call(method, params).await,
        }
    }

    /// Reads a local file and sends it as part `field`. A missing file is
    /// [`DbotError::FileNotFound`]; when that kind is suppressed the call is skipped and a
    /// failed response is returned instead.
    async fn upload(
        &self,
        method: &str,
        params: Value,
        media: &MediaMessage,
        field: &str,
    ) -> Result<ApiResponse> {
        let bytes = match tokio::fs::read(&media.source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.is_suppressed(ErrorKind::FileNotFound) {
                    warn!(method = %method, path = %media.source, "file not found, call skipped");
                    return Ok(ApiResponse {
                        description: Some(format!("File not found: {}", media.source)),
                        ..ApiResponse::default()
                    });
                }
                return Err(DbotError::FileNotFound(media.source.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let file_name = Path::new(&media.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(field)
            .to_string();
        debug!(method = %method, file = %file_name, size = bytes.len(), "api upload");
        let file = FileUpload {
            field: field.to_string(),
            file_name,
            bytes,
        };
        let raw = self.api.upload(method, params, file).await?;
        self.check(method, ApiResponse::from_value(&raw))
    }

    pub async fn answer_callback(
        &self,
        query_id: &str,
        answer: &CallbackAnswer,
    ) -> Result<ApiResponse> {
        self.call("answerCallbackQuery", answer.to_params(query_id))
            .await
    }

    pub async fn answer_inline(&self, query_id: &str, answer: &InlineAnswer) -> Result<ApiResponse> {
        self.call("answerInlineQuery", answer.to_params(query_id))
            .await
    }

    fn check(&self, method: &str, response: ApiResponse) -> Result<ApiResponse> {
        if response.is_parse_error() {
            let description = response.description.clone().unwrap_or_default();
            if self.is_suppressed(ErrorKind::TextParse) {
                debug!(method = %method, description = %description, "text parse error suppressed");
                return Ok(response);
            }
            return Err(DbotError::TextParse(description));
        }
        if !response.ok {
            warn!(
                method = %method,
                error_code = ?response.error_code,
                description = ?response.description,
                "api call failed"
            );
        }
        Ok(response)
    }
}
