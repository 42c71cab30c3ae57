//! Outgoing message variants. Each variant knows which Bot API method sends it and how its
//! parameters are laid out; chat id and parse mode are supplied at the call boundary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParseMode {
    #[default]
    #[serde(rename = "HTML")]
    Html,
    MarkdownV2,
    Markdown,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMode::Html => "HTML",
            ParseMode::MarkdownV2 => "MarkdownV2",
            ParseMode::Markdown => "Markdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Audio,
    Document,
    Animation,
    Voice,
    Video,
}

impl MediaKind {
    /// Parameter name carrying the file id or URL, also the `InputMedia` type.
    pub fn field(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Animation => "animation",
            MediaKind::Voice => "voice",
            MediaKind::Video => "video",
        }
    }

    pub fn send_method(self) -> &'static str {
        match self {
            MediaKind::Photo => "sendPhoto",
            MediaKind::Audio => "sendAudio",
            MediaKind::Document => "sendDocument",
            MediaKind::Animation => "sendAnimation",
            MediaKind::Voice => "sendVoice",
            MediaKind::Video => "sendVideo",
        }
    }

    fn supports_spoiler(self) -> bool {
        matches!(self, MediaKind::Photo | MediaKind::Animation | MediaKind::Video)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextMessage {
    pub text: String,
    pub reply_markup: Option<Value>,
}

impl TextMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_markup: None,
        }
    }
}

/// Multipart part carrying a local file in `editMessageMedia`, referenced as `attach://file`.
pub const ATTACH_PART: &str = "file";

/// Media addressed by an existing `file_id`, an HTTP URL, or a local path uploaded on send.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMessage {
    pub kind: MediaKind,
    pub source: String,
    /// `source` is a path on this machine.
    pub local: bool,
    pub caption: Option<String>,
    pub spoiler: bool,
    pub reply_markup: Option<Value>,
}

impl MediaMessage {
    pub fn new(kind: MediaKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            local: false,
            caption: None,
            spoiler: false,
            reply_markup: None,
        }
    }

    /// Media read from `path` and uploaded with the call.
    pub fn file(kind: MediaKind, path: impl Into<String>) -> Self {
        Self {
            local: true,
            ..Self::new(kind, path)
        }
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn spoiler(mut self) -> Self {
        self.spoiler = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    Text(TextMessage),
    Media(MediaMessage),
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingMessage::Text(TextMessage::new(text))
    }

    pub fn media(kind: MediaKind, source: impl Into<String>) -> Self {
        OutgoingMessage::Media(MediaMessage::new(kind, source))
    }

    pub fn file(kind: MediaKind, path: impl Into<String>) -> Self {
        OutgoingMessage::Media(MediaMessage::file(kind, path))
    }

    /// The media to upload, when this message carries a local file.
    pub fn local_media(&self) -> Option<&MediaMessage> {
        match self {
            OutgoingMessage::Media(m) if m.local => Some(m),
            _ => None,
        }
    }

    /// Attaches a `reply_markup` value, e.g. [`dbot_callback::InlineKeyboard::build`].
    pub fn with_markup(mut self, markup: Value) -> Self {
        match &mut self {
            OutgoingMessage::Text(m) => m.reply_markup = Some(markup),
            OutgoingMessage::Media(m) => m.reply_markup = Some(markup),
        }
        self
    }

    pub fn reply_markup(&self) -> Option<&Value> {
        match self {
            OutgoingMessage::Text(m) => m.reply_markup.as_ref(),
            OutgoingMessage::Media(m) => m.reply_markup.as_ref(),
        }
    }

    pub fn send_method(&self) -> &'static str {
        match self {
            OutgoingMessage::Text(_) => "sendMessage",
            OutgoingMessage::Media(m) => m.kind.send_method(),
        }
    }

    pub fn send_params(&self, chat_id: i64, parse_mode: ParseMode) -> Value {
        let mut params = Map::new();
        params.insert("chat_id".into(), Value::from(chat_id));
        params.insert("parse_mode".into(), Value::from(parse_mode.as_str()));
        match self {
            OutgoingMessage::Text(m) => {
                params.insert("text".into(), Value::from(m.text.as_str()));
            }
            OutgoingMessage::Media(m) => {
                if !m.local {
                    params.insert(m.kind.field().into(), Value::from(m.source.as_str()));
                }
                if let Some(caption) = &m.caption {
                    params.insert("caption".into(), Value::from(caption.as_str()));
                }
                if m.spoiler && m.kind.supports_spoiler() {
                    params.insert("has_spoiler".into(), Value::Bool(true));
                }
            }
        }
        if let Some(markup) = self.reply_markup() {
            params.insert("reply_markup".into(), markup.clone());
        }
        Value::Object(params)
    }

    /// Method and params that turn message `message_id` into `self`.
    ///
    /// Text replaces the body of a text message and the caption of a media message
    /// (`original_has_text` tells them apart); media replaces the attachment.
    pub fn edit_request(
        &self,
        chat_id: i64,
        message_id: i64,
        original_has_text: bool,
        parse_mode: ParseMode,
    ) -> (&'static str, Value) {
        let mut params = Map::new();
        params.insert("chat_id".into(), Value::from(chat_id));
        params.insert("message_id".into(), Value::from(message_id));

        let method = match self {
            OutgoingMessage::Text(m) if original_has_text => {
                params.insert("text".into(), Value::from(m.text.as_str()));
                params.insert("parse_mode".into(), Value::from(parse_mode.as_str()));
                "editMessageText"
            }
            OutgoingMessage::Text(m) => {
                params.insert("caption".into(), Value::from(m.text.as_str()));
                params.insert("parse_mode".into(), Value::from(parse_mode.as_str()));
                "editMessageCaption"
            }
            OutgoingMessage::Media(m) => {
                let source = if m.local {
                    format!("attach://{ATTACH_PART}")
                } else {
                    m.source.clone()
                };
                let mut media = json!({
                    "type": m.kind.field(),
                    "media": source,
                    "parse_mode": parse_mode.as_str(),
                });
                if let Some(caption) = &m.caption {
                    media["caption"] = Value::from(caption.as_str());
                }
                if m.spoiler && m.kind.supports_spoiler() {
                    media["has_spoiler"] = Value::Bool(true);
                }
                params.insert("media".into(), media);
                "editMessageMedia"
            }
        };

        if let Some(markup) = self.reply_markup() {
            params.insert("reply_markup".into(), markup.clone());
        }
        (method, Value::Object(params))
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        OutgoingMessage::text(text)
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        OutgoingMessage::text(text)
    }
}

impl From<TextMessage> for OutgoingMessage {
    fn from(message: TextMessage) -> Self {
        OutgoingMessage::Text(message)
    }
}

impl From<MediaMessage> for OutgoingMessage {
    fn from(message: MediaMessage) -> Self {
        OutgoingMessage::Media(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_send_params() {
        let msg = OutgoingMessage::from("hello").with_markup(json!({ "inline_keyboard": [] }));
        assert_eq!(msg.send_method(), "sendMessage");
        assert_eq!(
            msg.send_params(7, ParseMode::Html),
            json!({
                "chat_id": 7,
                "parse_mode": "HTML",
                "text": "hello",
                "reply_markup": { "inline_keyboard": [] }
            })
        );
    }

    #[test]
    fn test_media_send_params() {
        let msg: OutgoingMessage = MediaMessage::new(MediaKind::Photo, "file-id")
            .caption("cat")
            .spoiler()
            .into();
        assert_eq!(msg.send_method(), "sendPhoto");
        let params = msg.send_params(1, ParseMode::MarkdownV2);
        assert_eq!(params["photo"], "file-id");
        assert_eq!(params["caption"], "cat");
        assert_eq!(params["has_spoiler"], true);
        assert_eq!(params["parse_mode"], "MarkdownV2");
    }

    #[test]
    fn test_voice_ignores_spoiler() {
        let msg: OutgoingMessage = MediaMessage::new(MediaKind::Voice, "v").spoiler().into();
        assert!(msg.send_params(1, ParseMode::Html).get("has_spoiler").is_none());
    }

    #[test]
    fn test_edit_text_vs_caption() {
        let msg = OutgoingMessage::text("new");
        let (method, params) = msg.edit_request(1, 2, true, ParseMode::Html);
        assert_eq!(method, "editMessageText");
        assert_eq!(params["text"], "new");

        let (method, params) = msg.edit_request(1, 2, false, ParseMode::Html);
        assert_eq!(method, "editMessageCaption");
        assert_eq!(params["caption"], "new");
        assert_eq!(params["message_id"], 2);
    }

    #[test]
    fn test_edit_media() {
        let msg = OutgoingMessage::media(MediaKind::Document, "https://example.com/a.pdf");
        let (method, params) = msg.edit_request(1, 2, true, ParseMode::Html);
        assert_eq!(method, "editMessageMedia");
        assert_eq!(params["media"]["type"], "document");
        assert_eq!(params["media"]["media"], "https://example.com/a.pdf");
    }

    #[test]
    fn test_local_file_params_leave_the_file_out() {
        let msg = OutgoingMessage::file(MediaKind::Photo, "/tmp/cat.png");
        assert_eq!(msg.local_media().map(|m| m.source.as_str()), Some("/tmp/cat.png"));
        assert!(msg.send_params(1, ParseMode::Html).get("photo").is_none());

        let (_, params) = msg.edit_request(1, 2, false, ParseMode::Html);
        assert_eq!(params["media"]["media"], "attach://file");
        assert!(OutgoingMessage::media(MediaKind::Photo, "id").local_media().is_none());
    }
}
