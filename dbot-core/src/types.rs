//! Core types: update kinds, updates, user and chat.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DbotError, Result};

pub type UserId = i64;

/// Top-level discriminant of an update, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    BusinessConnection,
    BusinessMessage,
    EditedBusinessMessage,
    DeletedBusinessMessages,
    MessageReaction,
    MessageReactionCount,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    PurchasedPaidMedia,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    ChatBoost,
    RemovedChatBoost,
}

impl UpdateKind {
    pub const ALL: [UpdateKind; 23] = [
        UpdateKind::Message,
        UpdateKind::EditedMessage,
        UpdateKind::ChannelPost,
        UpdateKind::EditedChannelPost,
        UpdateKind::BusinessConnection,
        UpdateKind::BusinessMessage,
        UpdateKind::EditedBusinessMessage,
        UpdateKind::DeletedBusinessMessages,
        UpdateKind::MessageReaction,
        UpdateKind::MessageReactionCount,
        UpdateKind::InlineQuery,
        UpdateKind::ChosenInlineResult,
        UpdateKind::CallbackQuery,
        UpdateKind::ShippingQuery,
        UpdateKind::PreCheckoutQuery,
        UpdateKind::PurchasedPaidMedia,
        UpdateKind::Poll,
        UpdateKind::PollAnswer,
        UpdateKind::MyChatMember,
        UpdateKind::ChatMember,
        UpdateKind::ChatJoinRequest,
        UpdateKind::ChatBoost,
        UpdateKind::RemovedChatBoost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Message => "message",
            UpdateKind::EditedMessage => "edited_message",
            UpdateKind::ChannelPost => "channel_post",
            UpdateKind::EditedChannelPost => "edited_channel_post",
            UpdateKind::BusinessConnection => "business_connection",
            UpdateKind::BusinessMessage => "business_message",
            UpdateKind::EditedBusinessMessage => "edited_business_message",
            UpdateKind::DeletedBusinessMessages => "deleted_business_messages",
            UpdateKind::MessageReaction => "message_reaction",
            UpdateKind::MessageReactionCount => "message_reaction_count",
            UpdateKind::InlineQuery => "inline_query",
            UpdateKind::ChosenInlineResult => "chosen_inline_result",
            UpdateKind::CallbackQuery => "callback_query",
            UpdateKind::ShippingQuery => "shipping_query",
            UpdateKind::PreCheckoutQuery => "pre_checkout_query",
            UpdateKind::PurchasedPaidMedia => "purchased_paid_media",
            UpdateKind::Poll => "poll",
            UpdateKind::PollAnswer => "poll_answer",
            UpdateKind::MyChatMember => "my_chat_member",
            UpdateKind::ChatMember => "chat_member",
            UpdateKind::ChatJoinRequest => "chat_join_request",
            UpdateKind::ChatBoost => "chat_boost",
            UpdateKind::RemovedChatBoost => "removed_chat_boost",
        }
    }

    /// Exact wire key lookup.
    pub fn from_wire(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == key)
    }

    /// Lenient lookup for registration strings: dashes count as underscores, and `callback`
    /// is an alias for `callback_query`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.replace('-', "_");
        if normalized == "callback" {
            return Some(UpdateKind::CallbackQuery);
        }
        Self::from_wire(&normalized)
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = DbotError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| DbotError::UnsupportedUpdate(s.to_string()))
    }
}

/// User identity (id, username, names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Chat (channel, group or private) identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub chat_type: String,
}

/// One inbound event. Exactly one top-level kind is populated; its object is `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
    pub payload: Value,
}

impl Update {
    pub fn new(update_id: i64, kind: UpdateKind, payload: Value) -> Self {
        Self {
            update_id,
            kind,
            payload,
        }
    }

    /// Parses a raw Bot API update. Unknown top-level keys are ignored; zero or several known
    /// kinds is an error.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(DbotError::UnsupportedUpdate("update is not an object".into()));
        };

        let update_id = map
            .get("update_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| DbotError::UnsupportedUpdate("missing update_id".into()))?;

        let mut found: Option<(UpdateKind, Value)> = None;
        for (key, val) in map {
            let Some(kind) = UpdateKind::from_wire(&key) else {
                continue;
            };
            if let Some((first, _)) = &found {
                return Err(DbotError::UnsupportedUpdate(format!(
                    "update {} carries both {} and {}",
                    update_id, first, kind
                )));
            }
            found = Some((kind, val));
        }

        let (kind, payload) = found.ok_or_else(|| {
            DbotError::UnsupportedUpdate(format!("update {} has no known kind", update_id))
        })?;
        Ok(Self::new(update_id, kind, payload))
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("update_id".into(), Value::from(self.update_id));
        map.insert(self.kind.as_str().into(), self.payload.clone());
        Value::Object(map)
    }

    /// Non-null payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key).filter(|v| !v.is_null())
    }

    /// Message text, falling back to the media caption.
    pub fn text(&self) -> Option<&str> {
        self.field("text")
            .or_else(|| self.field("caption"))
            .and_then(Value::as_str)
    }

    pub fn from(&self) -> Option<User> {
        self.field("from")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn sender_id(&self) -> Option<UserId> {
        self.field("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
    }

    /// Chat of the update, or of the message a callback button was attached to.
    pub fn chat_id(&self) -> Option<i64> {
        self.field("chat")
            .or_else(|| self.field("message").and_then(|m| m.get("chat")))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
    }

    pub fn message_id(&self) -> Option<i64> {
        self.field("message_id")
            .or_else(|| self.field("message").and_then(|m| m.get("message_id")))
            .and_then(Value::as_i64)
    }

    pub fn is_callback(&self) -> bool {
        self.kind == UpdateKind::CallbackQuery
    }

    /// Raw token of a button press.
    pub fn callback_data(&self) -> Option<&str> {
        if !self.is_callback() {
            return None;
        }
        self.field("data").and_then(Value::as_str)
    }

    /// Id of a callback or inline query, used for acknowledgements.
    pub fn query_id(&self) -> Option<&str> {
        match self.kind {
            UpdateKind::CallbackQuery | UpdateKind::InlineQuery => {
                self.field("id").and_then(Value::as_str)
            }
            _ => None,
        }
    }

    /// Whether the message a callback button belongs to has text (vs. a media caption).
    pub fn callback_message_has_text(&self) -> bool {
        self.field("message")
            .and_then(|m| m.get("text"))
            .is_some_and(|t| !t.is_null())
    }

    /// When the message was sent. Only message-like payloads carry a date.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.field("date")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    /// Whole seconds between the message date and `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.date().map(|sent| (now - sent).num_seconds())
    }

    /// Seconds the update waited before reaching the bot.
    pub fn age(&self) -> Option<i64> {
        self.age_at(Utc::now())
    }

    /// Content type of a message-like payload: `text`, `photo`, ..., or `unknown`.
    pub fn content_type(&self) -> &'static str {
        const TYPES: [&str; 14] = [
            "text",
            "photo",
            "video",
            "document",
            "audio",
            "voice",
            "sticker",
            "animation",
            "video_note",
            "contact",
            "location",
            "venue",
            "poll",
            "dice",
        ];
        TYPES
            .iter()
            .copied()
            .find(|t| self.field(t).is_some())
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_update(text: &str) -> Value {
        json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1_700_000_000,
                "from": { "id": 42, "is_bot": false, "first_name": "Ann", "username": "ann" },
                "chat": { "id": 42, "type": "private" },
                "text": text
            }
        })
    }

    #[test]
    fn test_from_json_message() {
        let update = Update::from_json(text_update("/start")).unwrap();
        assert_eq!(update.update_id, 10);
        assert_eq!(update.kind, UpdateKind::Message);
        assert_eq!(update.text(), Some("/start"));
        assert_eq!(update.sender_id(), Some(42));
        assert_eq!(update.chat_id(), Some(42));
        assert_eq!(update.message_id(), Some(5));
        assert_eq!(update.content_type(), "text");
        assert_eq!(update.from().unwrap().username.as_deref(), Some("ann"));
        assert_eq!(update.date().map(|d| d.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_from_json_rejects_two_kinds() {
        let raw = json!({ "update_id": 1, "message": {}, "poll": {} });
        assert!(matches!(
            Update::from_json(raw),
            Err(DbotError::UnsupportedUpdate(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_no_kind() {
        let raw = json!({ "update_id": 1, "something_new": {} });
        assert!(Update::from_json(raw).is_err());
        assert!(Update::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_callback_accessors() {
        let raw = json!({
            "update_id": 2,
            "callback_query": {
                "id": "q1",
                "from": { "id": 7, "first_name": "Bo" },
                "data": "clicked 1",
                "message": { "message_id": 9, "chat": { "id": -100, "type": "group" }, "text": "hi" }
            }
        });
        let update = Update::from_json(raw).unwrap();
        assert!(update.is_callback());
        assert_eq!(update.callback_data(), Some("clicked 1"));
        assert_eq!(update.query_id(), Some("q1"));
        assert_eq!(update.chat_id(), Some(-100));
        assert_eq!(update.message_id(), Some(9));
        assert!(update.callback_message_has_text());
        assert_eq!(update.text(), None);
    }

    #[test]
    fn test_to_json_round_trip() {
        let raw = text_update("hello");
        let update = Update::from_json(raw.clone()).unwrap();
        assert_eq!(update.to_json(), raw);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(UpdateKind::from_name("callback"), Some(UpdateKind::CallbackQuery));
        assert_eq!(UpdateKind::from_name("chat-boost"), Some(UpdateKind::ChatBoost));
        assert_eq!(UpdateKind::from_wire("chat-boost"), None);
        assert_eq!("poll_answer".parse::<UpdateKind>().unwrap(), UpdateKind::PollAnswer);
        for kind in UpdateKind::ALL {
            assert_eq!(UpdateKind::from_wire(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_age_of_dated_and_undated_updates() {
        let update = Update::from_json(text_update("hi")).unwrap();
        let now = DateTime::from_timestamp(1_700_000_042, 0).unwrap();
        assert_eq!(update.age_at(now), Some(42));

        let poll = Update::new(3, UpdateKind::Poll, json!({ "id": "p1" }));
        assert_eq!(poll.date(), None);
        assert_eq!(poll.age_at(now), None);
    }
}
