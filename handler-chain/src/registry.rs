//! Ordered handler descriptors and the matching rule.
//!
//! Handlers are tried in registration order. Unconditional middleware (no kind) matches every
//! update and stays interleaved with kind-specific handlers by position.

use std::collections::HashSet;
use std::fmt;

use dbot_core::{ActionRef, RegistryError, Update, UpdateKind};
use regex::Regex;
use serde_json::Value;

/// Sub-fields of a message that `on("<field>")` subscribes to directly.
/// `poll` is deliberately absent: it is also an update kind, use `message:poll`.
pub const MESSAGE_FIELDS: &[&str] = &[
    "quote",
    "reply_to_story",
    "reply_to_checklist_task_id",
    "text",
    "animation",
    "audio",
    "document",
    "paid_media",
    "photo",
    "sticker",
    "story",
    "video",
    "video_note",
    "voice",
    "caption",
    "checklist",
    "contact",
    "dice",
    "game",
    "venue",
    "location",
    "new_chat_members",
    "left_chat_member",
    "new_chat_title",
    "new_chat_photo",
    "delete_chat_photo",
    "group_chat_created",
    "supergroup_chat_created",
    "channel_chat_created",
    "message_auto_delete_timer_changed",
    "migrate_to_chat_id",
    "migrate_from_chat_id",
    "pinned_message",
    "invoice",
    "successful_payment",
    "refunded_payment",
    "users_shared",
    "chat_shared",
    "gift",
    "unique_gift",
    "connected_website",
    "write_access_allowed",
    "passport_data",
    "proximity_alert_triggered",
    "boost_added",
    "chat_background_set",
    "checklist_tasks_done",
    "checklist_tasks_added",
    "direct_message_price_changed",
    "forum_topic_created",
    "forum_topic_edited",
    "forum_topic_closed",
    "forum_topic_reopened",
    "general_forum_topic_hidden",
    "general_forum_topic_unhidden",
    "giveaway_created",
    "giveaway",
    "giveaway_winners",
    "giveaway_completed",
    "paid_message_price_changed",
    "suggested_post_approved",
    "suggested_post_approval_failed",
    "suggested_post_declined",
    "suggested_post_paid",
    "suggested_post_refunded",
    "video_chat_scheduled",
    "video_chat_started",
    "video_chat_ended",
    "video_chat_participants_invited",
    "web_app_data",
];

#[derive(Debug, Clone)]
pub enum MatchValue {
    Pattern(Regex),
    Literal(Value),
}

impl fmt::Display for MatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchValue::Pattern(re) => write!(f, "/{}/", re.as_str()),
            MatchValue::Literal(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    /// `None` matches every update.
    pub kind: Option<UpdateKind>,
    pub match_key: Option<String>,
    pub match_value: Option<MatchValue>,
    pub action: ActionRef,
    /// Runs even when the user's allow-set excludes `action`.
    pub always_run: bool,
}

impl HandlerDescriptor {
    pub fn new(kind: Option<UpdateKind>, action: ActionRef) -> Self {
        Self {
            kind,
            match_key: None,
            match_value: None,
            action,
            always_run: false,
        }
    }

    /// Unconditional middleware.
    pub fn middleware(action: ActionRef) -> Self {
        Self::new(None, action)
    }

    /// Message whose text (or caption) matches `pattern`.
    pub fn text_pattern(pattern: Regex, action: ActionRef) -> Self {
        Self::new(Some(UpdateKind::Message), action)
            .key("text")
            .value(MatchValue::Pattern(pattern))
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.match_key = Some(key.into());
        self
    }

    pub fn value(mut self, value: MatchValue) -> Self {
        self.match_value = Some(value);
        self
    }

    pub fn always(mut self) -> Self {
        self.always_run = true;
        self
    }

    /// The matching rule: kind, then key/value.
    pub fn matches(&self, update: &Update) -> bool {
        if let Some(kind) = self.kind {
            if kind != update.kind {
                return false;
            }
        }
        let Some(key) = &self.match_key else {
            return true;
        };
        match &self.match_value {
            None => update.field(key).is_some(),
            Some(MatchValue::Literal(expected)) => update.field(key) == Some(expected),
            Some(MatchValue::Pattern(re)) => {
                let subject = if key == "text" {
                    update.text()
                } else {
                    update.field(key).and_then(Value::as_str)
                };
                subject.is_some_and(|s| re.is_match(s))
            }
        }
    }
}

/// A parsed `on(...)` registration string.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub kind: UpdateKind,
    pub key: Option<String>,
    pub value: Option<MatchValue>,
}

impl Trigger {
    /// Resolution order:
    /// 1. `callback` or an update kind name (dashes accepted): that kind.
    /// 2. `kind:key`: that kind, requiring payload field `key`.
    /// 3. A message field name from [`MESSAGE_FIELDS`]: messages carrying it.
    /// 4. Anything else: messages whose text starts with the literal string.
    pub fn parse(trigger: &str) -> Result<Self, RegistryError> {
        if trigger.is_empty() {
            return Err(RegistryError::InvalidTrigger(trigger.to_string()));
        }
        let normalized = trigger.replace('-', "_");

        if let Some(kind) = UpdateKind::from_name(&normalized) {
            return Ok(Self::kind(kind));
        }

        if let Some((name, key)) = normalized.split_once(':') {
            if let Some(kind) = UpdateKind::from_name(name) {
                if key.is_empty() || key.contains(':') {
                    return Err(RegistryError::InvalidTrigger(trigger.to_string()));
                }
                return Ok(Self {
                    kind,
                    key: Some(key.to_string()),
                    value: None,
                });
            }
        }

        if MESSAGE_FIELDS.contains(&normalized.as_str()) {
            return Ok(Self {
                kind: UpdateKind::Message,
                key: Some(normalized),
                value: None,
            });
        }

        Ok(Self {
            kind: UpdateKind::Message,
            key: Some("text".to_string()),
            value: Some(MatchValue::Pattern(prefix_pattern(trigger)?)),
        })
    }

    fn kind(kind: UpdateKind) -> Self {
        Self {
            kind,
            key: None,
            value: None,
        }
    }

    pub fn into_descriptor(self, action: ActionRef) -> HandlerDescriptor {
        HandlerDescriptor {
            kind: Some(self.kind),
            match_key: self.key,
            match_value: self.value,
            action,
            always_run: false,
        }
    }
}

/// `^<literal>` for `on("/start")`-style triggers.
pub fn prefix_pattern(literal: &str) -> Result<Regex, RegistryError> {
    Regex::new(&format!("^{}", regex::escape(literal)))
        .map_err(|_| RegistryError::InvalidTrigger(literal.to_string()))
}

/// `^<literal>$` for exact-text handlers.
pub fn exact_pattern(literal: &str) -> Result<Regex, RegistryError> {
    Regex::new(&format!("^{}$", regex::escape(literal)))
        .map_err(|_| RegistryError::InvalidTrigger(literal.to_string()))
}

/// One line of [`HandlerRegistry::describe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSummary {
    /// Update kind, or `any` for middleware.
    pub kind: String,
    pub key: Option<String>,
    /// Match value, or `any` when only presence of `key` is required.
    pub value: Option<String>,
    pub action: String,
    pub always_run: bool,
}

impl fmt::Display for HandlerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(key) = &self.key {
            write!(f, " [{}={}]", key, self.value.as_deref().unwrap_or("any"))?;
        }
        write!(f, " -> {}", self.action)?;
        if self.always_run {
            f.write_str(" (always)")?;
        }
        Ok(())
    }
}

/// Write-once at build time, read-only while serving.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerDescriptor>,
    kinds_seen: HashSet<UpdateKind>,
    has_middleware: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: HandlerDescriptor) {
        match descriptor.kind {
            Some(kind) => {
                self.kinds_seen.insert(kind);
            }
            None => self.has_middleware = true,
        }
        self.handlers.push(descriptor);
    }

    /// Whether any handler can match an update of `kind`.
    pub fn has_handlers_for(&self, kind: UpdateKind) -> bool {
        self.has_middleware || self.kinds_seen.contains(&kind)
    }

    /// Matching handlers in registration order.
    pub fn matches<'a>(&'a self, update: &'a Update) -> impl Iterator<Item = &'a HandlerDescriptor> {
        let any = self.has_handlers_for(update.kind);
        self.handlers
            .iter()
            .filter(move |h| any && h.matches(update))
    }

    /// The first handler whose predicate passes.
    pub fn first_match<'a>(&'a self, update: &'a Update) -> Option<&'a HandlerDescriptor> {
        self.matches(update).next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.iter()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn describe(&self) -> Vec<HandlerSummary> {
        self.handlers
            .iter()
            .map(|h| HandlerSummary {
                kind: h
                    .kind
                    .map_or_else(|| "any".to_string(), |k| k.as_str().to_string()),
                key: h.match_key.clone(),
                value: h.match_key.as_ref().map(|_| {
                    h.match_value
                        .as_ref()
                        .map_or_else(|| "any".to_string(), ToString::to_string)
                }),
                action: h.action.name().to_string(),
                always_run: h.always_run,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const A: ActionRef = ActionRef::new("a");

    fn message(payload: Value) -> Update {
        Update::new(1, UpdateKind::Message, payload)
    }

    #[test]
    fn test_parse_kind_names() {
        let t = Trigger::parse("callback").unwrap();
        assert_eq!(t.kind, UpdateKind::CallbackQuery);
        assert!(t.key.is_none());

        let t = Trigger::parse("chat-boost").unwrap();
        assert_eq!(t.kind, UpdateKind::ChatBoost);

        let t = Trigger::parse("edited-message:poll").unwrap();
        assert_eq!(t.kind, UpdateKind::EditedMessage);
        assert_eq!(t.key.as_deref(), Some("poll"));
    }

    #[test]
    fn test_parse_message_field_and_text() {
        let t = Trigger::parse("video").unwrap();
        assert_eq!(t.kind, UpdateKind::Message);
        assert_eq!(t.key.as_deref(), Some("video"));
        assert!(t.value.is_none());

        let t = Trigger::parse("/start").unwrap();
        assert_eq!(t.key.as_deref(), Some("text"));
        let d = t.into_descriptor(A);
        assert!(d.matches(&message(json!({ "text": "/start payload" }))));
        assert!(!d.matches(&message(json!({ "text": "say /start" }))));
    }

    #[test]
    fn test_parse_rejects_bad_triggers() {
        assert!(Trigger::parse("").is_err());
        assert!(Trigger::parse("message:").is_err());
        assert!(Trigger::parse("message:a:b").is_err());
    }

    #[test]
    fn test_text_pattern_escapes() {
        let d = HandlerDescriptor::text_pattern(exact_pattern("1+1?").unwrap(), A);
        assert!(d.matches(&message(json!({ "text": "1+1?" }))));
        assert!(!d.matches(&message(json!({ "text": "11" }))));
        assert!(d.matches(&message(json!({ "caption": "1+1?", "photo": [] }))));
    }

    #[test]
    fn test_literal_and_presence() {
        let present = HandlerDescriptor::new(Some(UpdateKind::Message), A).key("photo");
        assert!(present.matches(&message(json!({ "photo": [{ "file_id": "x" }] }))));
        assert!(!present.matches(&message(json!({ "text": "hi" }))));

        let literal = HandlerDescriptor::new(Some(UpdateKind::Message), A)
            .key("text")
            .value(MatchValue::Literal(json!("exact")));
        assert!(literal.matches(&message(json!({ "text": "exact" }))));
        assert!(!literal.matches(&message(json!({ "text": "exactly" }))));
    }

    #[test]
    fn test_kind_mismatch_and_middleware() {
        let poll = Update::new(2, UpdateKind::Poll, json!({ "id": "p" }));
        let on_message = HandlerDescriptor::new(Some(UpdateKind::Message), A);
        assert!(!on_message.matches(&poll));
        assert!(HandlerDescriptor::middleware(A).matches(&poll));
    }

    #[test]
    fn test_has_handlers_for() {
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerDescriptor::new(Some(UpdateKind::Message), A));
        assert!(registry.has_handlers_for(UpdateKind::Message));
        assert!(!registry.has_handlers_for(UpdateKind::Poll));
        registry.register(HandlerDescriptor::middleware(A));
        assert!(registry.has_handlers_for(UpdateKind::Poll));
    }

    #[test]
    fn test_first_match_follows_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerDescriptor::new(Some(UpdateKind::Poll), ActionRef::new("poll")));
        registry.register(Trigger::parse("/start").unwrap().into_descriptor(A));
        registry.register(HandlerDescriptor::middleware(ActionRef::new("log")));

        let start = message(json!({ "text": "/start" }));
        assert_eq!(registry.first_match(&start).unwrap().action.name(), "a");

        let other = message(json!({ "text": "hello" }));
        assert_eq!(registry.first_match(&other).unwrap().action.name(), "log");

        let empty = HandlerRegistry::new();
        assert!(empty.first_match(&start).is_none());
    }

    #[test]
    fn test_describe() {
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerDescriptor::middleware(ActionRef::new("log")).always());
        registry.register(Trigger::parse("voice").unwrap().into_descriptor(A));
        registry.register(Trigger::parse("/help").unwrap().into_descriptor(A));

        let lines: Vec<String> = registry.describe().iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "any -> log (always)",
                "message [voice=any] -> a",
                "message [text=/^/help/] -> a",
            ]
        );
    }
}
