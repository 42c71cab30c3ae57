//! Per-update context handed to every action.

use std::sync::{Arc, Mutex, MutexGuard};

use dbot_callback::{CallbackCodec, InlineKeyboard};
use dbot_core::{
    ActionRef, ApiResponse, CallbackAnswer, DbotError, HandlerError, InlineAnswer, MessageSender,
    OutgoingMessage, RegistryError, Result, Update, UpdateKind, UserId,
};
use dbot_state::{StateStore, StateValue};
use serde_json::{json, Value};
use tracing::warn;

use crate::action::ActionRegistry;

/// State key holding the action awaiting the user's next message.
pub const INPUT_KEY: &str = "input";
/// State key holding the allow-set.
pub const ALLOW_KEY: &str = "allow";

/// Methods that take a `parse_mode` parameter.
const PARSE_MODE_METHODS: &[&str] = &[
    "sendMessage",
    "copyMessage",
    "sendPhoto",
    "sendAudio",
    "sendDocument",
    "sendVideo",
    "sendAnimation",
    "sendVoice",
    "sendVideoNote",
    "sendPaidMedia",
    "sendMediaGroup",
    "postStory",
    "editStory",
    "editMessageText",
    "editMessageCaption",
];

/// Bot-wide collaborators shared by every context.
pub(crate) struct Services {
    pub(crate) sender: MessageSender,
    pub(crate) codec: CallbackCodec,
    pub(crate) actions: ActionRegistry,
    pub(crate) store: Option<StateStore>,
}

struct Pending {
    callback_answer: Option<CallbackAnswer>,
    inline_answer: Option<InlineAnswer>,
}

struct ContextInner {
    update: Update,
    services: Arc<Services>,
    state: Mutex<StateValue>,
    pending: Mutex<Pending>,
}

/// Cheap to clone; clones share the same update, state snapshot and pending answers.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Context {
    pub(crate) fn new(update: Update, services: Arc<Services>, state: StateValue) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                update,
                services,
                state: Mutex::new(state),
                pending: Mutex::new(Pending {
                    callback_answer: None,
                    inline_answer: None,
                }),
            }),
        }
    }

    pub fn update(&self) -> &Update {
        &self.inner.update
    }

    pub fn kind(&self) -> UpdateKind {
        self.inner.update.kind
    }

    /// Message text or caption.
    pub fn text(&self) -> Option<&str> {
        self.inner.update.text()
    }

    pub fn sender_id(&self) -> Option<UserId> {
        self.inner.update.sender_id()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.inner.update.chat_id()
    }

    pub fn is_callback(&self) -> bool {
        self.inner.update.is_callback()
    }

    pub fn sender(&self) -> &MessageSender {
        &self.inner.services.sender
    }

    pub fn codec(&self) -> &CallbackCodec {
        &self.inner.services.codec
    }

    /// Keyboard whose callback buttons are signed by this bot.
    pub fn keyboard(&self) -> InlineKeyboard<'_> {
        InlineKeyboard::new(&self.inner.services.codec)
    }

    // ---- state ----

    /// The state snapshot of this update (empty in stateless mode).
    pub fn state(&self) -> StateValue {
        lock(&self.inner.state).clone()
    }

    pub fn state_field(&self, key: &str) -> Option<Value> {
        lock(&self.inner.state).get(key).cloned()
    }

    /// Replaces the user's state and returns the persistence outcome.
    pub async fn set_state(&self, value: StateValue) -> Result<()> {
        *lock(&self.inner.state) = value.clone();
        match (&self.inner.services.store, self.sender_id()) {
            (Some(store), Some(user_id)) => store.set(user_id, value).await,
            (Some(_), None) => Err(HandlerError::State("update has no sender".to_string()).into()),
            (None, _) => Ok(()),
        }
    }

    /// Merges one field into the state.
    pub async fn update_state(&self, key: &str, value: Value) -> Result<()> {
        let mut state = self.state();
        state.insert(key.to_string(), value);
        self.set_state(state).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.set_state(StateValue::new()).await
    }

    /// Routes the user's next message to `action`. The allow-set is left as it is.
    pub async fn input(&self, action: &ActionRef) -> Result<()> {
        self.set_input(action, None).await
    }

    /// Routes the user's next message to `action` and restricts which actions may run until
    /// the state changes again. An empty `allowed` blocks everything but always-run handlers.
    pub async fn input_allowing(&self, action: &ActionRef, allowed: &[ActionRef]) -> Result<()> {
        self.set_input(action, Some(allowed)).await
    }

    async fn set_input(&self, action: &ActionRef, allowed: Option<&[ActionRef]>) -> Result<()> {
        if !self.inner.services.actions.contains(action.name()) {
            return Err(RegistryError::UnknownAction(action.name().to_string()).into());
        }
        let mut state = self.state();
        if let Some(allowed) = allowed {
            let names: Vec<Value> = allowed.iter().map(|a| Value::from(a.name())).collect();
            state.insert(ALLOW_KEY.to_string(), Value::Array(names));
        }
        state.insert(INPUT_KEY.to_string(), Value::from(action.name()));
        self.set_state(state).await
    }

    // ---- outbound ----

    pub async fn reply(&self, message: impl Into<OutgoingMessage>) -> Result<ApiResponse> {
        let chat_id = self.chat_id().ok_or(HandlerError::NoChat)?;
        self.sender().send(chat_id, &message.into()).await
    }

    /// Edits the message the pressed button belongs to. Text replaces the body of text messages
    /// and the caption of media messages.
    pub async fn edit(&self, message: impl Into<OutgoingMessage>) -> Result<ApiResponse> {
        if !self.is_callback() {
            return Err(HandlerError::NotInCallback.into());
        }
        let chat_id = self.chat_id().ok_or(HandlerError::NoChat)?;
        let message_id = self
            .inner
            .update
            .message_id()
            .ok_or(HandlerError::NoMessage)?;
        let has_text = self.inner.update.callback_message_has_text();
        self.sender()
            .edit(chat_id, message_id, has_text, &message.into())
            .await
    }

    /// Edit inside a callback, reply otherwise.
    pub async fn respond(&self, message: impl Into<OutgoingMessage>) -> Result<ApiResponse> {
        if self.is_callback() {
            self.edit(message).await
        } else {
            self.reply(message).await
        }
    }

    /// Sets the acknowledgement sent once this button press has been dispatched.
    pub fn answer(&self, answer: CallbackAnswer) {
        if !self.is_callback() {
            warn!(kind = %self.kind(), "answer() outside a callback, ignored");
            return;
        }
        lock(&self.inner.pending).callback_answer = Some(answer);
    }

    /// Sets the results sent once this inline query has been dispatched.
    pub fn answer_inline(&self, answer: InlineAnswer) {
        if self.kind() != UpdateKind::InlineQuery {
            warn!(kind = %self.kind(), "answer_inline() outside an inline query, ignored");
            return;
        }
        lock(&self.inner.pending).inline_answer = Some(answer);
    }

    /// Installs the state loaded for this update.
    pub(crate) fn load_state(&self, state: StateValue) {
        *lock(&self.inner.state) = state;
    }

    pub(crate) fn take_callback_answer(&self) -> Option<CallbackAnswer> {
        lock(&self.inner.pending).callback_answer.take()
    }

    pub(crate) fn take_inline_answer(&self) -> Option<InlineAnswer> {
        lock(&self.inner.pending).inline_answer.take()
    }

    /// Reacts to the incoming message with an emoji.
    pub async fn react(&self, emoji: &str, big: bool) -> Result<ApiResponse> {
        if self.is_callback() {
            return Err(HandlerError::InCallback.into());
        }
        let chat_id = self.chat_id().ok_or(HandlerError::NoChat)?;
        let message_id = self
            .inner
            .update
            .message_id()
            .ok_or(HandlerError::NoMessage)?;
        let mut params = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reaction": [{ "type": "emoji", "emoji": emoji }],
        });
        if big {
            params["is_big"] = Value::Bool(true);
        }
        self.sender().call("setMessageReaction", params).await
    }

    /// Deletes the message the pressed button belongs to.
    pub async fn delete(&self) -> Result<ApiResponse> {
        if !self.is_callback() {
            return Err(HandlerError::NotInCallback.into());
        }
        let chat_id = self.chat_id().ok_or(HandlerError::NoChat)?;
        let message_id = self
            .inner
            .update
            .message_id()
            .ok_or(HandlerError::NoMessage)?;
        self.sender()
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await
    }

    /// Arbitrary Bot API call. `chat_id` and, for methods that take one, `parse_mode` are filled
    /// in unless `params` sets them.
    pub async fn call(&self, method: &str, params: Value) -> Result<ApiResponse> {
        let mut body = serde_json::Map::new();
        if let Some(chat_id) = self.chat_id() {
            body.insert("chat_id".to_string(), Value::from(chat_id));
        }
        if PARSE_MODE_METHODS.contains(&method) {
            body.insert(
                "parse_mode".to_string(),
                Value::from(self.sender().parse_mode().as_str()),
            );
        }
        match params {
            Value::Object(map) => body.extend(map),
            Value::Null => {}
            other => {
                return Err(DbotError::Api(format!(
                    "{} params must be an object, got {}",
                    method, other
                )))
            }
        }
        self.sender().call(method, Value::Object(body)).await
    }
}
