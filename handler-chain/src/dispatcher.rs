//! The per-update state machine.
//!
//! Steps, in order: rate-limit hook, state load and allow-set, handler walk, then exactly one of
//! the callback branch, the inline-query acknowledgement or the awaiting-input continuation,
//! and finally the update observer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbot_callback::{CallbackVerifier, CodecError, BLANK_CALLBACK};
use dbot_core::{ActionRef, CallbackArg, DbotError, Result, Update, UpdateKind};
use dbot_state::StateValue;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::action::{Action, Outcome};
use crate::context::{Context, Services, ALLOW_KEY, INPUT_KEY};
use crate::registry::HandlerRegistry;

/// Maximum number of `Then`/`Redirect` steps one action result may take.
pub const MAX_CHAIN_DEPTH: usize = 10;

/// Rate-limit hook. Consulted first for every update with a sender; may set a callback answer
/// on the context, which is still sent when the update is limited.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn is_limited(&self, ctx: &Context) -> bool;
}

/// Sees every update after dispatch, handled or not. Not part of control flow.
#[async_trait]
pub trait UpdateObserver: Send + Sync {
    async fn on_update(&self, update: &Update);
}

/// Which branch an update took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    RateLimited,
    Handlers,
    Callback,
    InlineQuery,
    AwaitingInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// Label-only button.
    Blank,
    Malformed,
    BadSignature,
    NotAllowed(String),
    UnknownAction(String),
    Invoked { action: String, handled: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub path: DispatchPath,
    /// A handler (or the awaiting-input action) resolved to `Handled`.
    pub handled: bool,
    pub callback: Option<CallbackResult>,
}

impl DispatchReport {
    fn new(path: DispatchPath, handled: bool) -> Self {
        Self {
            path,
            handled,
            callback: None,
        }
    }
}

/// Allow-set derived from state. `None` means unrestricted.
///
/// `allow` may be a name or a list of names; `[]` and `[""]` give an active empty set, while an
/// empty string or any non-string, non-array value leaves the user unrestricted.
pub fn allow_set(state: &StateValue) -> Option<HashSet<String>> {
    match state.get(ALLOW_KEY)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(HashSet::from([s.clone()])),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn is_allowed(allow: Option<&HashSet<String>>, action: &str) -> bool {
    allow.map_or(true, |set| set.contains(action))
}

pub struct Dispatcher {
    pub(crate) services: Arc<Services>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) verifier: Arc<dyn CallbackVerifier>,
    pub(crate) limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) observers: Vec<Arc<dyn UpdateObserver>>,
    pub(crate) timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Processes one update. Button presses are acknowledged and the observers run afterwards,
    /// whatever the outcome.
    #[instrument(skip(self, update), fields(update_id = update.update_id, kind = %update.kind))]
    pub async fn process(&self, update: Update) -> Result<DispatchReport> {
        let ctx = Context::new(update, self.services.clone(), StateValue::new());

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.dispatch(&ctx))
                .await
                .unwrap_or(Err(DbotError::Timeout(limit))),
            None => self.dispatch(&ctx).await,
        };

        if ctx.is_callback() {
            self.acknowledge(&ctx, &result).await;
        }

        for observer in &self.observers {
            observer.on_update(ctx.update()).await;
        }

        match &result {
            Ok(report) => debug!(path = ?report.path, handled = report.handled, "step: update dispatched"),
            Err(e) => error!(error = %e, "step: update failed"),
        }
        result
    }

    async fn dispatch(&self, ctx: &Context) -> Result<DispatchReport> {
        let update = ctx.update();
        let user_id = update.sender_id();
        let store = self.services.store.as_ref();

        // 1. Rate limit, before any state is touched.
        if let (Some(limiter), Some(_)) = (&self.limiter, user_id) {
            if limiter.is_limited(ctx).await {
                info!(user_id = ?user_id, "step: update rate limited");
                return Ok(DispatchReport::new(DispatchPath::RateLimited, false));
            }
        }

        // 2. State and allow-set, under the per-user lock.
        let _guard = match (store, user_id) {
            (Some(store), Some(id)) => Some(store.lock_user(id).await),
            _ => None,
        };
        let state = match (store, user_id) {
            (Some(store), Some(id)) => store.get(id).await?,
            _ => StateValue::new(),
        };
        let allow = allow_set(&state);
        let awaiting = state
            .get(INPUT_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ActionRef::owned);
        if let Some(allow) = &allow {
            debug!(user_id = ?user_id, allow = ?allow, "allow-set active");
        }
        ctx.load_state(state);

        // 3. Handler walk.
        let mut handled = false;
        for handler in self.handlers.matches(update) {
            if !handler.always_run && !is_allowed(allow.as_ref(), handler.action.name()) {
                debug!(action = %handler.action, "handler skipped by allow-set");
                continue;
            }
            debug!(action = %handler.action, "step: handler invoked");
            if self.invoke(ctx, &handler.action, Vec::new()).await? {
                info!(action = %handler.action, "step: update handled");
                handled = true;
                break;
            }
        }

        // 4. Callback, inline query or awaiting input.
        if update.is_callback() {
            let mut report = DispatchReport::new(DispatchPath::Callback, handled);
            report.callback = Some(self.dispatch_callback(ctx, allow.as_ref()).await?);
            return Ok(report);
        }

        if update.kind == UpdateKind::InlineQuery {
            if let (Some(answer), Some(query_id)) = (ctx.take_inline_answer(), update.query_id()) {
                self.services.sender.answer_inline(query_id, &answer).await?;
            }
            return Ok(DispatchReport::new(DispatchPath::InlineQuery, handled));
        }

        if let (false, Some(action)) = (handled, awaiting) {
            info!(user_id = ?user_id, action = %action, "step: awaiting input continued");
            let args = update
                .text()
                .map(|t| vec![CallbackArg::Str(t.to_string())])
                .unwrap_or_default();
            let handled = self.invoke(ctx, &action, args).await?;
            return Ok(DispatchReport::new(DispatchPath::AwaitingInput, handled));
        }

        Ok(DispatchReport::new(DispatchPath::Handlers, handled))
    }

    async fn dispatch_callback(
        &self,
        ctx: &Context,
        allow: Option<&HashSet<String>>,
    ) -> Result<CallbackResult> {
        let Some(data) = ctx.update().callback_data() else {
            return Ok(CallbackResult::Blank);
        };
        if data == BLANK_CALLBACK {
            return Ok(CallbackResult::Blank);
        }

        let decoded = match self.verifier.open(data) {
            Ok(decoded) => decoded,
            Err(CodecError::BadSignature) => {
                warn!(user_id = ?ctx.sender_id(), "wrong callback signature");
                return Ok(CallbackResult::BadSignature);
            }
            Err(e) => {
                warn!(user_id = ?ctx.sender_id(), error = %e, "malformed callback data");
                return Ok(CallbackResult::Malformed);
            }
        };

        if !is_allowed(allow, &decoded.action) {
            debug!(action = %decoded.action, "callback skipped by allow-set");
            return Ok(CallbackResult::NotAllowed(decoded.action));
        }

        let Some(action) = self.services.actions.get(&decoded.action) else {
            error!(action = %decoded.action, "callback action not registered");
            return Ok(CallbackResult::UnknownAction(decoded.action));
        };

        info!(action = %decoded.action, args = decoded.args.len(), "step: callback action invoked");
        let outcome = action.run(ctx.clone(), decoded.coerced_args()).await?;
        let handled = self.resolve(ctx, outcome).await?;
        Ok(CallbackResult::Invoked {
            action: decoded.action,
            handled,
        })
    }

    /// Answers the pressed button with the answer an action set, or an empty one. A rate-limited
    /// press is only answered when the limiter set an answer. Failures are logged, never raised.
    async fn acknowledge(&self, ctx: &Context, result: &Result<DispatchReport>) {
        let answer = match (result, ctx.take_callback_answer()) {
            (Ok(report), None) if report.path == DispatchPath::RateLimited => return,
            (_, answer) => answer.unwrap_or_default(),
        };
        let Some(query_id) = ctx.update().query_id() else {
            return;
        };
        if let Err(e) = self.services.sender.answer_callback(query_id, &answer).await {
            warn!(error = %e, "answerCallbackQuery failed");
        }
    }

    /// Runs the action registered as `name` and resolves its result. Unknown names are logged
    /// and count as not handled.
    async fn invoke(&self, ctx: &Context, name: &ActionRef, args: Vec<CallbackArg>) -> Result<bool> {
        let Some(action) = self.services.actions.get(name.name()) else {
            error!(action = %name, "action not registered");
            return Ok(false);
        };
        let outcome = action.run(ctx.clone(), args).await?;
        self.resolve(ctx, outcome).await
    }

    /// Follows `Then` and `Redirect` until a terminal outcome, at most [`MAX_CHAIN_DEPTH`] steps.
    pub(crate) async fn resolve(&self, ctx: &Context, mut outcome: Outcome) -> Result<bool> {
        let mut depth = 0;
        loop {
            let next: Arc<dyn Action> = match outcome {
                Outcome::Pass => return Ok(false),
                Outcome::Handled => return Ok(true),
                Outcome::Then(action) => action,
                Outcome::Redirect(name) => match self.services.actions.get(name.name()) {
                    Some(action) => action,
                    None => {
                        error!(action = %name, "redirect to unregistered action");
                        return Ok(false);
                    }
                },
            };
            if depth == MAX_CHAIN_DEPTH {
                return Err(DbotError::ChainTooDeep(MAX_CHAIN_DEPTH));
            }
            depth += 1;
            outcome = next.run(ctx.clone(), Vec::new()).await?;
        }
    }
}
