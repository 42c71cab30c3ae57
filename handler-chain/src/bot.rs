//! The composed bot: codec, action and handler registries, state store and dispatcher wired
//! together by [`BotBuilder`]. Registration happens only on the builder, so nothing can be
//! registered once updates are being served.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dbot_callback::{CallbackCodec, CodecConfig, InlineKeyboard};
use dbot_core::{
    ActionRef, Api, ErrorKind, MessageSender, ParseMode, RegistryError, Result, Update,
};
use dbot_state::{NoopPersistence, StateConfig, StatePersistence, StateStore};
use regex::Regex;
use tracing::info;

use crate::action::{Action, ActionRegistry};
use crate::context::Services;
use crate::dispatcher::{DispatchReport, Dispatcher, RateLimiter, UpdateObserver};
use crate::pagination::{PageOpen, Pagination, PAGE_OPEN};
use crate::registry::{
    exact_pattern, HandlerDescriptor, HandlerRegistry, HandlerSummary, Trigger,
};

type BuildResult = std::result::Result<BotBuilder, RegistryError>;

pub struct BotBuilder {
    api: Arc<dyn Api>,
    codec: CodecConfig,
    parse_mode: ParseMode,
    suppressed: Vec<ErrorKind>,
    state: Option<StateConfig>,
    persistence: Arc<dyn StatePersistence>,
    actions: ActionRegistry,
    handlers: HandlerRegistry,
    limiter: Option<Arc<dyn RateLimiter>>,
    observers: Vec<Arc<dyn UpdateObserver>>,
    timeout: Option<Duration>,
    panels: HashMap<String, Arc<Pagination>>,
}

impl BotBuilder {
    /// Stateful, signed callbacks with an empty secret, HTML parse mode.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self {
            api,
            codec: CodecConfig::default(),
            parse_mode: ParseMode::default(),
            suppressed: Vec::new(),
            state: Some(StateConfig::default()),
            persistence: Arc::new(NoopPersistence),
            actions: ActionRegistry::new(),
            handlers: HandlerRegistry::new(),
            limiter: None,
            observers: Vec::new(),
            timeout: None,
            panels: HashMap::new(),
        }
    }

    pub fn codec(mut self, config: CodecConfig) -> Self {
        self.codec = config;
        self
    }

    pub fn parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    pub fn suppress(mut self, kind: ErrorKind) -> Self {
        self.suppressed.push(kind);
        self
    }

    pub fn allow_override(mut self, allow: bool) -> Self {
        self.actions = self.actions.allow_override(allow);
        self
    }

    pub fn state_config(mut self, config: StateConfig) -> Self {
        self.state = Some(config);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    /// No state store: no allow-set, no awaiting input, no per-user lock.
    pub fn stateless(mut self) -> Self {
        self.state = None;
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Bounds the processing time of one update.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Registers `action` under `name`.
    pub fn action(mut self, name: ActionRef, action: impl Action + 'static) -> BuildResult {
        self.actions.register(&name, Arc::new(action))?;
        Ok(self)
    }

    /// Registers a paginated panel. The shared page action is added on build.
    pub fn pagination(mut self, panel: Arc<Pagination>) -> BuildResult {
        let id = panel.id().to_string();
        if id.trim().is_empty() || id.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName(id));
        }
        if self.panels.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.panels.insert(id, panel);
        Ok(self)
    }

    pub fn handle(mut self, descriptor: HandlerDescriptor) -> Self {
        self.handlers.register(descriptor);
        self
    }

    /// Handler from a trigger string, see [`Trigger::parse`].
    pub fn on(self, trigger: &str, action: ActionRef) -> BuildResult {
        let descriptor = Trigger::parse(trigger)?.into_descriptor(action);
        Ok(self.handle(descriptor))
    }

    /// Handler for messages whose text matches `pattern`.
    pub fn on_pattern(self, pattern: Regex, action: ActionRef) -> Self {
        self.handle(HandlerDescriptor::text_pattern(pattern, action))
    }

    /// Handler for messages whose text is exactly `text`.
    pub fn text(self, text: &str, action: ActionRef) -> BuildResult {
        let descriptor = HandlerDescriptor::text_pattern(exact_pattern(text)?, action);
        Ok(self.handle(descriptor))
    }

    /// Middleware for every update, subject to the allow-set.
    pub fn use_middleware(self, action: ActionRef) -> Self {
        self.handle(HandlerDescriptor::middleware(action))
    }

    /// Middleware for every update, ignoring the allow-set.
    pub fn use_always(self, action: ActionRef) -> Self {
        self.handle(HandlerDescriptor::middleware(action).always())
    }

    /// Fails if a handler names an action that was never registered.
    pub fn build(mut self) -> std::result::Result<Bot, RegistryError> {
        if !self.panels.is_empty() {
            let panels = std::mem::take(&mut self.panels);
            self.actions
                .register(&PAGE_OPEN, Arc::new(PageOpen::new(panels)))?;
        }

        if let Some(missing) = self
            .handlers
            .iter()
            .find(|h| !self.actions.contains(h.action.name()))
        {
            return Err(RegistryError::UnknownAction(missing.action.name().to_string()));
        }

        let sender = self
            .suppressed
            .iter()
            .fold(
                MessageSender::new(self.api).with_parse_mode(self.parse_mode),
                |sender, kind| sender.suppress(*kind),
            );
        let codec = CallbackCodec::new(self.codec);
        let store = self
            .state
            .map(|config| StateStore::with_persistence(config, self.persistence));

        info!(
            actions = self.actions.len(),
            handlers = self.handlers.len(),
            stateful = store.is_some(),
            signed = codec.signs(),
            "step: bot built"
        );

        let services = Arc::new(Services {
            sender,
            codec: codec.clone(),
            actions: self.actions,
            store,
        });

        Ok(Bot {
            dispatcher: Arc::new(Dispatcher {
                services,
                handlers: self.handlers,
                verifier: Arc::new(codec),
                limiter: self.limiter,
                observers: self.observers,
                timeout: self.timeout,
            }),
        })
    }
}

/// Cheap to clone; transports hold one per connection or task.
#[derive(Clone)]
pub struct Bot {
    dispatcher: Arc<Dispatcher>,
}

impl Bot {
    pub fn builder(api: Arc<dyn Api>) -> BotBuilder {
        BotBuilder::new(api)
    }

    pub async fn process(&self, update: Update) -> Result<DispatchReport> {
        self.dispatcher.process(update).await
    }

    /// Starts background work (the state sweeper). Needs a tokio runtime.
    pub fn start(&self) {
        if let Some(store) = &self.dispatcher.services.store {
            store.start_sweeper();
        }
        info!("step: bot started");
    }

    pub fn shutdown(&self) {
        if let Some(store) = &self.dispatcher.services.store {
            store.stop_sweeper();
        }
        info!("step: bot stopped");
    }

    pub fn sender(&self) -> &MessageSender {
        &self.dispatcher.services.sender
    }

    pub fn codec(&self) -> &CallbackCodec {
        &self.dispatcher.services.codec
    }

    pub fn keyboard(&self) -> InlineKeyboard<'_> {
        InlineKeyboard::new(&self.dispatcher.services.codec)
    }

    pub fn state(&self) -> Option<&StateStore> {
        self.dispatcher.services.store.as_ref()
    }

    pub fn describe(&self) -> Vec<HandlerSummary> {
        self.dispatcher.handlers().describe()
    }
}
