//! # Handler chain
//!
//! Routes each inbound [`dbot_core::Update`] through registered handlers. Handlers are tried in
//! registration order; an action's [`Outcome`] decides whether the walk stops, continues, or
//! chains into another action. Button presses are decoded and verified through a
//! [`dbot_callback::CallbackVerifier`] and invoke the named action with coerced arguments; a
//! per-user allow-set kept in state gates which actions may run, and an awaiting-input action
//! receives the user's next message directly. [`Pagination`] panels page through item lists with
//! wrap-around navigation buttons.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dbot_core::{ActionRef, Api, CallbackArg, Result};
//! use handler_chain::{Bot, Context, Outcome};
//!
//! const START: ActionRef = ActionRef::new("start");
//! const CLICKED: ActionRef = ActionRef::new("clicked");
//!
//! async fn start(ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
//!     let keyboard = ctx.keyboard().callback("Press", &CLICKED, &["1"])?.build();
//!     ctx.reply(dbot_core::OutgoingMessage::text("Hi").with_markup(keyboard)).await?;
//!     Ok(Outcome::Handled)
//! }
//!
//! async fn clicked(ctx: Context, args: Vec<CallbackArg>) -> Result<Outcome> {
//!     ctx.edit(format!("clicked {:?}", args.first().and_then(CallbackArg::as_i64))).await?;
//!     Ok(Outcome::Handled)
//! }
//!
//! fn build(api: Arc<dyn Api>) -> std::result::Result<Bot, dbot_core::RegistryError> {
//!     Bot::builder(api)
//!         .action(START, start)?
//!         .action(CLICKED, clicked)?
//!         .on("/start", START)?
//!         .build()
//! }
//! ```

mod action;
mod bot;
mod context;
mod dispatcher;
mod pagination;
mod registry;

pub use action::{Action, ActionRegistry, Outcome};
pub use bot::{Bot, BotBuilder};
pub use context::{Context, ALLOW_KEY, INPUT_KEY};
pub use dispatcher::{
    allow_set, CallbackResult, DispatchPath, DispatchReport, Dispatcher, RateLimiter,
    UpdateObserver, MAX_CHAIN_DEPTH,
};
pub use pagination::{
    neighbours, normalize, page_count, PageItems, PageSource, PageView, Pagination,
    DEFAULT_PAGE_SIZE, PAGE_OPEN,
};
pub use registry::{
    exact_pattern, prefix_pattern, HandlerDescriptor, HandlerRegistry, HandlerSummary,
    MatchValue, Trigger, MESSAGE_FIELDS,
};

// Integration tests live in tests/handler_chain_test.rs
