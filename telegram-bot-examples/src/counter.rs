//! Counter: `/start` shows a button; each press replies with a button carrying the next count.
//! The count travels in the callback data, so the bot keeps no state.

use std::sync::Arc;

use dbot_callback::CodecConfig;
use dbot_core::{
    ActionRef, Api, CallbackAnswer, CallbackArg, OutgoingMessage, RegistryError, Result,
};
use handler_chain::{Bot, Context, Outcome};
use middleware::LoggingMiddleware;

pub const LOG: ActionRef = ActionRef::new("log");
pub const START: ActionRef = ActionRef::new("start");
pub const CLICKED: ActionRef = ActionRef::new("clicked");

pub fn build(api: Arc<dyn Api>, codec: CodecConfig) -> std::result::Result<Bot, RegistryError> {
    Bot::builder(api)
        .codec(codec)
        .stateless()
        .observer(Arc::new(LoggingMiddleware))
        .action(LOG, LoggingMiddleware)?
        .action(START, start)?
        .action(CLICKED, clicked)?
        .use_always(LOG)
        .on("/start", START)?
        .build()
}

async fn start(ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
    let keyboard = ctx
        .keyboard()
        .action("✨ Press me!", &CLICKED)?
        .text("Does nothing")
        .build();
    ctx.reply(OutgoingMessage::text("Welcome!").with_markup(keyboard))
        .await?;
    Ok(Outcome::Handled)
}

async fn clicked(ctx: Context, args: Vec<CallbackArg>) -> Result<Outcome> {
    let amount = args.first().and_then(CallbackArg::as_i64).unwrap_or(0);
    let next = (amount + 1).to_string();
    let keyboard = ctx
        .keyboard()
        .callback(format!("✨ Pressed {amount} times"), &CLICKED, &[next])?
        .build();
    ctx.reply(OutgoingMessage::text("You pressed the button!").with_markup(keyboard))
        .await?;
    ctx.answer(CallbackAnswer::text(format!("{} so far", amount + 1)));
    Ok(Outcome::Handled)
}
