//! Guided form: "Fill a form" puts the user into awaiting-input mode for their age, with only
//! "Cancel" allowed until the answer is valid. `/reset` always runs, whatever the state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dbot_callback::CodecConfig;
use dbot_core::{
    ActionRef, Api, CallbackArg, OutgoingMessage, RegistryError, Result, UserId,
};
use dbot_state::{InMemoryPersistence, StateConfig};
use handler_chain::{Bot, Context, Outcome, Trigger};
use middleware::LoggingMiddleware;
use serde_json::{json, Value};
use tracing::debug;

pub const LOG: ActionRef = ActionRef::new("log");
pub const START: ActionRef = ActionRef::new("start");
pub const OPEN_FORM: ActionRef = ActionRef::new("openForm");
pub const HANDLE_AGE: ActionRef = ActionRef::new("handleAge");
pub const CANCEL: ActionRef = ActionRef::new("cancel");
pub const RESET_AGE: ActionRef = ActionRef::new("resetAge");
pub const RESET: ActionRef = ActionRef::new("reset");
pub const UNKNOWN: ActionRef = ActionRef::new("unknown");

/// State key holding the id of the form prompt, deleted once the user answers.
const PROMPT_KEY: &str = "msg_id";
const FORM_TITLE: &str = "<b>Form №1</b>";

/// Ages collected so far, outside the expiring per-user state.
#[derive(Clone, Default)]
pub struct Ages(Arc<Mutex<HashMap<UserId, i64>>>);

impl Ages {
    pub fn get(&self, user_id: UserId) -> Option<i64> {
        self.0.lock().ok()?.get(&user_id).copied()
    }

    fn set(&self, user_id: UserId, age: i64) {
        if let Ok(mut ages) = self.0.lock() {
            ages.insert(user_id, age);
        }
    }

    fn remove(&self, user_id: UserId) {
        if let Ok(mut ages) = self.0.lock() {
            ages.remove(&user_id);
        }
    }
}

pub fn build(
    api: Arc<dyn Api>,
    codec: CodecConfig,
    ages: Ages,
    persistence: InMemoryPersistence,
) -> std::result::Result<Bot, RegistryError> {
    let (a1, a2, a3, a4) = (ages.clone(), ages.clone(), ages.clone(), ages);
    let reset_handler = Trigger::parse("/reset")?.into_descriptor(RESET).always();

    Bot::builder(api)
        .codec(codec)
        .state_config(StateConfig::default())
        .persistence(Arc::new(persistence))
        .observer(Arc::new(LoggingMiddleware))
        .action(LOG, LoggingMiddleware)?
        .action(START, move |ctx: Context, _args: Vec<CallbackArg>| {
            show_start(a1.clone(), ctx)
        })?
        .action(OPEN_FORM, open_form)?
        .action(HANDLE_AGE, move |ctx: Context, args: Vec<CallbackArg>| {
            handle_age(a2.clone(), ctx, args)
        })?
        .action(CANCEL, move |ctx: Context, _args: Vec<CallbackArg>| {
            cancel(a3.clone(), ctx)
        })?
        .action(RESET_AGE, move |ctx: Context, _args: Vec<CallbackArg>| {
            reset_age(a4.clone(), ctx)
        })?
        .action(RESET, reset)?
        .action(UNKNOWN, unknown)?
        .use_always(LOG)
        .handle(reset_handler)
        .on("/start", START)?
        .on("message", UNKNOWN)?
        .build()
}

fn start_keyboard(ctx: &Context, has_age: bool) -> Result<Value> {
    let keyboard = ctx.keyboard().action("Fill a form", &OPEN_FORM)?.row();
    let keyboard = if has_age {
        keyboard.action("Reset my age", &RESET_AGE)?
    } else {
        keyboard
    };
    Ok(keyboard.build())
}

fn form_keyboard(ctx: &Context) -> Result<Value> {
    Ok(ctx.keyboard().action("Cancel", &CANCEL)?.build())
}

async fn show_start(ages: Ages, ctx: Context) -> Result<Outcome> {
    let age = ctx.sender_id().and_then(|id| ages.get(id));
    let text = format!(
        "📎 Hey, welcome! That's an input example!\nYour age is: {}",
        age.map_or_else(|| "not specified".to_string(), |a| a.to_string())
    );
    let keyboard = start_keyboard(&ctx, age.is_some())?;
    ctx.respond(OutgoingMessage::text(text).with_markup(keyboard))
        .await?;
    Ok(Outcome::Handled)
}

async fn open_form(ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
    ctx.input_allowing(&HANDLE_AGE, &[CANCEL]).await?;
    let text = format!("{FORM_TITLE}\nAlright. To complete this form, please write your real age");
    let keyboard = form_keyboard(&ctx)?;
    let sent = ctx
        .respond(OutgoingMessage::text(text).with_markup(keyboard))
        .await?;
    remember_prompt(&ctx, sent.message_id()).await?;
    Ok(Outcome::Handled)
}

async fn handle_age(ages: Ages, ctx: Context, args: Vec<CallbackArg>) -> Result<Outcome> {
    if let Some(prompt) = ctx.state_field(PROMPT_KEY).and_then(|v| v.as_i64()) {
        ctx.call("deleteMessage", json!({ "message_id": prompt }))
            .await?;
    }

    let answer = args
        .first()
        .and_then(CallbackArg::as_str)
        .unwrap_or_default()
        .trim();
    debug!(answer = %answer, "form answer");
    let age = match answer.parse::<i64>() {
        Ok(age) if age > 0 => age,
        _ => return wrong_age(&ctx, "You should write your age!").await,
    };
    if age < 18 {
        return wrong_age(&ctx, "You're too young for this!").await;
    }
    if age > 70 {
        return wrong_age(&ctx, "You're too old for this!").await;
    }

    ctx.reset().await?;
    if let Some(user_id) = ctx.sender_id() {
        ages.set(user_id, age);
    }
    ctx.reply(format!("{FORM_TITLE}\nSuccessfully set your age!"))
        .await?;
    show_start(ages, ctx).await
}

async fn wrong_age(ctx: &Context, reason: &str) -> Result<Outcome> {
    let keyboard = form_keyboard(ctx)?;
    let sent = ctx
        .reply(OutgoingMessage::text(format!("{FORM_TITLE}\n{reason}")).with_markup(keyboard))
        .await?;
    remember_prompt(ctx, sent.message_id()).await?;
    Ok(Outcome::Handled)
}

async fn remember_prompt(ctx: &Context, message_id: Option<i64>) -> Result<()> {
    match message_id {
        Some(id) => ctx.update_state(PROMPT_KEY, Value::from(id)).await,
        None => Ok(()),
    }
}

async fn cancel(ages: Ages, ctx: Context) -> Result<Outcome> {
    ctx.reset().await?;
    show_start(ages, ctx).await
}

async fn reset_age(ages: Ages, ctx: Context) -> Result<Outcome> {
    if let Some(user_id) = ctx.sender_id() {
        ages.remove(user_id);
    }
    let keyboard = start_keyboard(&ctx, false)?;
    ctx.edit(OutgoingMessage::text("📎 Your age was successfully reset!").with_markup(keyboard))
        .await?;
    Ok(Outcome::Handled)
}

async fn reset(ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
    ctx.reset().await?;
    ctx.reply("State cleared.").await?;
    Ok(Outcome::Handled)
}

async fn unknown(ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
    ctx.reply("Unknown action!").await?;
    Ok(Outcome::Handled)
}
