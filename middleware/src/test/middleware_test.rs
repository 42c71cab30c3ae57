//! Unit tests for LoggingMiddleware and AllowlistMiddleware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::{ActionRef, Api, CallbackArg, Result, Update};
use handler_chain::{Action, Bot, Context, Outcome};
use serde_json::{json, Value};

use crate::{AllowlistMiddleware, LoggingMiddleware};

const LOG: ActionRef = ActionRef::new("log");
const AUTH: ActionRef = ActionRef::new("auth");
const ECHO: ActionRef = ActionRef::new("echo");

struct NullApi;

#[async_trait]
impl Api for NullApi {
    async fn call(&self, _method: &str, _params: Value) -> Result<Value> {
        Ok(json!({ "ok": true, "result": true }))
    }
}

struct Counter(Arc<AtomicUsize>);

#[async_trait]
impl Action for Counter {
    async fn run(&self, _ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Handled)
    }
}

fn sample_update(user_id: i64, text: &str) -> Update {
    Update::from_json(json!({
        "update_id": 5,
        "message": {
            "message_id": 1,
            "from": { "id": user_id, "is_bot": false, "first_name": "Test", "username": "testuser" },
            "chat": { "id": 123, "type": "private" },
            "text": text
        }
    }))
    .unwrap()
}

fn bot(allowed: Vec<i64>, echo_count: Arc<AtomicUsize>) -> Bot {
    Bot::builder(Arc::new(NullApi))
        .stateless()
        .observer(Arc::new(LoggingMiddleware))
        .action(LOG, LoggingMiddleware)
        .unwrap()
        .action(AUTH, AllowlistMiddleware::new(allowed))
        .unwrap()
        .action(ECHO, Counter(echo_count))
        .unwrap()
        .use_always(LOG)
        .use_always(AUTH)
        .on("message", ECHO)
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_logging_middleware_passes() {
    let count = Arc::new(AtomicUsize::new(0));
    let report = bot(vec![100], count.clone())
        .process(sample_update(100, "hello"))
        .await
        .unwrap();
    assert!(report.handled);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// **Test: dated and undated updates both pass the logger.**
#[tokio::test]
async fn test_logging_middleware_passes_dated_update() {
    let count = Arc::new(AtomicUsize::new(0));
    let dated = Update::from_json(json!({
        "update_id": 6,
        "message": {
            "message_id": 2,
            "date": 1_700_000_000,
            "from": { "id": 100, "is_bot": false, "first_name": "Test" },
            "chat": { "id": 100, "type": "private" },
            "text": "hello"
        }
    }))
    .unwrap();
    assert!(dated.age().is_some_and(|age| age > 0));

    let bot = bot(vec![100], count.clone());
    assert!(bot.process(dated).await.unwrap().handled);
    assert!(bot.process(sample_update(100, "undated")).await.unwrap().handled);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_allowlist_stops_unknown_sender() {
    let count = Arc::new(AtomicUsize::new(0));
    let report = bot(vec![100, 200], count.clone())
        .process(sample_update(999, "hello"))
        .await
        .unwrap();
    assert!(report.handled);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_allowlist_stops_updates_without_sender() {
    let count = Arc::new(AtomicUsize::new(0));
    let update = Update::from_json(json!({
        "update_id": 6,
        "channel_post": { "message_id": 1, "chat": { "id": -100, "type": "channel" }, "text": "news" }
    }))
    .unwrap();
    bot(vec![100], count.clone()).process(update).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_allowlist_membership() {
    let mw = AllowlistMiddleware::new([1, 2, 3]);
    assert!(mw.is_allowed(2));
    assert!(!mw.is_allowed(4));
}
