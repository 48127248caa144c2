//! End-to-end runs of the dispatcher against an in-process Bot API.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use {
    axum::{Json, Router, extract::State as AxumState, http::Uri, routing::post},
    courier_api::{ScopeKey, UpdateType},
    courier_client::Client,
    courier_dispatch::{
        CommandRegistry, Context, Dispatcher, Polling, State, Webhook, handler_fn, middleware,
        source::SECRET_TOKEN_HEADER,
    },
    serde_json::{Value, json},
    tokio::sync::mpsc,
};

#[derive(Clone, Default)]
struct MockApi {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    batches: Arc<Mutex<VecDeque<Value>>>,
    /// Last command list set per serialized (scope, language_code).
    menus: Arc<Mutex<HashMap<String, Value>>>,
    /// Scripted answers by method; used before the defaults below.
    scripted: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
}

impl MockApi {
    fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn script(&self, method: &str, envelope: Value) {
        self.scripted
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(envelope);
    }
}

fn menu_key(body: &Value) -> String {
    format!("{}|{}", body["scope"], body["language_code"])
}

async fn bot_api(AxumState(api): AxumState<MockApi>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    api.calls.lock().unwrap().push((method.clone(), body.clone()));

    if let Some(envelope) = api
        .scripted
        .lock()
        .unwrap()
        .get_mut(&method)
        .and_then(VecDeque::pop_front)
    {
        return Json(envelope);
    }

    let result = match method.as_str() {
        "getMe" => json!({ "id": 99, "is_bot": true, "first_name": "Courier", "username": "courier_bot" }),
        "getUpdates" => {
            let next = api.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                None => {
                    // Stand in for a short long-poll.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    json!([])
                },
            }
        },
        "getMyCommands" => api
            .menus
            .lock()
            .unwrap()
            .get(&menu_key(&body))
            .cloned()
            .unwrap_or_else(|| json!([])),
        "setMyCommands" => {
            api.menus
                .lock()
                .unwrap()
                .insert(menu_key(&body), body["commands"].clone());
            json!(true)
        },
        "sendMessage" => json!({
            "message_id": 500,
            "date": 0,
            "chat": { "id": body["chat_id"], "type": "private" },
            "text": body["text"]
        }),
        _ => json!(true),
    };
    Json(json!({ "ok": true, "result": result }))
}

async fn mock_api() -> (Client, MockApi) {
    let api = MockApi::default();
    let app = Router::new()
        .route("/{*path}", post(bot_api))
        .with_state(api.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    let client = Client::builder("42:TEST")
        .api_url(format!("http://{addr}"))
        .build()
        .unwrap();
    (client, api)
}

fn text_update(id: i64, text: &str) -> Value {
    json!({
        "update_id": id,
        "message": {
            "message_id": id,
            "date": 0,
            "chat": { "id": 7, "type": "private" },
            "from": { "id": 3, "is_bot": false, "first_name": "Ada" },
            "text": text
        }
    })
}

fn fast_polling() -> Polling {
    Polling {
        timeout: Duration::from_secs(0),
        idle_delay: Duration::from_millis(10),
        ..Polling::default()
    }
}

#[tokio::test]
async fn start_command_is_published_and_handled() {
    let (client, api) = mock_api().await;
    api.batches
        .lock()
        .unwrap()
        .push_back(json!([text_update(10, "/start"), text_update(11, "just text")]));

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let on_start = {
        let seen_tx = seen_tx.clone();
        handler_fn(move |ctx: Context| {
            let seen_tx = seen_tx.clone();
            async move {
                ctx.reply("welcome").await?;
                let methods: Vec<String> = ctx.requests().into_iter().map(|r| r.method).collect();
                let _ = seen_tx.send(("start", ctx.update_id(), methods));
                Ok(())
            }
        })
    };
    let on_message = handler_fn(move |ctx: Context| {
        let seen_tx = seen_tx.clone();
        async move {
            let _ = seen_tx.send(("message", ctx.update_id(), Vec::new()));
            Ok(())
        }
    });

    let dispatcher = Arc::new(
        Dispatcher::builder(client)
            .polling(fast_polling())
            .workers(2)
            .middleware(middleware::recovery())
            .middleware(middleware::logging())
            .command("/start", "begin", on_start, [])
            .handle(UpdateType::Message, on_message)
            .build(),
    );
    let serving = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.serve().await }
    });

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(event);
    }
    seen.sort_by_key(|(_, id, _)| *id);
    assert_eq!(seen[0], ("start", 10, vec!["sendMessage".to_string()]));
    assert_eq!(seen[1], ("message", 11, Vec::new()));

    dispatcher.shutdown_token().cancel();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(dispatcher.state(), State::Stopped);

    let set = api.calls_to("setMyCommands");
    assert_eq!(set.len(), 1, "exactly one menu write");
    assert_eq!(set[0]["commands"], json!([{ "command": "start", "description": "begin" }]));
    assert_eq!(set[0]["scope"], json!({ "type": "default" }));
    assert_eq!(set[0].get("language_code"), None);

    let sent = api.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], 7);
    assert_eq!(sent[0]["text"], "welcome");

    let calls = api.calls.lock().unwrap();
    let order: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).take(4).collect();
    assert_eq!(order, vec!["getMe", "getMyCommands", "setMyCommands", "deleteWebhook"]);
    let first_poll = calls.iter().find(|(m, _)| m == "getUpdates").unwrap();
    assert_eq!(first_poll.1["allowed_updates"], json!(["message"]));
}

#[tokio::test]
async fn command_sync_is_idempotent() {
    let (client, api) = mock_api().await;
    let mut registry = CommandRegistry::new();
    let noop = handler_fn(|_ctx| async { Ok(()) });
    registry
        .add_command("start", "begin", noop.clone(), [])
        .add_command("ban", "ban a member", noop.clone(), [
            ScopeKey::chat_administrators(-100),
        ])
        .add_localized_command("help", [("de", "Hilfe")], noop, []);

    let first = registry.sync(&client).await.unwrap();
    assert_eq!(first.updated.len(), 3);
    assert!(first.unchanged.is_empty());

    let second = registry.sync(&client).await.unwrap();
    assert!(second.updated.is_empty());
    assert_eq!(second.unchanged.len(), 3);

    assert_eq!(api.calls_to("setMyCommands").len(), 3);
    assert_eq!(api.calls_to("getMyCommands").len(), 6);
}

#[tokio::test]
async fn remote_menu_in_a_different_order_is_left_alone() {
    let (client, api) = mock_api().await;
    api.script(
        "getMyCommands",
        json!({ "ok": true, "result": [
            { "command": "help", "description": "show help" },
            { "command": "start", "description": "begin" }
        ]}),
    );
    let noop = handler_fn(|_ctx| async { Ok(()) });
    let mut registry = CommandRegistry::new();
    registry
        .add_command("start", "begin", noop.clone(), [])
        .add_command("help", "show help", noop, []);

    let report = registry.sync(&client).await.unwrap();
    assert_eq!(report.unchanged, vec![ScopeKey::default()]);
    assert!(api.calls_to("setMyCommands").is_empty());
}

#[tokio::test]
async fn no_update_reaches_a_handler_after_shutdown() {
    let (client, api) = mock_api().await;
    {
        let mut batches = api.batches.lock().unwrap();
        for batch in 0..20 {
            let updates: Vec<Value> = (0..5)
                .map(|i| text_update(batch * 5 + i + 1, "hello"))
                .collect();
            batches.push_back(Value::Array(updates));
        }
    }
    // A rate-limited close must not fail the shutdown.
    api.script(
        "close",
        json!({ "ok": false, "error_code": 429, "description": "Too Many Requests", "parameters": { "retry_after": 600 } }),
    );

    let handled = Arc::new(AtomicUsize::new(0));
    let entries: Arc<Mutex<Vec<(Instant, bool)>>> = Arc::default();
    let (first_tx, mut first_rx) = mpsc::unbounded_channel::<()>();
    let on_message = {
        let handled = Arc::clone(&handled);
        let entries = Arc::clone(&entries);
        handler_fn(move |ctx: Context| {
            let handled = Arc::clone(&handled);
            let entries = Arc::clone(&entries);
            let first_tx = first_tx.clone();
            async move {
                entries
                    .lock()
                    .unwrap()
                    .push((Instant::now(), ctx.cancellation().is_cancelled()));
                handled.fetch_add(1, Ordering::SeqCst);
                let _ = first_tx.send(());
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }
        })
    };

    let dispatcher = Arc::new(
        Dispatcher::builder(client)
            .polling(fast_polling())
            .workers(2)
            .queue_capacity(1)
            .close_on_shutdown(true)
            .handle(UpdateType::Message, on_message)
            .build(),
    );
    let mut states = dispatcher.subscribe_state();
    let serving = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.serve().await }
    });

    tokio::time::timeout(Duration::from_secs(5), first_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*states.borrow_and_update(), State::Running);
    let cancelled_at = Instant::now();
    dispatcher.shutdown_token().cancel();

    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let after_stop = handled.load(Ordering::SeqCst);
    assert!(after_stop < 100, "shutdown must not drain the backlog");
    for (entered_at, cancelled) in entries.lock().unwrap().iter() {
        assert!(!cancelled, "a handler started after cancellation");
        assert!(*entered_at < cancelled_at, "a handler started after cancellation");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handled.load(Ordering::SeqCst), after_stop);
    assert_eq!(dispatcher.state(), State::Stopped);
    assert_eq!(api.calls_to("close").len(), 1, "close is not retried");
}

#[tokio::test]
async fn webhook_deliveries_are_dispatched() {
    let (client, api) = mock_api().await;
    let listen_addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let on_button = handler_fn(move |ctx: Context| {
        let seen_tx = seen_tx.clone();
        async move {
            let data = ctx.callback_query().and_then(|q| q.data.clone());
            let _ = seen_tx.send(data);
            Ok(())
        }
    });

    let webhook = Webhook::new("https://bot.example.com", listen_addr)
        .path("telegram")
        .secret_token("s3cret");
    let dispatcher = Arc::new(
        Dispatcher::builder(client)
            .webhook(webhook)
            .workers(1)
            .handle(UpdateType::CallbackQuery, on_button)
            .build(),
    );
    let serving = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.serve().await }
    });

    let update = json!({
        "update_id": 1,
        "callback_query": {
            "id": "q",
            "from": { "id": 3, "is_bot": false, "first_name": "Ada" },
            "chat_instance": "c",
            "data": "pressed"
        }
    });
    let http = reqwest::Client::new();
    let endpoint = format!("http://{listen_addr}/telegram");
    let mut status = None;
    for _ in 0..50 {
        match http
            .post(&endpoint)
            .header(SECRET_TOKEN_HEADER, "s3cret")
            .json(&update)
            .send()
            .await
        {
            Ok(response) => {
                status = Some(response.status());
                break;
            },
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    assert_eq!(status, Some(reqwest::StatusCode::OK));

    let data = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data.as_deref(), Some("pressed"));

    let rejected = http.post(&endpoint).json(&update).send().await.unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::UNAUTHORIZED);

    dispatcher.shutdown_token().cancel();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let registered = api.calls_to("setWebhook");
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0]["url"], "https://bot.example.com/telegram");
    assert_eq!(registered[0]["secret_token"], "s3cret");
    assert_eq!(registered[0]["allowed_updates"], json!(["callback_query"]));
    assert!(api.calls_to("getUpdates").is_empty());
}
