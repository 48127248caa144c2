use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use {
    courier_api::{
        ScopeKey, Update, UpdateKind, UpdateType,
        methods::{Close, GetMe},
    },
    courier_client::Client,
    tokio::{
        sync::{Mutex, mpsc, watch},
        task::JoinSet,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, trace, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, dispatch as dispatch_metrics, gauge, histogram};

use crate::{
    commands::{CommandRegistry, SyncReport},
    context::Context,
    error::{ConfigError, Error, Result},
    handler::Handler,
    middleware::{self, Middleware},
    source::{Polling, UpdateSource, Webhook},
};

const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Lifecycle of a [`Dispatcher`]. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Idle,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// Which handler an update was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route<'a> {
    Command(&'a str),
    UpdateType(UpdateType),
}

/// Handlers and commands, fixed once the dispatcher is built.
struct Routes {
    commands: CommandRegistry,
    by_type: HashMap<UpdateType, Handler>,
}

impl Routes {
    /// Command handler first, then the handler for the update type.
    fn route<'u>(&self, update: &'u Update, bot_username: Option<&str>) -> Option<(Route<'u>, &Handler)> {
        if let UpdateKind::Message(message) = &update.kind
            && let Some(token) = message.command()
            && token.is_addressed_to(bot_username)
            && let Some(handler) = self.commands.get_handler(token.name)
        {
            return Some((Route::Command(token.name), handler));
        }

        let update_type = update.update_type();
        self.by_type
            .get(&update_type)
            .map(|handler| (Route::UpdateType(update_type), handler))
    }

    /// Update types to request from the service: every type with a handler,
    /// plus messages when commands exist.
    fn allowed_updates(&self) -> Vec<UpdateType> {
        let mut allowed: BTreeSet<UpdateType> = self.by_type.keys().copied().collect();
        if !self.commands.is_empty() {
            allowed.insert(UpdateType::Message);
        }
        allowed.into_iter().collect()
    }
}

pub struct DispatcherBuilder {
    client: Client,
    commands: CommandRegistry,
    by_type: HashMap<UpdateType, Handler>,
    middleware: Vec<Middleware>,
    polling: Option<Polling>,
    webhook: Option<Webhook>,
    workers: usize,
    queue_capacity: usize,
    close_on_shutdown: bool,
}

impl DispatcherBuilder {
    /// Number of worker tasks. Defaults to the number of available cores.
    /// With more than one worker, handlers for different updates may finish
    /// out of arrival order.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Bound of the update queue. A full queue stalls the source.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn polling(mut self, polling: Polling) -> Self {
        self.polling = Some(polling);
        self
    }

    #[must_use]
    pub fn webhook(mut self, webhook: Webhook) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// Call `close` after shutdown, as required before moving the bot to
    /// another server.
    #[must_use]
    pub fn close_on_shutdown(mut self, close: bool) -> Self {
        self.close_on_shutdown = close;
        self
    }

    /// Handle every update of `update_type` not claimed by a command.
    #[must_use]
    pub fn handle(mut self, update_type: UpdateType, handler: Handler) -> Self {
        self.by_type.insert(update_type, handler);
        self
    }

    #[must_use]
    pub fn command(
        mut self,
        name: &str,
        description: &str,
        handler: Handler,
        scopes: impl IntoIterator<Item = ScopeKey>,
    ) -> Self {
        self.commands.add_command(name, description, handler, scopes);
        self
    }

    #[must_use]
    pub fn localized_command<L, D>(
        mut self,
        name: &str,
        descriptions: impl IntoIterator<Item = (L, D)>,
        handler: Handler,
        scopes: impl IntoIterator<Item = ScopeKey>,
    ) -> Self
    where
        L: Into<String>,
        D: AsRef<str>,
    {
        self.commands
            .add_localized_command(name, descriptions, handler, scopes);
        self
    }

    /// Wrap every handler; the first middleware added runs outermost.
    #[must_use]
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Finish building. Configuration problems are reported by
    /// [`Dispatcher::serve`], all at once.
    pub fn build(self) -> Dispatcher {
        let mut errors = self.commands.errors().to_vec();
        let source = match (self.polling, self.webhook) {
            (Some(_), Some(_)) => {
                errors.push(ConfigError::ConflictingSources);
                None
            },
            (None, Some(webhook)) => Some(UpdateSource::Webhook(webhook)),
            (polling, None) => Some(UpdateSource::Polling(polling.unwrap_or_default())),
        };
        if let Some(UpdateSource::Webhook(webhook)) = &source
            && let Err(e) = webhook.webhook_url()
        {
            errors.push(e);
        }
        if self.workers == 0 {
            errors.push(ConfigError::ZeroWorkers);
        }
        if self.queue_capacity == 0 {
            errors.push(ConfigError::ZeroQueueCapacity);
        }

        let mut commands = self.commands;
        let mut by_type = self.by_type;
        let chain = self.middleware;
        if !chain.is_empty() {
            commands.wrap_handlers(|handler| middleware::apply(&chain, handler));
            for handler in by_type.values_mut() {
                *handler = middleware::apply(&chain, handler.clone());
            }
        }

        let (state, _) = watch::channel(State::Idle);
        Dispatcher {
            client: self.client,
            routes: Arc::new(Routes { commands, by_type }),
            source,
            errors,
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            close_on_shutdown: self.close_on_shutdown,
            cancel: CancellationToken::new(),
            state,
        }
    }
}

/// Receives updates from one source and runs them through a pool of workers.
pub struct Dispatcher {
    client: Client,
    routes: Arc<Routes>,
    source: Option<UpdateSource>,
    errors: Vec<ConfigError>,
    workers: usize,
    queue_capacity: usize,
    close_on_shutdown: bool,
    cancel: CancellationToken,
    state: watch::Sender<State>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("source", &self.source.as_ref().map(UpdateSource::name))
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder(client: Client) -> DispatcherBuilder {
        DispatcherBuilder {
            client,
            commands: CommandRegistry::new(),
            by_type: HashMap::new(),
            middleware: Vec::new(),
            polling: None,
            webhook: None,
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            close_on_shutdown: false,
        }
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Cancel this token to stop [`Dispatcher::serve`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.routes.commands
    }

    pub fn allowed_updates(&self) -> Vec<UpdateType> {
        self.routes.allowed_updates()
    }

    /// Publish the command menu without serving.
    pub async fn sync_commands(&self) -> Result<SyncReport> {
        self.validate()?;
        Ok(self.routes.commands.sync(&self.client).await?)
    }

    /// Run until the shutdown token is cancelled or the source fails.
    ///
    /// Startup checks the configuration, verifies the token with `getMe`,
    /// syncs the command menu and starts the workers before the source. On
    /// the way out the source is stopped first, then the workers, then the
    /// optional `close` call is made.
    pub async fn serve(&self) -> Result<()> {
        let started = self.state.send_if_modified(|state| {
            if *state == State::Idle {
                *state = State::Initializing;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(Error::message("dispatcher has already been started"));
        }

        let result = self.run().await;
        if let Err(e) = &result {
            error!(error = %e, "dispatcher stopped with an error");
        }
        self.state.send_replace(State::Stopped);
        result
    }

    fn validate(&self) -> Result<&UpdateSource> {
        match &self.source {
            Some(source) if self.errors.is_empty() => Ok(source),
            _ => Err(Error::Config(self.errors.clone())),
        }
    }

    async fn run(&self) -> Result<()> {
        let source = self.validate()?;

        let me = self.client.send(&GetMe {}).await?;
        let bot_username: Option<Arc<str>> = me.username.as_deref().map(Arc::from);
        info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or_default(),
            "connected to Bot API"
        );

        let report = self.routes.commands.sync(&self.client).await?;
        debug!(
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            "command menu synced"
        );

        let (queue, receiver) = mpsc::channel(self.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(work(Worker {
                id: worker,
                queue: Arc::clone(&receiver),
                routes: Arc::clone(&self.routes),
                client: self.client.clone(),
                cancel: self.cancel.clone(),
                bot_username: bot_username.clone(),
            }));
        }

        self.state.send_replace(State::Running);
        info!(
            source = source.name(),
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            "dispatcher running"
        );

        // The source owns the only sender; the queue closes when it returns.
        let received = source
            .receive(
                &self.client,
                self.routes.allowed_updates(),
                self.cancel.clone(),
                queue,
            )
            .await;

        self.state.send_replace(State::ShuttingDown);
        info!("dispatcher shutting down");
        self.cancel.cancel();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task failed");
            }
        }

        if self.close_on_shutdown {
            match self.client.send_once(&Close {}).await {
                Ok(_) => info!("bot instance closed"),
                Err(e) if e.is_rate_limited() => warn!(
                    retry_after_secs = e.retry_after().unwrap_or_default().as_secs(),
                    "close call rate limited, skipping"
                ),
                Err(e) => warn!(error = %e, "close call failed"),
            }
        }

        info!("dispatcher stopped");
        received
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Update>>>,
    routes: Arc<Routes>,
    client: Client,
    cancel: CancellationToken,
    bot_username: Option<Arc<str>>,
}

/// Take one update at a time until cancelled or the queue closes.
async fn work(worker: Worker) {
    debug!(worker = worker.id, "worker started");
    loop {
        let next = {
            let mut queue = tokio::select! {
                biased;
                () = worker.cancel.cancelled() => break,
                queue = worker.queue.lock() => queue,
            };
            #[cfg(feature = "metrics")]
            gauge!(dispatch_metrics::QUEUE_DEPTH).set(queue.len() as f64);
            tokio::select! {
                biased;
                () = worker.cancel.cancelled() => break,
                next = queue.recv() => next,
            }
        };
        let Some(update) = next else {
            break;
        };
        if worker.cancel.is_cancelled() {
            break;
        }
        dispatch(&worker, update).await;
    }
    debug!(worker = worker.id, "worker stopped");
}

async fn dispatch(worker: &Worker, update: Update) {
    let update_id = update.update_id;
    let update_type = update.update_type();
    let Some((route, handler)) = worker
        .routes
        .route(&update, worker.bot_username.as_deref())
    else {
        trace!(update_id, %update_type, "no handler, dropping update");
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::UPDATES_DROPPED_TOTAL, "update_type" => update_type.as_str())
            .increment(1);
        return;
    };

    let route_label = match route {
        Route::Command(name) => format!("/{name}"),
        Route::UpdateType(kind) => kind.to_string(),
    };
    trace!(worker = worker.id, update_id, route = %route_label, "dispatching update");
    let handler = Arc::clone(handler);
    let ctx = Context::new(update, worker.client.clone(), worker.cancel.clone());

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();
    #[cfg(feature = "metrics")]
    gauge!(dispatch_metrics::WORKERS_BUSY).increment(1.0);

    let result = handler(ctx).await;

    #[cfg(feature = "metrics")]
    {
        gauge!(dispatch_metrics::WORKERS_BUSY).decrement(1.0);
        histogram!(dispatch_metrics::HANDLER_DURATION_SECONDS, "update_type" => update_type.as_str())
            .record(started.elapsed().as_secs_f64());
        counter!(dispatch_metrics::UPDATES_HANDLED_TOTAL, "update_type" => update_type.as_str())
            .increment(1);
        if result.is_err() {
            counter!(dispatch_metrics::HANDLER_ERRORS_TOTAL, "update_type" => update_type.as_str())
                .increment(1);
        }
    }

    if let Err(e) = result {
        warn!(update_id, %update_type, route = %route_label, error = %e, "handler returned an error");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::handler::handler_fn,
        serde_json::json,
        std::time::Duration,
    };

    fn client() -> Client {
        Client::builder("1:T")
            .api_url("http://127.0.0.1:9")
            .build()
            .unwrap()
    }

    fn noop() -> Handler {
        handler_fn(|_ctx| async { Ok(()) })
    }

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    fn text(id: i64, text: &str) -> Update {
        update(json!({
            "update_id": id,
            "message": { "message_id": id, "date": 0, "chat": { "id": 1, "type": "private" }, "text": text }
        }))
    }

    fn routes(dispatcher: &Dispatcher) -> &Routes {
        &dispatcher.routes
    }

    #[test]
    fn commands_take_precedence_over_type_handlers() {
        let dispatcher = Dispatcher::builder(client())
            .handle(UpdateType::Message, noop())
            .command("start", "begin", noop(), [])
            .build();
        let routes = routes(&dispatcher);

        let start = text(1, "/start now");
        assert_eq!(routes.route(&start, Some("courier_bot")).map(|r| r.0), Some(Route::Command("start")));

        let mentioned = text(2, "/start@Courier_Bot");
        assert_eq!(routes.route(&mentioned, Some("courier_bot")).map(|r| r.0), Some(Route::Command("start")));

        let plain = text(3, "hello");
        assert_eq!(
            routes.route(&plain, Some("courier_bot")).map(|r| r.0),
            Some(Route::UpdateType(UpdateType::Message))
        );

        let unknown = text(4, "/stop");
        assert_eq!(
            routes.route(&unknown, Some("courier_bot")).map(|r| r.0),
            Some(Route::UpdateType(UpdateType::Message))
        );
    }

    #[test]
    fn commands_for_other_bots_are_not_ours() {
        let dispatcher = Dispatcher::builder(client())
            .command("start", "begin", noop(), [])
            .build();
        let other = text(1, "/start@other_bot");
        assert!(routes(&dispatcher).route(&other, Some("courier_bot")).is_none());
    }

    #[test]
    fn unmatched_updates_are_dropped() {
        let dispatcher = Dispatcher::builder(client())
            .handle(UpdateType::CallbackQuery, noop())
            .build();
        let edited = update(json!({
            "update_id": 5,
            "edited_message": { "message_id": 1, "date": 0, "chat": { "id": 1, "type": "private" }, "text": "/start" }
        }));
        assert!(routes(&dispatcher).route(&edited, None).is_none());
        assert!(routes(&dispatcher).route(&text(6, "/start"), None).is_none());
    }

    #[test]
    fn allowed_updates_follow_registered_handlers() {
        let dispatcher = Dispatcher::builder(client())
            .handle(UpdateType::CallbackQuery, noop())
            .handle(UpdateType::EditedMessage, noop())
            .command("help", "show help", noop(), [])
            .build();
        assert_eq!(dispatcher.allowed_updates(), vec![
            UpdateType::Message,
            UpdateType::EditedMessage,
            UpdateType::CallbackQuery,
        ]);
    }

    #[tokio::test]
    async fn configuration_errors_are_reported_together() {
        let dispatcher = Dispatcher::builder(client())
            .polling(Polling::default())
            .webhook(Webhook::new("https://bot.example.com", "127.0.0.1:0".parse().unwrap()))
            .workers(0)
            .command("start", "", noop(), [])
            .build();

        let err = dispatcher.serve().await.unwrap_err();
        assert_eq!(err.config_errors(), &[
            ConfigError::EmptyDescription {
                command: "start".into()
            },
            ConfigError::ConflictingSources,
            ConfigError::ZeroWorkers,
        ]);
        assert_eq!(dispatcher.state(), State::Stopped);
    }

    #[tokio::test]
    async fn serve_runs_once() {
        let dispatcher = Dispatcher::builder(client()).workers(0).build();
        let mut states = dispatcher.subscribe_state();
        assert!(dispatcher.serve().await.is_err());
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), State::Stopped);

        let err = tokio::time::timeout(Duration::from_secs(1), dispatcher.serve())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("already been started"));
    }
}
