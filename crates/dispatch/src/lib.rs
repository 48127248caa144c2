//! Update intake and dispatch for courier bots.
//!
//! A [`Dispatcher`] pulls updates from one [`UpdateSource`] (long polling or
//! a webhook listener), queues them, and lets a fixed pool of workers route
//! each update to a command handler or to the handler for its update type.
//!
//! ```rust,ignore
//! let client = courier_client::Client::new(token)?;
//! let dispatcher = Dispatcher::builder(client)
//!     .middleware(middleware::recovery())
//!     .command("start", "begin", handler_fn(start), [])
//!     .handle(UpdateType::CallbackQuery, handler_fn(on_button))
//!     .build();
//! dispatcher.serve().await?;
//! ```

pub mod commands;
mod context;
mod dispatcher;
pub mod error;
mod handler;
pub mod middleware;
pub mod source;

pub use {
    commands::{CommandRegistry, SyncReport},
    context::Context,
    dispatcher::{Dispatcher, DispatcherBuilder, State},
    error::{ConfigError, Error, Result},
    handler::{BoxError, Handler, HandlerResult, handler_fn},
    middleware::Middleware,
    source::{Polling, UpdateSource, Webhook},
};
