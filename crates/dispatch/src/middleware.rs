//! Handler wrappers.
//!
//! A [`Middleware`] turns a handler into another handler. The dispatcher
//! applies them to every command and update-type handler, the first one
//! registered being the outermost.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    futures::{FutureExt, future::BoxFuture},
    tracing::{debug, error, warn},
};

use crate::{
    context::Context,
    handler::{BoxError, Handler, HandlerResult},
};

pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wrap a closure as a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Log every handled update with the time spent in the handler itself, not
/// counting outbound API calls made through the context.
pub fn logging() -> Middleware {
    middleware_fn(|next: Handler| -> Handler {
        Arc::new(move |ctx: Context| -> BoxFuture<'static, HandlerResult> {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let started = Instant::now();
                let result = next(ctx.clone()).await;
                let elapsed = started.elapsed();

                let requests = ctx.requests();
                let api_time: Duration = requests.iter().map(|r| r.duration).sum();
                let handler_ms = elapsed.saturating_sub(api_time).as_millis() as u64;
                let api_ms = api_time.as_millis() as u64;

                match &result {
                    Ok(()) => debug!(
                        update_id = ctx.update_id(),
                        update_type = %ctx.update_type(),
                        handler_ms,
                        api_ms,
                        requests = requests.len(),
                        "update handled"
                    ),
                    Err(e) => warn!(
                        update_id = ctx.update_id(),
                        update_type = %ctx.update_type(),
                        handler_ms,
                        api_ms,
                        requests = requests.len(),
                        error = %e,
                        "update handler failed"
                    ),
                }
                result
            })
        })
    })
}

/// Turn a handler panic into an error so the worker keeps running.
pub fn recovery() -> Middleware {
    middleware_fn(|next: Handler| -> Handler {
        Arc::new(move |ctx: Context| -> BoxFuture<'static, HandlerResult> {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let update_id = ctx.update_id();
                match AssertUnwindSafe(next(ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(update_id, panic = %message, "update handler panicked");
                        Err(BoxError::from(format!("handler panicked: {message}")))
                    },
                }
            })
        })
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Wrap `handler` so that `chain[0]` runs first.
pub(crate) fn apply(chain: &[Middleware], handler: Handler) -> Handler {
    chain
        .iter()
        .rev()
        .fold(handler, |inner, middleware| middleware(inner))
}
