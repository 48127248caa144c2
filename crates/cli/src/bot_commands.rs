use std::net::SocketAddr;

use {
    anyhow::Result,
    axum::{Router, http::header, routing::get},
    courier_dispatch::{Dispatcher, State},
    courier_metrics::{MetricsHandle, MetricsRecorderConfig},
    tracing::{debug, info, warn},
};

use crate::setup::{self, Loaded};

/// Serve until ctrl-c or a fatal source error.
pub async fn run(loaded: Loaded) -> Result<()> {
    let config = setup::validated(loaded)?;
    let client = setup::client(&config)?;
    let dispatcher = setup::dispatcher(&config, client)?;

    let metrics = courier_metrics::init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;
    if let Some(addr) = config.metrics.listen_addr.filter(|_| config.metrics.enabled) {
        spawn_metrics_endpoint(addr, metrics, &dispatcher).await?;
    }

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "cannot listen for ctrl-c; stop the process to exit"),
        }
        shutdown.cancel();
    });

    let mut state = dispatcher.subscribe_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            debug!(state = ?current, "dispatcher state changed");
            if current == State::Stopped {
                break;
            }
        }
    });

    dispatcher.serve().await?;
    Ok(())
}

/// Publish the configured command menu, then exit.
pub async fn sync_commands(loaded: Loaded) -> Result<()> {
    let config = setup::validated(loaded)?;
    let client = setup::client(&config)?;
    let dispatcher = setup::dispatcher(&config, client)?;

    let report = dispatcher.sync_commands().await?;
    for scope in &report.updated {
        println!("updated    {scope}");
    }
    for scope in &report.unchanged {
        println!("unchanged  {scope}");
    }
    if report.updated.is_empty() && report.unchanged.is_empty() {
        println!("No commands configured.");
    }
    Ok(())
}

async fn spawn_metrics_endpoint(
    addr: SocketAddr,
    metrics: MetricsHandle,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move {
                (
                    [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
                    metrics.render(),
                )
            }
        }),
    );
    let shutdown = dispatcher.shutdown_token();
    info!(%addr, "serving metrics");
    tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            warn!(error = %e, "metrics endpoint failed");
        }
    });
    Ok(())
}
