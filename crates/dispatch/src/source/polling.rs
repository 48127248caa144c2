use std::time::Duration;

use {
    courier_api::{
        Update, UpdateType,
        methods::{DeleteWebhook, GetUpdates},
    },
    courier_client::Client,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, dispatch as dispatch_metrics};

use crate::error::Result;

/// Long-polling receiver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polling {
    /// Maximum updates per `getUpdates` call (1-100).
    pub limit: u32,
    /// Server-side long-poll timeout. Keep it below the client timeout.
    pub timeout: Duration,
    /// Pause after an empty batch.
    pub idle_delay: Duration,
    /// Remove a registered webhook before the first poll.
    pub clear_webhook: bool,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            limit: 100,
            timeout: Duration::from_secs(30),
            idle_delay: Duration::from_secs(1),
            clear_webhook: true,
        }
    }
}

impl Polling {
    /// Poll until `cancel` fires, the queue closes, or a call fails.
    ///
    /// Exactly one `getUpdates` is in flight at a time. Batches are queued in
    /// order and the offset moves to one past the highest id seen.
    pub(crate) async fn receive(
        &self,
        client: &Client,
        allowed_updates: Vec<UpdateType>,
        cancel: CancellationToken,
        queue: mpsc::Sender<Update>,
    ) -> Result<()> {
        if self.clear_webhook {
            client.send(&DeleteWebhook::default()).await?;
            debug!("cleared webhook before polling");
        }

        info!(
            limit = self.limit,
            timeout_secs = self.timeout.as_secs(),
            "starting long polling"
        );
        let allowed_updates = (!allowed_updates.is_empty()).then_some(allowed_updates);
        let mut offset: Option<i64> = None;

        loop {
            let request = GetUpdates {
                offset,
                limit: Some(self.limit),
                timeout: Some(u32::try_from(self.timeout.as_secs()).unwrap_or(u32::MAX)),
                allowed_updates: allowed_updates.clone(),
            };

            let batch = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                batch = client.send(&request) => batch?,
            };

            let Some(max_id) = batch.iter().map(|update| update.update_id).max() else {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.idle_delay) => {},
                }
                continue;
            };

            debug!(?offset, count = batch.len(), "received updates");
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::UPDATES_RECEIVED_TOTAL, "source" => "polling")
                .increment(batch.len() as u64);

            // Unclassifiable updates are skipped but still move the offset.
            offset = Some(max_id + 1);
            for raw in batch {
                let update = match raw.classify() {
                    Ok(update) => update,
                    Err(e) => {
                        warn!(error = %e, "skipping update");
                        #[cfg(feature = "metrics")]
                        counter!(dispatch_metrics::UPDATES_DROPPED_TOTAL, "update_type" => "unknown")
                            .increment(1);
                        continue;
                    },
                };
                // Blocks while the queue is full.
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    sent = queue.send(update) => {
                        if sent.is_err() {
                            debug!("update queue closed, stopping polling");
                            return Ok(());
                        }
                    },
                }
            }
        }

        info!(?offset, "long polling stopped");
        Ok(())
    }
}
