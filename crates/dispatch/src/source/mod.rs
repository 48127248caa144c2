//! Update sources: long polling or a webhook listener.
//!
//! Both push updates onto the dispatcher queue in arrival order and return
//! when cancelled or on a fatal error. The queue sender is owned by the
//! source, so the queue closes exactly when the source has returned.

mod polling;
mod webhook;

pub use {
    polling::Polling,
    webhook::{SECRET_TOKEN_HEADER, Webhook},
};

use {
    courier_api::{Update, UpdateType},
    courier_client::Client,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

use crate::error::Result;

#[derive(Debug, Clone)]
pub enum UpdateSource {
    Polling(Polling),
    Webhook(Webhook),
}

impl UpdateSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Polling(_) => "polling",
            Self::Webhook(_) => "webhook",
        }
    }

    pub(crate) async fn receive(
        &self,
        client: &Client,
        allowed_updates: Vec<UpdateType>,
        cancel: CancellationToken,
        queue: mpsc::Sender<Update>,
    ) -> Result<()> {
        match self {
            Self::Polling(polling) => {
                polling
                    .receive(client, allowed_updates, cancel, queue)
                    .await
            },
            Self::Webhook(webhook) => {
                webhook
                    .receive(client, allowed_updates, cancel, queue)
                    .await
            },
        }
    }
}

impl From<Polling> for UpdateSource {
    fn from(polling: Polling) -> Self {
        Self::Polling(polling)
    }
}

impl From<Webhook> for UpdateSource {
    fn from(webhook: Webhook) -> Self {
        Self::Webhook(webhook)
    }
}
