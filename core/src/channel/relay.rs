//! HTTP relay transport.
//!
//! ```text
//! POST /messages                   { recipient, envelope }
//! GET  /messages/{recipient}?after=N  → [{ id, envelope }, ...]
//! ```
//!
//! Subscriptions poll the relay from a background task until the receiver is
//! dropped or the channel is shut down.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use umbra_commitment::MessagingKey;
use umbra_envelope::SealedEnvelope;

use super::NotificationChannel;
use crate::clients::ClientError;
use crate::clients::http::JsonService;

#[derive(Serialize)]
struct PublishRequest<'a> {
    recipient: &'a MessagingKey,
    envelope: &'a SealedEnvelope,
}

#[derive(Debug, Deserialize)]
struct RelayMessage {
    id: u64,
    envelope: SealedEnvelope,
}

pub struct HttpRelayChannel {
    api: JsonService,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl HttpRelayChannel {
    pub fn new(relay_url: &str, timeout: Duration, poll_interval: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonService::new("relay", relay_url, timeout)?,
            poll_interval,
            shutdown: CancellationToken::new(),
        })
    }

    /// Stop every polling task started by [`NotificationChannel::subscribe`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn fetch(api: &JsonService, identity: &MessagingKey, after: u64) -> Result<Vec<RelayMessage>, ClientError> {
        api.get(
            &format!("messages/{}", identity),
            &[("after", after.to_string())],
        )
        .await
    }
}

#[async_trait]
impl NotificationChannel for HttpRelayChannel {
    async fn publish(&self, recipient: &MessagingKey, envelope: SealedEnvelope) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .api
            .post(
                "messages",
                &PublishRequest {
                    recipient,
                    envelope: &envelope,
                },
            )
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        identity: &MessagingKey,
    ) -> Result<mpsc::UnboundedReceiver<SealedEnvelope>, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let api = self.api.clone();
        let identity = *identity;
        let interval = self.poll_interval;
        let shutdown = self.shutdown.child_token();

        tokio::spawn(async move {
            let mut cursor = 0u64;
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                match HttpRelayChannel::fetch(&api, &identity, cursor).await {
                    Ok(messages) => {
                        for message in messages {
                            cursor = cursor.max(message.id);
                            if tx.send(message.envelope).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!(identity = %identity, "relay poll failed: {}", e),
                }
            }
            debug!(identity = %identity, "relay subscription closed");
        });

        Ok(rx)
    }
}
