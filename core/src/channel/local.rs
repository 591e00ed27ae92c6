//! In-process broker.
//!
//! One mailbox per messaging identity. Envelopes published before anyone
//! subscribes are held and handed over on the first subscription.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use umbra_commitment::MessagingKey;
use umbra_envelope::SealedEnvelope;

use super::NotificationChannel;
use crate::clients::ClientError;

#[derive(Debug, Default)]
struct Mailbox {
    subscriber: Option<mpsc::UnboundedSender<SealedEnvelope>>,
    backlog: Vec<SealedEnvelope>,
}

#[derive(Debug, Default)]
pub struct LocalChannel {
    mailboxes: DashMap<MessagingKey, Mailbox>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes waiting for `identity` to subscribe.
    pub fn pending(&self, identity: &MessagingKey) -> usize {
        self.mailboxes
            .get(identity)
            .map(|m| m.backlog.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationChannel for LocalChannel {
    async fn publish(&self, recipient: &MessagingKey, envelope: SealedEnvelope) -> Result<(), ClientError> {
        let mut mailbox = self.mailboxes.entry(*recipient).or_default();

        let undelivered = match &mailbox.subscriber {
            Some(tx) => tx.send(envelope).err().map(|e| e.0),
            None => Some(envelope),
        };

        if let Some(envelope) = undelivered {
            // Subscriber gone or not yet attached.
            mailbox.subscriber = None;
            mailbox.backlog.push(envelope);
            debug!(recipient = %recipient, backlog = mailbox.backlog.len(), "envelope queued");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        identity: &MessagingKey,
    ) -> Result<mpsc::UnboundedReceiver<SealedEnvelope>, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mailbox = self.mailboxes.entry(*identity).or_default();

        for envelope in mailbox.backlog.drain(..) {
            let _ = tx.send(envelope);
        }
        mailbox.subscriber = Some(tx);
        Ok(rx)
    }
}
