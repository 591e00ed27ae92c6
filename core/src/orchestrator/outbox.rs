//! Notification outbox.
//!
//! An entry is written before the ledger call, filled with the opening once
//! the ledger answers, and marked delivered only after the channel accepts
//! the envelope. Entries left `Ready` are redelivered by [`Orchestrator::flush_outbox`].

use tracing::{debug, info, warn};

use umbra_commitment::MessagingKey;

use super::{Orchestrator, UserSession};
use crate::channel::Notification;
use crate::error::{Step, TransferError};
use crate::store::{OutboxEntry, OutboxState};

/// Result of one outbox flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
}

impl Orchestrator {
    pub(super) fn prepare_notice(
        &self,
        session: &UserSession,
        recipient: &str,
        recipient_key: MessagingKey,
    ) -> Result<OutboxEntry, TransferError> {
        let mut entry = OutboxEntry::prepared(recipient, recipient_key);
        entry.id = self.store.put_outbox(&session.tenant, entry.clone())?;
        Ok(entry)
    }

    /// The ledger never produced the commitments these entries describe.
    pub(super) fn abandon_notices(&self, session: &UserSession, entries: Vec<OutboxEntry>) {
        for mut entry in entries {
            entry.state = OutboxState::Abandoned;
            if let Err(e) = self.store.update_outbox(&session.tenant, &entry) {
                warn!(tenant = %session.tenant, id = entry.id, "could not abandon outbox entry: {:#}", e);
            }
        }
    }

    /// Attach the opening; the entry is now deliverable.
    pub(super) fn ready_notice(
        &self,
        session: &UserSession,
        entry: &mut OutboxEntry,
        notification: Notification,
    ) -> Result<(), TransferError> {
        entry.notification = Some(notification);
        entry.state = OutboxState::Ready;
        self.store.update_outbox(&session.tenant, entry)?;
        Ok(())
    }

    /// Seal and publish a ready entry, recording the attempt either way.
    pub(super) async fn deliver(
        &self,
        session: &UserSession,
        mut entry: OutboxEntry,
    ) -> Result<(), TransferError> {
        let result = self.publish(&entry).await;
        entry.attempts += 1;

        match &result {
            Ok(()) => {
                entry.state = OutboxState::Delivered;
                entry.last_error = None;
                debug!(tenant = %session.tenant, recipient = %entry.recipient, id = entry.id, "notification delivered");
            }
            Err(e) => {
                entry.last_error = Some(e.to_string());
                warn!(tenant = %session.tenant, recipient = %entry.recipient, id = entry.id, "notification not delivered: {}", e);
            }
        }
        self.store.update_outbox(&session.tenant, &entry)?;
        result
    }

    async fn publish(&self, entry: &OutboxEntry) -> Result<(), TransferError> {
        let notification = entry.notification.as_ref().ok_or_else(|| {
            anyhow::anyhow!("outbox entry {} has no notification attached", entry.id)
        })?;
        let envelope = umbra_envelope::seal(notification, &entry.recipient_key.0)?;
        self.call(
            Step::Publish,
            self.channel.publish(&entry.recipient_key, envelope),
        )
        .await
    }

    /// Deliver every entry a previous workflow left `Ready`.
    pub async fn flush_outbox(&self, session: &UserSession) -> Result<FlushReport, TransferError> {
        let pending = self
            .store
            .list_outbox(&session.tenant, Some(OutboxState::Ready))?;
        let mut report = FlushReport::default();

        for entry in pending {
            match self.deliver(session, entry).await {
                Ok(()) => report.delivered += 1,
                Err(TransferError::Store(e)) => return Err(TransferError::Store(e)),
                Err(_) => report.failed += 1,
            }
        }

        info!(
            tenant = %session.tenant,
            delivered = report.delivered,
            failed = report.failed,
            "outbox flushed"
        );
        Ok(report)
    }
}
