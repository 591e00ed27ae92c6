//! Notification Listener
//!
//! Receives sealed openings addressed to one user and decides whether to
//! trust them. A commitment opening is only stored after the ledger confirms
//! that it recomputes to the claimed hash and sits at the claimed index.
//!
//! ```text
//! envelope ──open──▶ Notification
//!                       │
//!      ┌────────────────┼─────────────────────┐
//!      ▼                                      ▼
//!  Ft/NftCommitment                      FToken/NfToken
//!      │ own key + own contract               │
//!      │ check_correctness @ block            │
//!      ├── rejected ──▶ CorrectnessFailed     │
//!      ▼                                      ▼
//!  commitment (is_received)              public token record
//!  + transfer_incoming
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use umbra_commitment::{
    Commitment, CommitmentHash, CommitmentTransaction, PublicTokenTransaction, PublicTransferKind,
    TransactionType, ZkpPublicKey,
};
use umbra_envelope::{MessagingKeypair, SealedEnvelope};

use crate::channel::{CommitmentNotice, Notification, TokenNotice};
use crate::clients::{AssetRegistry, CorrectnessQuery, LedgerClient};
use crate::error::{ListenerError, Step};
use crate::orchestrator::bounded;
use crate::store::rocks::DuplicateCommitment;
use crate::store::{CommitmentStore, StoreBatch};

/// What a dispatched envelope did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// New commitment accepted.
    Accepted(CommitmentHash),
    /// The commitment was already stored; nothing written.
    AlreadyKnown(CommitmentHash),
    /// Public token bookkeeping recorded.
    TokenRecorded,
}

pub struct NotificationListener {
    tenant: String,
    public_key: ZkpPublicKey,
    keypair: MessagingKeypair,
    store: Arc<dyn CommitmentStore>,
    ledger: Arc<dyn LedgerClient>,
    assets: AssetRegistry,
    timeout: Duration,
}

impl NotificationListener {
    pub fn new(
        tenant: impl Into<String>,
        public_key: ZkpPublicKey,
        keypair: MessagingKeypair,
        store: Arc<dyn CommitmentStore>,
        ledger: Arc<dyn LedgerClient>,
        assets: AssetRegistry,
        timeout: Duration,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            public_key,
            keypair,
            store,
            ledger,
            assets,
            timeout,
        }
    }

    /// Open and handle one envelope.
    pub async fn dispatch(&self, envelope: &SealedEnvelope) -> Result<ListenerOutcome, ListenerError> {
        let notification: Notification = umbra_envelope::open(envelope, &self.keypair)?;
        debug!(tenant = %self.tenant, kind = notification.kind(), "notification opened");

        match notification {
            Notification::FtCommitment(notice) => self.accept_commitment(notice).await,
            Notification::NftCommitment(notice) => self.accept_commitment(notice).await,
            Notification::FToken(notice) => self.record_token(notice),
            Notification::NfToken(notice) => self.record_token(notice),
        }
    }

    /// Dispatch until `shutdown` fires or the channel closes.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<SealedEnvelope>, shutdown: CancellationToken) {
        info!(tenant = %self.tenant, "notification listener started");
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            match self.dispatch(&envelope).await {
                Ok(outcome) => debug!(tenant = %self.tenant, ?outcome, "notification handled"),
                Err(e) => warn!(tenant = %self.tenant, "notification rejected: {}", e),
            }
        }
        info!(tenant = %self.tenant, "notification listener stopped");
    }

    async fn accept_commitment(&self, notice: CommitmentNotice) -> Result<ListenerOutcome, ListenerError> {
        let class = notice.value.class();
        let ctx = self.assets.get(class);
        if notice.token_contract != ctx.token_contract {
            return Err(ListenerError::WrongContract {
                claimed: notice.token_contract,
                expected: ctx.token_contract,
            });
        }
        // Only openings committed to our own key are spendable by us.
        for owner in [notice.public_key, notice.receiver.public_key] {
            if owner != self.public_key {
                return Err(ListenerError::WrongOwner {
                    commitment: notice.commitment,
                    owner,
                });
            }
        }

        let query = CorrectnessQuery {
            value: notice.value.clone(),
            salt: notice.salt,
            public_key: notice.public_key,
            commitment: notice.commitment,
            commitment_index: notice.commitment_index,
            block_number: notice.block_number,
        };
        let report = bounded(
            Step::CheckCorrectness,
            self.timeout,
            self.ledger.check_correctness(ctx, query),
        )
        .await?;

        if !report.accepted() {
            return Err(ListenerError::CorrectnessFailed {
                commitment: notice.commitment,
                z_correct: report.z_correct,
                z_onchain_correct: report.z_onchain_correct,
            });
        }

        let mut commitment = Commitment::new(
            notice.value,
            notice.salt,
            notice.receiver.clone(),
            notice.commitment,
            notice.commitment_index,
        );
        commitment.is_received = true;
        commitment.commitment_reconciles = Some(report.z_correct);
        commitment.commitment_exists_onchain = Some(report.z_onchain_correct);

        let record = CommitmentTransaction::new(TransactionType::TransferIncoming, class)
            .outputs(vec![commitment.snapshot()])
            .sender(notice.sender)
            .receiver(notice.receiver)
            .block_number(notice.block_number);

        let written = self.store.apply(
            &self.tenant,
            StoreBatch {
                inserts: vec![commitment],
                transactions: vec![record],
                ..StoreBatch::default()
            },
        );

        match written {
            Ok(()) => {
                info!(
                    tenant = %self.tenant,
                    commitment = %notice.commitment,
                    index = notice.commitment_index,
                    "commitment received"
                );
                Ok(ListenerOutcome::Accepted(notice.commitment))
            }
            Err(e) if e.is::<DuplicateCommitment>() => {
                debug!(tenant = %self.tenant, commitment = %notice.commitment, "duplicate notification");
                Ok(ListenerOutcome::AlreadyKnown(notice.commitment))
            }
            Err(e) => Err(ListenerError::Store(e)),
        }
    }

    fn record_token(&self, notice: TokenNotice) -> Result<ListenerOutcome, ListenerError> {
        let record = PublicTokenTransaction {
            sequence: 0,
            kind: PublicTransferKind::Received,
            value: notice.value,
            shield_contract: notice.shield_contract,
            sender: Some(notice.sender),
            receiver: Some(notice.receiver),
            created_at: Utc::now(),
        };
        self.store.apply(
            &self.tenant,
            StoreBatch {
                public_transactions: vec![record],
                ..StoreBatch::default()
            },
        )?;
        info!(tenant = %self.tenant, block_number = notice.block_number, "public tokens received");
        Ok(ListenerOutcome::TokenRecorded)
    }
}
