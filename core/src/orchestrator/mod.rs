//! Transfer Orchestrator
//!
//! Drives every shielded workflow across the four collaborators and keeps
//! the user's store consistent with what the ledger accepted.
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐   ┌─────────┐
//! │  validate  │──▶│  directory  │──▶│  outbox  │──▶│  ledger  │──▶│  store  │
//! │ (no calls) │   │ keys, acct  │   │ prepared │   │  proof   │   │  batch  │
//! └────────────┘   └─────────────┘   └──────────┘   └──────────┘   └────┬────┘
//!                                                                       │
//!                                                        ┌──────────────▼───┐
//!                                                        │ seal + publish   │
//!                                                        │ outbox delivered │
//!                                                        └──────────────────┘
//! ```
//!
//! Validation failures write nothing, except an overspent batch. Any failure
//! after validation appends an `is_failed` transaction with the intended
//! inputs and outputs and returns the original error. Nothing is retried.

mod batch;
mod burn;
mod nft;
mod outbox;
mod transfer;

pub use batch::{BatchOutput, BatchPlan, BatchSlot, SlotRole};
pub use outbox::FlushReport;

use futures::future::try_join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use umbra_commitment::{
    Address, AssetClass, Commitment, CommitmentHash, CommitmentSnapshot, CommitmentTransaction,
    FtValue, Identity, MessagingKey, ZkpPublicKey, ZkpSecretKey,
};
use umbra_config::UmbraConfig;

use crate::channel::NotificationChannel;
use crate::clients::{
    AccountProvisioning, AssetContext, AssetRegistry, ClientError, KeyDirectory, LedgerClient,
    TxReceipt,
};
use crate::error::{CallFailure, Step, TransferError, ValidationError};
use crate::store::{CommitmentStore, Page, StoreBatch, UserRecord};

/// Per-call bounds for external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Directory, accounts and channel.
    pub call: Duration,
    /// Proof generation included.
    pub ledger: Duration,
}

impl Timeouts {
    pub fn from_config(cfg: &UmbraConfig) -> Self {
        Self {
            call: cfg.call_timeout(),
            ledger: cfg.ledger_timeout(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            call: Duration::from_secs(30),
            ledger: Duration::from_secs(300),
        }
    }
}

/// The user a workflow runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub tenant: String,
    pub identity: Identity,
}

impl UserSession {
    pub fn from_record(user: &UserRecord) -> Self {
        Self {
            tenant: user.name.clone(),
            identity: user.identity(),
        }
    }
}

/// Result of a spend that produced new commitments.
#[derive(Debug, Clone)]
pub struct SpendOutcome {
    pub receipt: TxReceipt,
    /// Outputs as recorded on the transaction.
    pub outputs: Vec<CommitmentSnapshot>,
    /// Change kept by the sender, if any.
    pub change: Option<Commitment>,
}

/// Receiver of a spend, resolved through the directory.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedReceiver {
    pub name: String,
    pub public_key: ZkpPublicKey,
    pub messaging_key: MessagingKey,
}

impl ResolvedReceiver {
    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.public_key)
    }
}

/// Run `fut` under `limit`, tagging the failure with `step`.
pub async fn bounded<T, F>(step: Step, limit: Duration, fut: F) -> Result<T, CallFailure>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(CallFailure::External { step, source }),
        Err(_) => Err(CallFailure::Timeout { step, after: limit }),
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn CommitmentStore>,
    ledger: Arc<dyn LedgerClient>,
    directory: Arc<dyn KeyDirectory>,
    channel: Arc<dyn NotificationChannel>,
    accounts: Arc<dyn AccountProvisioning>,
    assets: AssetRegistry,
    timeouts: Timeouts,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CommitmentStore>,
        ledger: Arc<dyn LedgerClient>,
        directory: Arc<dyn KeyDirectory>,
        channel: Arc<dyn NotificationChannel>,
        accounts: Arc<dyn AccountProvisioning>,
        assets: AssetRegistry,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            ledger,
            directory,
            channel,
            accounts,
            assets,
            timeouts,
        }
    }

    pub fn store(&self) -> &Arc<dyn CommitmentStore> {
        &self.store
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// Session for a user whose key material is in the store.
    pub fn session(&self, name: &str) -> Result<UserSession, TransferError> {
        let user = self
            .store
            .get_user(name)?
            .ok_or_else(|| ValidationError::UnknownUser(name.to_string()))?;
        Ok(UserSession::from_record(&user))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn commitments(
        &self,
        session: &UserSession,
        class: AssetClass,
        page: Page,
    ) -> Result<Vec<Commitment>, TransferError> {
        Ok(self.store.list_commitments(&session.tenant, class, page)?)
    }

    pub fn transactions(
        &self,
        session: &UserSession,
        class: AssetClass,
        page: Page,
    ) -> Result<Vec<CommitmentTransaction>, TransferError> {
        Ok(self.store.list_transactions(&session.tenant, class, page)?)
    }

    /// Sum of spendable fungible commitments.
    pub fn balance(&self, session: &UserSession) -> Result<FtValue, TransferError> {
        let values: Vec<FtValue> = self
            .store
            .spendable_commitments(&session.tenant, AssetClass::Fungible)?
            .iter()
            .filter_map(Commitment::ft_value)
            .collect();
        Ok(FtValue::total(&values)?)
    }

    /// Pick spendable fungible commitments covering `value`.
    ///
    /// Prefers the smallest single commitment that covers the amount, then
    /// the pair with the smallest covering sum.
    pub fn select_inputs(
        &self,
        session: &UserSession,
        value: FtValue,
    ) -> Result<Vec<Commitment>, TransferError> {
        if value.is_zero() {
            return Err(ValidationError::ZeroValue.into());
        }
        let spendable = self
            .store
            .spendable_commitments(&session.tenant, AssetClass::Fungible)?;
        let amounts: Vec<FtValue> = spendable
            .iter()
            .map(|c| c.ft_value().unwrap_or(FtValue::ZERO))
            .collect();

        if let Some(i) = amounts.iter().position(|a| *a >= value) {
            return Ok(vec![spendable[i].clone()]);
        }

        let mut best: Option<(FtValue, usize, usize)> = None;
        for i in 0..amounts.len() {
            for j in (i + 1)..amounts.len() {
                let Ok(sum) = amounts[i].checked_add(amounts[j]) else {
                    continue;
                };
                if sum >= value && best.is_none_or(|(b, _, _)| sum < b) {
                    best = Some((sum, i, j));
                }
            }
        }

        match best {
            Some((_, i, j)) => Ok(vec![spendable[i].clone(), spendable[j].clone()]),
            None => Err(ValidationError::InsufficientFunds(value).into()),
        }
    }

    // ========================================================================
    // Blacklist
    // ========================================================================

    pub fn blacklist(&self, name: &str) -> Result<(), TransferError> {
        Ok(self.store.set_blacklisted(name, true)?)
    }

    pub fn unblacklist(&self, name: &str) -> Result<(), TransferError> {
        Ok(self.store.set_blacklisted(name, false)?)
    }

    pub fn is_blacklisted(&self, name: &str) -> Result<bool, TransferError> {
        Ok(self.store.is_blacklisted(name)?)
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    async fn call<T, F>(&self, step: Step, fut: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        Ok(bounded(step, self.timeouts.call, fut).await?)
    }

    async fn ledger_call<T, F>(&self, step: Step, fut: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        Ok(bounded(step, self.timeouts.ledger, fut).await?)
    }

    /// Load `hashes` from the store, each distinct, present and spendable.
    fn load_inputs(
        &self,
        session: &UserSession,
        class: AssetClass,
        hashes: &[CommitmentHash],
    ) -> Result<Vec<Commitment>, TransferError> {
        let mut seen = HashSet::new();
        let mut inputs = Vec::with_capacity(hashes.len());

        for hash in hashes {
            if !seen.insert(*hash) {
                return Err(ValidationError::DuplicateInput(*hash).into());
            }
            let commitment = self
                .store
                .get_commitment(&session.tenant, class, hash)?
                .ok_or(ValidationError::UnknownCommitment(*hash))?;
            if !commitment.is_spendable() {
                return Err(ValidationError::AlreadySpent(*hash).into());
            }
            inputs.push(commitment);
        }
        Ok(inputs)
    }

    /// No party blacklisted and every receiver known to the directory.
    async fn check_parties(&self, session: &UserSession, receivers: &[&str]) -> Result<(), TransferError> {
        for name in std::iter::once(session.tenant.as_str()).chain(receivers.iter().copied()) {
            if self.store.is_blacklisted(name)? {
                return Err(ValidationError::Blacklisted(name.to_string()).into());
            }
        }

        let registered = try_join_all(receivers.iter().map(|name| async move {
            let known = self
                .call(Step::CheckRegistered, self.directory.is_registered(name))
                .await?;
            Ok::<_, TransferError>((*name, known))
        }))
        .await?;

        match registered.into_iter().find(|(_, known)| !known) {
            Some((name, _)) => Err(ValidationError::NotRegistered(name.to_string()).into()),
            None => Ok(()),
        }
    }

    /// [`Self::check_parties`], recording a failed `record` when a directory call fails.
    async fn vet_parties(
        &self,
        session: &UserSession,
        receivers: &[&str],
        record: impl FnOnce() -> CommitmentTransaction,
    ) -> Result<(), TransferError> {
        match self.check_parties(session, receivers).await {
            Err(e) if !e.is_validation() => self.settle(session, record, Err(e)),
            checked => checked,
        }
    }

    async fn resolve_receiver(&self, name: &str) -> Result<ResolvedReceiver, TransferError> {
        let public_key = self
            .call(Step::ResolvePublicKey, self.directory.resolve_public_key(name))
            .await?;
        let messaging_key = self
            .call(Step::ResolveMessagingKey, self.directory.resolve_messaging_key(name))
            .await?;
        Ok(ResolvedReceiver {
            name: name.to_string(),
            public_key,
            messaging_key,
        })
    }

    /// Provision and unlock a fresh sender address, remembered on the user.
    async fn one_time_account(&self, session: &UserSession) -> Result<Address, TransferError> {
        let account = self
            .call(
                Step::CreateAccount,
                self.accounts.create_one_time_address(&session.tenant),
            )
            .await?;
        self.call(
            Step::UnlockAccount,
            self.accounts.unlock(&account.address, &account.password),
        )
        .await?;
        self.store
            .add_one_time_account(&session.tenant, account.address)?;
        Ok(account.address)
    }

    fn sender_secret(&self, session: &UserSession) -> Result<ZkpSecretKey, TransferError> {
        let user = self
            .store
            .get_user(&session.tenant)?
            .ok_or_else(|| ValidationError::UnknownUser(session.tenant.clone()))?;
        Ok(user.secret_key)
    }

    /// Context submitted from the user's standing address.
    fn standing_context(&self, session: &UserSession, class: AssetClass) -> AssetContext {
        let ctx = self.assets.get(class);
        match session.identity.address {
            Some(address) => ctx.with_account(address),
            None => ctx.clone(),
        }
    }

    /// Persist the outcome of an accepted ledger transaction.
    fn commit(&self, session: &UserSession, batch: StoreBatch, tx_hash: &str) -> Result<(), TransferError> {
        self.store.apply(&session.tenant, batch).map_err(|e| {
            error!(
                tenant = %session.tenant,
                tx_hash = %tx_hash,
                "ledger accepted the transaction but the store write failed: {:#}",
                e
            );
            TransferError::Store(e)
        })
    }

    /// Append a failed transaction; a store error here never hides `cause`.
    fn record_failure(&self, session: &UserSession, record: CommitmentTransaction, cause: &TransferError) {
        warn!(
            tenant = %session.tenant,
            kind = ?record.transaction_type,
            "workflow failed: {}",
            cause
        );
        if let Err(e) = self.store.append_transaction(&session.tenant, record.failed()) {
            error!(tenant = %session.tenant, "could not record failed transaction: {:#}", e);
        }
    }

    /// Record `record` as failed when `result` is an error.
    fn settle<T>(
        &self,
        session: &UserSession,
        record: impl FnOnce() -> CommitmentTransaction,
        result: Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        if let Err(e) = &result {
            self.record_failure(session, record(), e);
        }
        result
    }
}

/// Fungible total of `commitments`.
fn ft_total(commitments: &[Commitment]) -> Result<FtValue, TransferError> {
    let values = commitments
        .iter()
        .map(|c| {
            c.ft_value().ok_or(ValidationError::WrongAssetClass {
                expected: AssetClass::Fungible,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FtValue::total(&values)?)
}

fn snapshots(commitments: &[Commitment]) -> Vec<CommitmentSnapshot> {
    commitments.iter().map(Commitment::snapshot).collect()
}
