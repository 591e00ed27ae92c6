//! Commitment Store
//!
//! Durable per-user state: commitments of both asset classes, the
//! append-only transaction history, public token bookkeeping, user key
//! material, the notification outbox and the blacklist.
//!
//! Every user is a tenant of one shared schema; keys are prefixed with the
//! tenant id so one database serves any number of users.

pub mod rocks;

pub use rocks::RocksDbStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use umbra_commitment::{
    Address, AssetClass, Commitment, CommitmentHash, CommitmentTransaction, Identity,
    MessagingKey, PublicTokenTransaction, ZkpPublicKey, ZkpSecretKey,
};

use umbra_envelope::MessagingKeypair;

use crate::channel::Notification;

// ============================================================================
// Records
// ============================================================================

/// Key material and accounts of one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub public_key: ZkpPublicKey,
    pub secret_key: ZkpSecretKey,
    pub address: Address,
    #[serde(with = "hex")]
    pub messaging_secret: [u8; 32],
    #[serde(default)]
    pub one_time_accounts: Vec<Address>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Fresh keys for `name`, standing on the public `address`.
    pub fn generate(name: impl Into<String>, address: Address) -> Self {
        let secret_key = ZkpSecretKey::random();
        Self {
            name: name.into(),
            public_key: secret_key.public_key(),
            secret_key,
            address,
            messaging_secret: MessagingKeypair::generate().secret_bytes(),
            one_time_accounts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn messaging_keypair(&self) -> MessagingKeypair {
        MessagingKeypair::from_secret_bytes(self.messaging_secret)
    }

    pub fn messaging_key(&self) -> MessagingKey {
        MessagingKey(self.messaging_keypair().public_bytes())
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.public_key).with_address(self.address)
    }
}

/// Delivery state of a pending notification.
///
/// ```text
/// Prepared ──ledger ok──▶ Ready ──publish ok──▶ Delivered
///     │                     │
///     └──ledger failed──▶ Abandoned      (publish failed: stays Ready)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    Prepared,
    Ready,
    Delivered,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Assigned by the store.
    #[serde(default)]
    pub id: u64,
    pub recipient: String,
    pub recipient_key: MessagingKey,
    pub state: OutboxState,
    /// Filled once the ledger has assigned the commitment.
    #[serde(default)]
    pub notification: Option<Notification>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn prepared(recipient: impl Into<String>, recipient_key: MessagingKey) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            recipient: recipient.into(),
            recipient_key,
            state: OutboxState::Prepared,
            notification: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 1-based page over a newest-first listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page_no: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(page_no: usize, limit: usize) -> Self {
        Self { page_no, limit }
    }

    /// Everything, in one page.
    pub fn all() -> Self {
        Self {
            page_no: 1,
            limit: usize::MAX,
        }
    }

    pub fn skip(&self) -> usize {
        self.page_no.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn apply<T>(&self, newest_first: Vec<T>) -> Vec<T> {
        newest_first.into_iter().skip(self.skip()).take(self.limit).collect()
    }
}

/// Writes applied atomically for one tenant.
#[derive(Debug, Default)]
pub struct StoreBatch {
    /// New commitments; fails the whole batch if any hash is already stored.
    pub inserts: Vec<Commitment>,
    /// Replacements for existing commitments.
    pub updates: Vec<Commitment>,
    pub transactions: Vec<CommitmentTransaction>,
    pub public_transactions: Vec<PublicTokenTransaction>,
}

impl StoreBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.transactions.is_empty()
            && self.public_transactions.is_empty()
    }
}

// ============================================================================
// Trait
// ============================================================================

/// decoupling orchestration from the database
pub trait CommitmentStore: Send + Sync {
    /// Atomically apply inserts, updates and appends for `tenant`.
    fn apply(&self, tenant: &str, batch: StoreBatch) -> Result<()>;

    fn get_commitment(
        &self,
        tenant: &str,
        class: AssetClass,
        hash: &CommitmentHash,
    ) -> Result<Option<Commitment>>;

    /// Newest first.
    fn list_commitments(&self, tenant: &str, class: AssetClass, page: Page) -> Result<Vec<Commitment>>;

    /// Spendable commitments, smallest value first.
    fn spendable_commitments(&self, tenant: &str, class: AssetClass) -> Result<Vec<Commitment>>;

    /// Newest first.
    fn list_transactions(
        &self,
        tenant: &str,
        class: AssetClass,
        page: Page,
    ) -> Result<Vec<CommitmentTransaction>>;

    fn list_public_transactions(
        &self,
        tenant: &str,
        class: AssetClass,
        page: Page,
    ) -> Result<Vec<PublicTokenTransaction>>;

    /// Upsert; one-time accounts already recorded are kept.
    fn put_user(&self, user: &UserRecord) -> Result<()>;

    fn get_user(&self, tenant: &str) -> Result<Option<UserRecord>>;

    fn add_one_time_account(&self, tenant: &str, address: Address) -> Result<()>;

    /// Returns the assigned id.
    fn put_outbox(&self, tenant: &str, entry: OutboxEntry) -> Result<u64>;

    fn update_outbox(&self, tenant: &str, entry: &OutboxEntry) -> Result<()>;

    fn list_outbox(&self, tenant: &str, state: Option<OutboxState>) -> Result<Vec<OutboxEntry>>;

    fn set_blacklisted(&self, name: &str, blacklisted: bool) -> Result<()>;

    fn is_blacklisted(&self, name: &str) -> Result<bool>;

    // Convenience wrappers

    fn insert_commitment(&self, tenant: &str, commitment: Commitment) -> Result<()> {
        self.apply(
            tenant,
            StoreBatch {
                inserts: vec![commitment],
                ..StoreBatch::default()
            },
        )
    }

    fn update_commitment(&self, tenant: &str, commitment: Commitment) -> Result<()> {
        self.apply(
            tenant,
            StoreBatch {
                updates: vec![commitment],
                ..StoreBatch::default()
            },
        )
    }

    fn append_transaction(&self, tenant: &str, tx: CommitmentTransaction) -> Result<()> {
        self.apply(
            tenant,
            StoreBatch {
                transactions: vec![tx],
                ..StoreBatch::default()
            },
        )
    }
}
