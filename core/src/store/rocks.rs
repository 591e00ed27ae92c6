use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use umbra_commitment::{
    Address, AssetClass, Commitment, CommitmentHash, CommitmentTransaction, PublicTokenTransaction,
};

use super::{CommitmentStore, OutboxEntry, OutboxState, Page, StoreBatch, UserRecord};

const CF_FT_COMMITMENTS: &str = "ft_commitments";
const CF_NFT_COMMITMENTS: &str = "nft_commitments";
const CF_TRANSACTIONS: &str = "transactions";
const CF_PUBLIC_TRANSACTIONS: &str = "public_transactions";
const CF_USERS: &str = "users";
const CF_OUTBOX: &str = "outbox";
const CF_BLACKLIST: &str = "blacklist";
const CF_META: &str = "meta";

const META_NEXT_SEQUENCE: &[u8] = b"next_sequence";
const SEP: u8 = 0;

/// Inserting a commitment hash the tenant already holds.
#[derive(Debug, Error)]
#[error("commitment {0} already stored")]
pub struct DuplicateCommitment(pub CommitmentHash);

/// A thread-safe wrapper around RocksDB.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    /// Serialises writers; holds the next sequence number.
    writer: Arc<Mutex<u64>>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![
            ColumnFamilyDescriptor::new(CF_FT_COMMITMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_NFT_COMMITMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_PUBLIC_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_USERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_OUTBOX, Options::default()),
            ColumnFamilyDescriptor::new(CF_BLACKLIST, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, families)
            .map_err(|e| anyhow!("Failed to open RocksDB: {}", e))?;

        let next_sequence = {
            let cf = db.cf_handle(CF_META).context("meta CF missing")?;
            match db.get_cf(cf, META_NEXT_SEQUENCE)? {
                Some(bytes) => {
                    let arr: [u8; 8] = bytes
                        .as_slice()
                        .try_into()
                        .context("invalid next_sequence length")?;
                    u64::from_be_bytes(arr)
                }
                None => 1,
            }
        };
        log::debug!("commitment store opened, next sequence {}", next_sequence);

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(next_sequence)),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("{} CF missing", name))
    }

    fn commitments_cf(&self, class: AssetClass) -> Result<&ColumnFamily> {
        match class {
            AssetClass::Fungible => self.cf(CF_FT_COMMITMENTS),
            AssetClass::NonFungible => self.cf(CF_NFT_COMMITMENTS),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &ColumnFamily, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All values under `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, cf: &ColumnFamily, prefix: &[u8]) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, u64>> {
        self.writer
            .lock()
            .map_err(|_| anyhow!("store writer lock poisoned"))
    }

    fn all_commitments(&self, tenant: &str, class: AssetClass) -> Result<Vec<Commitment>> {
        let cf = self.commitments_cf(class)?;
        self.scan(cf, &tenant_prefix(tenant)?)
    }
}

// ============================================================================
// Key layout
// ============================================================================
//
// commitments          tenant \0 hash
// transactions         tenant \0 class \0 sequence(be)
// public_transactions  tenant \0 class \0 sequence(be)
// outbox               tenant \0 id(be)
// users                tenant
// blacklist            name

fn tenant_prefix(tenant: &str) -> Result<Vec<u8>> {
    if tenant.is_empty() || tenant.as_bytes().contains(&SEP) {
        bail!("invalid tenant id {:?}", tenant);
    }
    let mut key = Vec::with_capacity(tenant.len() + 1);
    key.extend_from_slice(tenant.as_bytes());
    key.push(SEP);
    Ok(key)
}

fn class_prefix(tenant: &str, class: AssetClass) -> Result<Vec<u8>> {
    let mut key = tenant_prefix(tenant)?;
    key.extend_from_slice(class.as_str().as_bytes());
    key.push(SEP);
    Ok(key)
}

fn commitment_key(tenant: &str, hash: &CommitmentHash) -> Result<Vec<u8>> {
    let mut key = tenant_prefix(tenant)?;
    key.extend_from_slice(hash.as_bytes());
    Ok(key)
}

fn sequence_key(mut prefix: Vec<u8>, sequence: u64) -> Vec<u8> {
    prefix.extend_from_slice(&sequence.to_be_bytes());
    prefix
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Lifecycle flags only ever go from false to true.
fn clears_flag(old: &Commitment, new: &Commitment) -> Option<&'static str> {
    let pairs = [
        ("is_minted", old.is_minted, new.is_minted),
        ("is_transferred", old.is_transferred, new.is_transferred),
        ("is_burned", old.is_burned, new.is_burned),
        ("is_received", old.is_received, new.is_received),
        ("is_change", old.is_change, new.is_change),
        ("is_batch_transferred", old.is_batch_transferred, new.is_batch_transferred),
        (
            "is_consolidate_transferred",
            old.is_consolidate_transferred,
            new.is_consolidate_transferred,
        ),
    ];
    pairs
        .into_iter()
        .find(|(_, was, now)| *was && !*now)
        .map(|(name, _, _)| name)
}

impl CommitmentStore for RocksDbStore {
    fn apply(&self, tenant: &str, batch: StoreBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut next_sequence = self.lock_writer()?;
        let mut sequence = *next_sequence;
        let mut wb = WriteBatch::default();
        let now = Utc::now();

        let mut seen = HashSet::new();
        for commitment in &batch.inserts {
            let cf = self.commitments_cf(commitment.asset_class())?;
            let key = commitment_key(tenant, &commitment.commitment)?;
            if !seen.insert((commitment.asset_class(), commitment.commitment))
                || self.db.get_cf(cf, &key)?.is_some()
            {
                return Err(DuplicateCommitment(commitment.commitment).into());
            }
            wb.put_cf(cf, key, to_json(commitment)?);
        }

        for commitment in &batch.updates {
            let cf = self.commitments_cf(commitment.asset_class())?;
            let key = commitment_key(tenant, &commitment.commitment)?;
            let existing: Commitment = self
                .get_json(cf, &key)?
                .with_context(|| format!("commitment {} not found for {}", commitment.commitment, tenant))?;
            if let Some(flag) = clears_flag(&existing, commitment) {
                bail!("refusing to clear {} on {}", flag, commitment.commitment);
            }

            let mut updated = commitment.clone();
            updated.created_at = existing.created_at;
            updated.updated_at = now;
            wb.put_cf(cf, key, to_json(&updated)?);
        }

        if !batch.transactions.is_empty() {
            let cf = self.cf(CF_TRANSACTIONS)?;
            for mut tx in batch.transactions {
                tx.sequence = sequence;
                let key = sequence_key(class_prefix(tenant, tx.asset_class)?, sequence);
                wb.put_cf(cf, key, to_json(&tx)?);
                sequence += 1;
            }
        }

        if !batch.public_transactions.is_empty() {
            let cf = self.cf(CF_PUBLIC_TRANSACTIONS)?;
            for mut tx in batch.public_transactions {
                tx.sequence = sequence;
                let key = sequence_key(class_prefix(tenant, tx.value.class())?, sequence);
                wb.put_cf(cf, key, to_json(&tx)?);
                sequence += 1;
            }
        }

        if sequence != *next_sequence {
            wb.put_cf(self.cf(CF_META)?, META_NEXT_SEQUENCE, sequence.to_be_bytes());
        }

        self.db.write(wb)?;
        *next_sequence = sequence;
        Ok(())
    }

    fn get_commitment(
        &self,
        tenant: &str,
        class: AssetClass,
        hash: &CommitmentHash,
    ) -> Result<Option<Commitment>> {
        let cf = self.commitments_cf(class)?;
        self.get_json(cf, &commitment_key(tenant, hash)?)
    }

    fn list_commitments(&self, tenant: &str, class: AssetClass, page: Page) -> Result<Vec<Commitment>> {
        let mut all = self.all_commitments(tenant, class)?;
        all.sort_by(|a, b| b.commitment_index.cmp(&a.commitment_index));
        Ok(page.apply(all))
    }

    fn spendable_commitments(&self, tenant: &str, class: AssetClass) -> Result<Vec<Commitment>> {
        let mut spendable: Vec<Commitment> = self
            .all_commitments(tenant, class)?
            .into_iter()
            .filter(Commitment::is_spendable)
            .collect();
        spendable.sort_by(|a, b| {
            a.ft_value()
                .cmp(&b.ft_value())
                .then(a.commitment_index.cmp(&b.commitment_index))
        });
        Ok(spendable)
    }

    fn list_transactions(
        &self,
        tenant: &str,
        class: AssetClass,
        page: Page,
    ) -> Result<Vec<CommitmentTransaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut all: Vec<CommitmentTransaction> = self.scan(cf, &class_prefix(tenant, class)?)?;
        all.reverse();
        Ok(page.apply(all))
    }

    fn list_public_transactions(
        &self,
        tenant: &str,
        class: AssetClass,
        page: Page,
    ) -> Result<Vec<PublicTokenTransaction>> {
        let cf = self.cf(CF_PUBLIC_TRANSACTIONS)?;
        let mut all: Vec<PublicTokenTransaction> = self.scan(cf, &class_prefix(tenant, class)?)?;
        all.reverse();
        Ok(page.apply(all))
    }

    fn put_user(&self, user: &UserRecord) -> Result<()> {
        tenant_prefix(&user.name)?;
        let _guard = self.lock_writer()?;
        let cf = self.cf(CF_USERS)?;

        // One-time accounts are append-only; a stale record must not drop any.
        let mut merged = user.clone();
        if let Some(existing) = self.get_json::<UserRecord>(cf, user.name.as_bytes())? {
            for account in existing.one_time_accounts {
                if !merged.one_time_accounts.contains(&account) {
                    merged.one_time_accounts.push(account);
                }
            }
        }
        self.db.put_cf(cf, user.name.as_bytes(), to_json(&merged)?)?;
        Ok(())
    }

    fn get_user(&self, tenant: &str) -> Result<Option<UserRecord>> {
        let cf = self.cf(CF_USERS)?;
        self.get_json(cf, tenant.as_bytes())
    }

    fn add_one_time_account(&self, tenant: &str, address: Address) -> Result<()> {
        let _guard = self.lock_writer()?;
        let cf = self.cf(CF_USERS)?;
        let mut user: UserRecord = self
            .get_json(cf, tenant.as_bytes())?
            .with_context(|| format!("user {} not found", tenant))?;
        user.one_time_accounts.push(address);
        self.db.put_cf(cf, tenant.as_bytes(), to_json(&user)?)?;
        Ok(())
    }

    fn put_outbox(&self, tenant: &str, mut entry: OutboxEntry) -> Result<u64> {
        let mut next_sequence = self.lock_writer()?;
        let id = *next_sequence;
        entry.id = id;

        let mut wb = WriteBatch::default();
        wb.put_cf(self.cf(CF_OUTBOX)?, sequence_key(tenant_prefix(tenant)?, id), to_json(&entry)?);
        wb.put_cf(self.cf(CF_META)?, META_NEXT_SEQUENCE, (id + 1).to_be_bytes());
        self.db.write(wb)?;

        *next_sequence = id + 1;
        Ok(id)
    }

    fn update_outbox(&self, tenant: &str, entry: &OutboxEntry) -> Result<()> {
        let _guard = self.lock_writer()?;
        let cf = self.cf(CF_OUTBOX)?;
        let key = sequence_key(tenant_prefix(tenant)?, entry.id);
        if self.db.get_cf(cf, &key)?.is_none() {
            bail!("outbox entry {} not found for {}", entry.id, tenant);
        }

        let mut updated = entry.clone();
        updated.updated_at = Utc::now();
        self.db.put_cf(cf, key, to_json(&updated)?)?;
        Ok(())
    }

    fn list_outbox(&self, tenant: &str, state: Option<OutboxState>) -> Result<Vec<OutboxEntry>> {
        let cf = self.cf(CF_OUTBOX)?;
        let all: Vec<OutboxEntry> = self.scan(cf, &tenant_prefix(tenant)?)?;
        Ok(all
            .into_iter()
            .filter(|e| state.is_none_or(|s| e.state == s))
            .collect())
    }

    fn set_blacklisted(&self, name: &str, blacklisted: bool) -> Result<()> {
        let cf = self.cf(CF_BLACKLIST)?;
        if blacklisted {
            self.db.put_cf(cf, name.as_bytes(), [])?;
        } else {
            self.db.delete_cf(cf, name.as_bytes())?;
        }
        log::info!("blacklist {} = {}", name, blacklisted);
        Ok(())
    }

    fn is_blacklisted(&self, name: &str) -> Result<bool> {
        let cf = self.cf(CF_BLACKLIST)?;
        Ok(self.db.get_cf(cf, name.as_bytes())?.is_some())
    }
}
