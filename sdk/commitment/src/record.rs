//! Commitment and transaction records.
//!
//! Records are never deleted. A commitment moves from spendable to spent by
//! setting exactly one of the spend flags; nothing ever clears a flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::CommitmentHash;
use crate::keys::{Address, Identity, Salt};
use crate::value::{AssetClass, AssetValue, FtValue};

/// A commitment held (or once held) by a user, with its opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub value: AssetValue,
    pub salt: Salt,
    pub owner: Identity,
    pub commitment: CommitmentHash,
    pub commitment_index: u64,

    #[serde(default)]
    pub is_minted: bool,
    #[serde(default)]
    pub is_transferred: bool,
    #[serde(default)]
    pub is_burned: bool,
    #[serde(default)]
    pub is_received: bool,
    #[serde(default)]
    pub is_change: bool,
    #[serde(default)]
    pub is_batch_transferred: bool,
    #[serde(default)]
    pub is_consolidate_transferred: bool,

    /// Recomputed hash matched the stored one.
    #[serde(default)]
    pub commitment_reconciles: Option<bool>,
    /// Ledger holds the commitment at the recorded index.
    #[serde(default)]
    pub commitment_exists_onchain: Option<bool>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commitment {
    /// A fresh record with every flag clear.
    pub fn new(
        value: AssetValue,
        salt: Salt,
        owner: Identity,
        commitment: CommitmentHash,
        commitment_index: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            value,
            salt,
            owner,
            commitment,
            commitment_index,
            is_minted: false,
            is_transferred: false,
            is_burned: false,
            is_received: false,
            is_change: false,
            is_batch_transferred: false,
            is_consolidate_transferred: false,
            commitment_reconciles: None,
            commitment_exists_onchain: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        self.value.class()
    }

    pub fn ft_value(&self) -> Option<FtValue> {
        self.value.as_ft()
    }

    pub fn is_spendable(&self) -> bool {
        !(self.is_transferred
            || self.is_burned
            || self.is_batch_transferred
            || self.is_consolidate_transferred)
    }

    pub fn snapshot(&self) -> CommitmentSnapshot {
        CommitmentSnapshot {
            value: self.value.clone(),
            salt: Some(self.salt),
            owner: Some(self.owner.clone()),
            owner_name: Some(self.owner.name.clone()),
            commitment: Some(self.commitment),
            commitment_index: Some(self.commitment_index),
        }
    }
}

/// Copy of a commitment's fields frozen into a transaction record.
///
/// Outputs of a failed operation carry only what was known before the
/// ledger call, so everything except the value is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentSnapshot {
    pub value: AssetValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Salt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Identity>,
    /// Intended owner before their key was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<CommitmentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment_index: Option<u64>,
}

impl CommitmentSnapshot {
    /// An intended output: value and owner, no ledger data yet.
    pub fn intended(value: AssetValue, salt: Salt, owner: Identity) -> Self {
        Self {
            value,
            salt: Some(salt),
            owner_name: Some(owner.name.clone()),
            owner: Some(owner),
            commitment: None,
            commitment_index: None,
        }
    }

    /// A requested output known only by value and receiver name.
    pub fn requested(value: AssetValue, owner_name: impl Into<String>) -> Self {
        Self {
            value,
            salt: None,
            owner: None,
            owner_name: Some(owner_name.into()),
            commitment: None,
            commitment_index: None,
        }
    }

    /// Attach the ledger's answer to an intended output.
    pub fn confirmed(mut self, commitment: CommitmentHash, commitment_index: u64) -> Self {
        self.commitment = Some(commitment);
        self.commitment_index = Some(commitment_index);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Mint,
    TransferOutgoing,
    TransferIncoming,
    Change,
    Batch,
    Consolidate,
    Burn,
}

/// Append-only history entry for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentTransaction {
    /// Assigned by the store on append; orders the history.
    #[serde(default)]
    pub sequence: u64,
    pub transaction_type: TransactionType,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub input_commitments: Vec<CommitmentSnapshot>,
    #[serde(default)]
    pub output_commitments: Vec<CommitmentSnapshot>,
    #[serde(default)]
    pub sender: Option<Identity>,
    #[serde(default)]
    pub receiver: Option<Identity>,
    #[serde(default)]
    pub is_failed: bool,
    #[serde(default)]
    pub block_number: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl CommitmentTransaction {
    pub fn new(transaction_type: TransactionType, asset_class: AssetClass) -> Self {
        Self {
            sequence: 0,
            transaction_type,
            asset_class,
            input_commitments: Vec::new(),
            output_commitments: Vec::new(),
            sender: None,
            receiver: None,
            is_failed: false,
            block_number: None,
            created_at: Utc::now(),
        }
    }

    pub fn inputs(mut self, inputs: Vec<CommitmentSnapshot>) -> Self {
        self.input_commitments = inputs;
        self
    }

    pub fn outputs(mut self, outputs: Vec<CommitmentSnapshot>) -> Self {
        self.output_commitments = outputs;
        self
    }

    pub fn sender(mut self, sender: Identity) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn receiver(mut self, receiver: Identity) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn block_number(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    pub fn failed(mut self) -> Self {
        self.is_failed = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicTransferKind {
    /// Value left the shielded pool to a public balance.
    Burned,
    /// A public-token notification arrived for this user.
    Received,
}

/// Public-balance bookkeeping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicTokenTransaction {
    #[serde(default)]
    pub sequence: u64,
    pub kind: PublicTransferKind,
    pub value: AssetValue,
    pub shield_contract: Address,
    #[serde(default)]
    pub sender: Option<Identity>,
    #[serde(default)]
    pub receiver: Option<Identity>,
    pub created_at: DateTime<Utc>,
}
