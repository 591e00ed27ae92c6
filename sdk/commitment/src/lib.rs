//! Umbra Commitment SDK
//!
//! Data model shared by every Umbra component: shielded values, salts, keys,
//! the commitment hash and the records kept for each commitment's lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!            mint                      transfer / batch / consolidate / burn
//!  public ─────────▶ ┌────────────┐ ───────────────────────────────────────▶ spent
//!  balance           │ spendable  │                                          (kept, never
//!  notification ───▶ │ commitment │ ◀─── change output                        selected)
//!   (received)       └────────────┘
//! ```
//!
//! A commitment is `H(asset_address, value, owner_pk, salt)`. Its opening
//! (value, salt, owner key) travels to the owner over the encrypted
//! notification channel; the hash itself is public on the ledger.

#[macro_use]
mod hexfmt;

pub mod error;
pub mod hash;
pub mod keys;
pub mod record;
pub mod value;

pub use error::ValueError;
pub use hash::{CommitmentHash, commitment_hash};
pub use keys::{Address, Identity, MessagingKey, Salt, ZkpPublicKey, ZkpSecretKey};
pub use record::{
    Commitment, CommitmentSnapshot, CommitmentTransaction, PublicTokenTransaction,
    PublicTransferKind, TransactionType,
};
pub use value::{AssetClass, AssetValue, FtValue, TokenId};

/// Number of output slots in a batch transfer and inputs in a consolidation.
pub const BATCH_WIDTH: usize = 20;
