//! Commitment hash
//!
//! ```text
//! C = SHA-256(asset_address || value || owner_pk || salt)
//!
//! asset_address : 20 bytes (token contract)
//! value         : 16 bytes BE (fungible) | 32 bytes (token id)
//! owner_pk      : 32 bytes
//! salt          : 32 bytes
//! ```

use sha2::{Digest, Sha256};

use crate::keys::{Address, Salt, ZkpPublicKey};
use crate::value::AssetValue;

fixed_hex!(
    /// Public identifier of a commitment on the ledger.
    CommitmentHash,
    32
);

/// Compute the commitment for an opening. Deterministic.
pub fn commitment_hash(
    asset_address: &Address,
    value: &AssetValue,
    owner: &ZkpPublicKey,
    salt: &Salt,
) -> CommitmentHash {
    let mut hasher = Sha256::new();
    hasher.update(asset_address.as_bytes());
    hasher.update(value.commitment_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    CommitmentHash(out)
}
