//! Keys, salts and identities.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fixed_hex!(
    /// 256-bit blinding factor mixed into every commitment.
    Salt,
    32
);

fixed_hex!(
    /// Public key the ledger binds a commitment to.
    ZkpPublicKey,
    32
);

fixed_hex!(secret
    /// Secret key authorising spends of commitments owned by the matching public key.
    ZkpSecretKey,
    32
);

fixed_hex!(
    /// 20-byte chain address (token contracts, shield contracts, user accounts).
    Address,
    20
);

fixed_hex!(
    /// X25519 public key identifying a user on the notification channel.
    MessagingKey,
    32
);

impl Salt {
    /// Fresh salt from the thread-local CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl ZkpSecretKey {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// `pk = SHA-256(sk)`
    pub fn public_key(&self) -> ZkpPublicKey {
        let digest = Sha256::digest(self.0);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ZkpPublicKey(out)
    }
}

/// Snapshot of a party to a transfer, as recorded on commitments and transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub public_key: ZkpPublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl Identity {
    pub fn new(name: impl Into<String>, public_key: ZkpPublicKey) -> Self {
        Self {
            name: name.into(),
            public_key,
            address: None,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }
}
