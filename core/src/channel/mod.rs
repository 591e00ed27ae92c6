//! Notification Channel
//!
//! Carries commitment openings from the sender to the new owner. Payloads are
//! sealed to the recipient's messaging key with [`umbra_envelope`] before they
//! touch the transport, so a relay only ever sees ciphertext.
//!
//! ```text
//!  Orchestrator ──seal──▶ publish(recipient_key, envelope)
//!                                   │
//!                          Local broker / HTTP relay
//!                                   │
//!  NotificationListener ◀── subscribe(own_key) ──┘  ──open──▶ Notification
//! ```

pub mod local;
pub mod relay;

pub use local::LocalChannel;
pub use relay::HttpRelayChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use umbra_commitment::{
    Address, AssetValue, CommitmentHash, Identity, MessagingKey, Salt, ZkpPublicKey,
};
use umbra_envelope::SealedEnvelope;

use crate::clients::ClientError;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, recipient: &MessagingKey, envelope: SealedEnvelope) -> Result<(), ClientError>;

    /// Stream of envelopes addressed to `identity`.
    async fn subscribe(&self, identity: &MessagingKey) -> Result<mpsc::UnboundedReceiver<SealedEnvelope>, ClientError>;
}

/// Opening of a new commitment, addressed to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentNotice {
    pub value: AssetValue,
    pub salt: Salt,
    pub public_key: ZkpPublicKey,
    pub commitment: CommitmentHash,
    pub commitment_index: u64,
    pub block_number: u64,
    pub token_contract: Address,
    pub shield_contract: Address,
    pub sender: Identity,
    pub receiver: Identity,
}

/// Value released to a public balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenNotice {
    pub value: AssetValue,
    pub token_contract: Address,
    pub shield_contract: Address,
    pub block_number: u64,
    pub sender: Identity,
    pub receiver: Identity,
}

/// Decrypted notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    FtCommitment(CommitmentNotice),
    NftCommitment(CommitmentNotice),
    FToken(TokenNotice),
    NfToken(TokenNotice),
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::FtCommitment(_) => "ft_commitment",
            Notification::NftCommitment(_) => "nft_commitment",
            Notification::FToken(_) => "f_token",
            Notification::NfToken(_) => "nf_token",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_commitment::{FtValue, TokenId};

    fn identity(name: &str, seed: u8) -> Identity {
        Identity::new(name, ZkpPublicKey([seed; 32]))
    }

    #[test]
    fn test_notification_tagging() {
        let notice = Notification::FtCommitment(CommitmentNotice {
            value: AssetValue::ft(FtValue(2)),
            salt: Salt([2; 32]),
            public_key: ZkpPublicKey([1; 32]),
            commitment: CommitmentHash([3; 32]),
            commitment_index: 0,
            block_number: 1,
            token_contract: Address([0x11; 20]),
            shield_contract: Address([0x22; 20]),
            sender: identity("alice", 9),
            receiver: identity("bob", 1),
        });

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "ft_commitment");
        assert_eq!(json["value"]["class"], "fungible");

        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, notice);
    }

    #[test]
    fn test_token_notice_kind() {
        let notice = Notification::NfToken(TokenNotice {
            value: AssetValue::nft(TokenId([7; 32]), "ipfs://x"),
            token_contract: Address([0x33; 20]),
            shield_contract: Address([0x44; 20]),
            block_number: 5,
            sender: identity("alice", 9),
            receiver: identity("bob", 1),
        });
        assert_eq!(notice.kind(), "nf_token");
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"kind\":\"nf_token\""));
    }
}
