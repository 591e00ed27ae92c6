//! External collaborators.
//!
//! ```text
//!              ┌──────────────────────┐
//!              │     Orchestrator     │
//!              └──┬───────┬────────┬──┘
//!                 │       │        │
//!     ┌───────────▼─┐ ┌───▼─────┐ ┌▼──────────────────┐
//!     │ KeyDirectory│ │ Ledger  │ │AccountProvisioning│
//!     │ name → keys │ │ proofs +│ │ one-time senders  │
//!     │             │ │ accum.  │ │                   │
//!     └─────────────┘ └─────────┘ └───────────────────┘
//! ```
//!
//! Each collaborator has an HTTP client for real deployments and an
//! in-process implementation for development and tests, selected by
//! [`umbra_config::ServiceMode`].

pub mod accounts;
pub mod directory;
pub mod http;
pub mod ledger;
pub mod mock_ledger;

pub use accounts::{AccountProvisioning, HttpAccounts, LocalAccounts, OneTimeAccount};
pub use directory::{DirectoryEntry, HttpKeyDirectory, KeyDirectory, StaticKeyDirectory};
pub use ledger::{
    BurnRequest, CorrectnessQuery, CorrectnessReport, HttpLedgerClient, LedgerClient, MintReceipt,
    MintRequest, OutputCommitment, SpendInput, SpendOutput, SpendReceipt, SpendRequest, TxReceipt,
};
pub use mock_ledger::MockLedger;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use umbra_commitment::{Address, AssetClass};
use umbra_config::AssetConfig;

/// Failure reported by (or while reaching) an external service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("name '{0}' is not registered")]
    NotRegistered(String),

    #[error("{service} rejected request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },

    #[error("{service} unreachable: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("unexpected {service} response: {message}")]
    Protocol {
        service: &'static str,
        message: String,
    },
}

impl ClientError {
    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        ClientError::Rejected {
            service,
            message: message.into(),
        }
    }

    pub fn protocol(service: &'static str, message: impl Into<String>) -> Self {
        ClientError::Protocol {
            service,
            message: message.into(),
        }
    }
}

/// Everything the ledger needs to locate the asset being moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetContext {
    pub asset_class: AssetClass,
    pub token_contract: Address,
    pub shield_contract: Address,
    /// Account submitting the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Address>,
}

impl AssetContext {
    pub fn with_account(&self, account: Address) -> Self {
        Self {
            account: Some(account),
            ..self.clone()
        }
    }
}

/// Contract addresses for both asset classes.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    pub ft: AssetContext,
    pub nft: AssetContext,
}

impl AssetRegistry {
    pub fn from_config(cfg: &AssetConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let parse = |field: &str, raw: &str| -> anyhow::Result<Address> {
            raw.parse()
                .with_context(|| format!("invalid {} address '{}'", field, raw))
        };

        Ok(Self {
            ft: AssetContext {
                asset_class: AssetClass::Fungible,
                token_contract: parse("ft_token_contract", &cfg.ft_token_contract)?,
                shield_contract: parse("ft_shield_contract", &cfg.ft_shield_contract)?,
                account: None,
            },
            nft: AssetContext {
                asset_class: AssetClass::NonFungible,
                token_contract: parse("nft_token_contract", &cfg.nft_token_contract)?,
                shield_contract: parse("nft_shield_contract", &cfg.nft_shield_contract)?,
                account: None,
            },
        })
    }

    pub fn get(&self, class: AssetClass) -> &AssetContext {
        match class {
            AssetClass::Fungible => &self.ft,
            AssetClass::NonFungible => &self.nft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_default_config() {
        let registry = AssetRegistry::from_config(&AssetConfig::default()).unwrap();
        assert_eq!(registry.ft.asset_class, AssetClass::Fungible);
        assert_eq!(registry.get(AssetClass::NonFungible).asset_class, AssetClass::NonFungible);
        assert_ne!(registry.ft.shield_contract, registry.nft.shield_contract);
    }

    #[test]
    fn test_registry_rejects_bad_address() {
        let cfg = AssetConfig {
            ft_shield_contract: "0xnothex".into(),
            ..AssetConfig::default()
        };
        let err = AssetRegistry::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("ft_shield_contract"));
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::rejected("ledger", "proof verification failed");
        assert_eq!(err.to_string(), "ledger rejected request: proof verification failed");
        assert_eq!(
            ClientError::NotRegistered("carol".into()).to_string(),
            "name 'carol' is not registered"
        );
    }
}
