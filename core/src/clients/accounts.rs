//! Account Provisioning
//!
//! Each simple transfer is submitted from a fresh one-time address that is
//! provisioned and unlocked just before the ledger call.

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use umbra_commitment::Address;

use super::ClientError;
use super::http::JsonService;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeAccount {
    pub address: Address,
    pub password: String,
}

impl std::fmt::Debug for OneTimeAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneTimeAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait AccountProvisioning: Send + Sync {
    async fn create_one_time_address(&self, seed: &str) -> Result<OneTimeAccount, ClientError>;

    async fn unlock(&self, address: &Address, password: &str) -> Result<(), ClientError>;
}

// ============================================================================
// Local provisioning
// ============================================================================

/// Derives addresses from the seed and a counter; nothing leaves the process.
#[derive(Debug, Default)]
pub struct LocalAccounts {
    counter: AtomicU64,
    issued: DashSet<Address>,
    unlocked: DashSet<Address>,
}

impl LocalAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self, address: &Address) -> bool {
        self.unlocked.contains(address)
    }

    fn password_for(address: &Address) -> String {
        let mut hasher = blake3::Hasher::new_derive_key("umbra-local-accounts-v1");
        hasher.update(address.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

#[async_trait]
impl AccountProvisioning for LocalAccounts {
    async fn create_one_time_address(&self, seed: &str) -> Result<OneTimeAccount, ClientError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();
        hasher.update(seed.as_bytes());
        hasher.update(&n.to_be_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        let address = Address(bytes);

        self.issued.insert(address);
        Ok(OneTimeAccount {
            address,
            password: Self::password_for(&address),
        })
    }

    async fn unlock(&self, address: &Address, password: &str) -> Result<(), ClientError> {
        if !self.issued.contains(address) {
            return Err(ClientError::rejected("accounts", format!("unknown account {}", address)));
        }
        if Self::password_for(address) != password {
            return Err(ClientError::rejected("accounts", "wrong password"));
        }
        self.unlocked.insert(*address);
        Ok(())
    }
}

// ============================================================================
// HTTP provisioning
// ============================================================================

#[derive(Serialize)]
struct CreateRequest<'a> {
    seed: &'a str,
}

#[derive(Serialize)]
struct UnlockRequest<'a> {
    address: &'a Address,
    password: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpAccounts {
    api: JsonService,
}

impl HttpAccounts {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonService::new("accounts", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl AccountProvisioning for HttpAccounts {
    async fn create_one_time_address(&self, seed: &str) -> Result<OneTimeAccount, ClientError> {
        self.api.post("accounts", &CreateRequest { seed }).await
    }

    async fn unlock(&self, address: &Address, password: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .api
            .post("accounts/unlock", &UnlockRequest { address, password })
            .await?;
        Ok(())
    }
}
