//! Key Directory Client
//!
//! Resolves a human-readable name to the keys needed to pay it: the ledger
//! public key for commitments, the chain address for public balances, and the
//! messaging key for notifications.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use umbra_commitment::{Address, MessagingKey, ZkpPublicKey};

use super::ClientError;
use super::http::JsonService;

#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn resolve_public_key(&self, name: &str) -> Result<ZkpPublicKey, ClientError>;

    async fn resolve_address(&self, name: &str) -> Result<Address, ClientError>;

    async fn resolve_messaging_key(&self, name: &str) -> Result<MessagingKey, ClientError>;

    async fn is_registered(&self, name: &str) -> Result<bool, ClientError>;
}

/// Everything the directory knows about one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub public_key: ZkpPublicKey,
    pub address: Address,
    pub messaging_key: MessagingKey,
}

// ============================================================================
// In-process directory
// ============================================================================

/// Name registry held in memory.
#[derive(Debug, Default)]
pub struct StaticKeyDirectory {
    entries: DashMap<String, DirectoryEntry>,
}

impl StaticKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, entry: DirectoryEntry) {
        self.entries.insert(name.into(), entry);
    }

    fn entry(&self, name: &str) -> Result<DirectoryEntry, ClientError> {
        self.entries
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| ClientError::NotRegistered(name.to_string()))
    }
}

#[async_trait]
impl KeyDirectory for StaticKeyDirectory {
    async fn resolve_public_key(&self, name: &str) -> Result<ZkpPublicKey, ClientError> {
        self.entry(name).map(|e| e.public_key)
    }

    async fn resolve_address(&self, name: &str) -> Result<Address, ClientError> {
        self.entry(name).map(|e| e.address)
    }

    async fn resolve_messaging_key(&self, name: &str) -> Result<MessagingKey, ClientError> {
        self.entry(name).map(|e| e.messaging_key)
    }

    async fn is_registered(&self, name: &str) -> Result<bool, ClientError> {
        Ok(self.entries.contains_key(name))
    }
}

// ============================================================================
// HTTP directory
// ============================================================================

#[derive(Debug, Deserialize)]
struct KeyResponse<T> {
    value: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InUseResponse {
    in_use: bool,
}

/// Client for a remote name directory.
///
/// `GET /names/{name}/{key}` answers `{ "value": ... }`, with `null` for an
/// unregistered name.
#[derive(Debug, Clone)]
pub struct HttpKeyDirectory {
    api: JsonService,
}

impl HttpKeyDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonService::new("directory", base_url, timeout)?,
        })
    }

    async fn lookup<T>(&self, name: &str, key: &str) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let resp: KeyResponse<T> = self.api.get(&format!("names/{}/{}", name, key), &[]).await?;
        resp.value
            .ok_or_else(|| ClientError::NotRegistered(name.to_string()))
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn resolve_public_key(&self, name: &str) -> Result<ZkpPublicKey, ClientError> {
        self.lookup(name, "zkp-public-key").await
    }

    async fn resolve_address(&self, name: &str) -> Result<Address, ClientError> {
        self.lookup(name, "address").await
    }

    async fn resolve_messaging_key(&self, name: &str) -> Result<MessagingKey, ClientError> {
        self.lookup(name, "messaging-key").await
    }

    async fn is_registered(&self, name: &str) -> Result<bool, ClientError> {
        let resp: InUseResponse = self.api.get(&format!("names/{}/in-use", name), &[]).await?;
        Ok(resp.in_use)
    }
}
