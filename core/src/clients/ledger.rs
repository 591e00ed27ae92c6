//! Ledger Client
//!
//! The proving/ledger service builds the zero-knowledge proof for each
//! operation, submits it, and maintains the commitment accumulator. This
//! module only defines the contract; the proofs themselves are opaque.
//!
//! ```text
//! mint             value, pk, salt            → commitment, index
//! transfer         2 in  → 2 out              → commitments, indices
//! batch_transfer   1 in  → 20 out             → commitments, indices
//! consolidate      20 in → 1 out              → commitment, index
//! burn             1 in  → public balance     → receipt
//! check_correctness opening @ block           → (reconciles, on-chain)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use umbra_commitment::{
    Address, AssetValue, Commitment, CommitmentHash, Salt, ZkpPublicKey, ZkpSecretKey,
};

use super::http::JsonService;
use super::{AssetContext, ClientError};

const SERVICE: &str = "ledger";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRequest {
    pub value: AssetValue,
    pub owner_public_key: ZkpPublicKey,
    pub salt: Salt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintReceipt {
    pub commitment: CommitmentHash,
    pub commitment_index: u64,
    pub receipt: TxReceipt,
}

/// Opening of a commitment being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendInput {
    pub value: AssetValue,
    pub salt: Salt,
    pub owner_public_key: ZkpPublicKey,
    pub commitment: CommitmentHash,
    pub commitment_index: u64,
}

impl From<&Commitment> for SpendInput {
    fn from(c: &Commitment) -> Self {
        Self {
            value: c.value.clone(),
            salt: c.salt,
            owner_public_key: c.owner.public_key,
            commitment: c.commitment,
            commitment_index: c.commitment_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendOutput {
    pub value: AssetValue,
    pub salt: Salt,
    pub receiver_public_key: ZkpPublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendRequest {
    pub inputs: Vec<SpendInput>,
    pub outputs: Vec<SpendOutput>,
    pub sender_secret: ZkpSecretKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCommitment {
    pub commitment: CommitmentHash,
    pub commitment_index: u64,
}

/// Output commitments in the same order as the request's outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendReceipt {
    pub outputs: Vec<OutputCommitment>,
    pub receipt: TxReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnRequest {
    pub input: SpendInput,
    pub sender_secret: ZkpSecretKey,
    pub receiver_address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectnessQuery {
    pub value: AssetValue,
    pub salt: Salt,
    pub public_key: ZkpPublicKey,
    pub commitment: CommitmentHash,
    pub commitment_index: u64,
    pub block_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectnessReport {
    /// Recomputed hash equals the claimed commitment.
    pub z_correct: bool,
    /// The accumulator holds the commitment at the claimed index.
    pub z_onchain_correct: bool,
}

impl CorrectnessReport {
    pub fn accepted(&self) -> bool {
        self.z_correct && self.z_onchain_correct
    }
}

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn mint(&self, ctx: &AssetContext, req: MintRequest) -> Result<MintReceipt, ClientError>;

    async fn transfer(&self, ctx: &AssetContext, req: SpendRequest) -> Result<SpendReceipt, ClientError>;

    async fn batch_transfer(
        &self,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError>;

    async fn consolidate(
        &self,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError>;

    async fn burn(&self, ctx: &AssetContext, req: BurnRequest) -> Result<TxReceipt, ClientError>;

    async fn check_correctness(
        &self,
        ctx: &AssetContext,
        query: CorrectnessQuery,
    ) -> Result<CorrectnessReport, ClientError>;
}

// ============================================================================
// HTTP Client
// ============================================================================

#[derive(Serialize)]
struct Call<'a, T> {
    context: &'a AssetContext,
    request: &'a T,
}

/// Client for a remote proving/ledger service.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    api: JsonService,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonService::new(SERVICE, base_url, timeout)?,
        })
    }

    async fn call<Req, Resp>(&self, ctx: &AssetContext, op: &str, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let path = format!("{}/{}", ctx.asset_class.as_str(), op);
        self.api
            .post(&path, &Call {
                context: ctx,
                request,
            })
            .await
    }

    async fn spend(&self, ctx: &AssetContext, op: &str, req: SpendRequest) -> Result<SpendReceipt, ClientError> {
        let expected = req.outputs.len();
        let receipt: SpendReceipt = self.call(ctx, op, &req).await?;
        if receipt.outputs.len() != expected {
            return Err(ClientError::protocol(
                SERVICE,
                format!("{} returned {} outputs, expected {}", op, receipt.outputs.len(), expected),
            ));
        }
        Ok(receipt)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn mint(&self, ctx: &AssetContext, req: MintRequest) -> Result<MintReceipt, ClientError> {
        self.call(ctx, "mint", &req).await
    }

    async fn transfer(&self, ctx: &AssetContext, req: SpendRequest) -> Result<SpendReceipt, ClientError> {
        self.spend(ctx, "transfer", req).await
    }

    async fn batch_transfer(
        &self,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError> {
        self.spend(ctx, "batch-transfer", req).await
    }

    async fn consolidate(
        &self,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError> {
        self.spend(ctx, "consolidate", req).await
    }

    async fn burn(&self, ctx: &AssetContext, req: BurnRequest) -> Result<TxReceipt, ClientError> {
        self.call(ctx, "burn", &req).await
    }

    async fn check_correctness(
        &self,
        ctx: &AssetContext,
        query: CorrectnessQuery,
    ) -> Result<CorrectnessReport, ClientError> {
        self.call(ctx, "check-correctness", &query).await
    }
}
