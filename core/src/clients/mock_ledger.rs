//! In-process ledger for development and tests.
//!
//! Keeps an append-only accumulator per asset class, computes commitments with
//! [`commitment_hash`], enforces value conservation on spends and answers
//! correctness checks from its own records. No proofs are generated.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use umbra_commitment::{AssetClass, CommitmentHash, FtValue, commitment_hash};

use super::ledger::{
    BurnRequest, CorrectnessQuery, CorrectnessReport, LedgerClient, MintReceipt, MintRequest,
    OutputCommitment, SpendInput, SpendReceipt, SpendRequest, TxReceipt,
};
use super::{AssetContext, ClientError};

const SERVICE: &str = "ledger";

#[derive(Debug, Clone, Copy)]
struct LeafRecord {
    index: u64,
    block_number: u64,
    spent: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    leaves: HashMap<(AssetClass, CommitmentHash), LeafRecord>,
    next_index: u64,
    block_number: u64,
    calls: HashMap<&'static str, usize>,
    fail_next: HashMap<&'static str, String>,
    submitted: Vec<(&'static str, SpendRequest)>,
}

/// Mock ledger used when `ledger.mode = "mock"`.
#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    latency: Mutex<Option<Duration>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `op` fail with `message`.
    pub fn fail_next(&self, op: &'static str, message: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next.insert(op, message.into());
        }
    }

    /// Delay every call, for exercising timeouts.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = Some(latency);
        }
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.get(op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Spend requests submitted so far, with the operation name.
    pub fn submitted(&self) -> Vec<(&'static str, SpendRequest)> {
        self.state
            .lock()
            .map(|s| s.submitted.clone())
            .unwrap_or_default()
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().map(|s| s.block_number).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, ClientError> {
        self.state
            .lock()
            .map_err(|_| ClientError::protocol(SERVICE, "mock ledger state poisoned"))
    }

    async fn enter(&self, op: &'static str) -> Result<(), ClientError> {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock()?;
        *state.calls.entry(op).or_default() += 1;
        match state.fail_next.remove(op) {
            Some(message) => Err(ClientError::rejected(SERVICE, message)),
            None => Ok(()),
        }
    }

    fn spend(
        &self,
        op: &'static str,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError> {
        let mut state = self.lock()?;

        for input in &req.inputs {
            check_input(&state, ctx, input)?;
        }
        if ctx.asset_class == AssetClass::Fungible {
            let total_in = ft_total(req.inputs.iter().map(|i| &i.value))?;
            let total_out = ft_total(req.outputs.iter().map(|o| &o.value))?;
            if total_in != total_out {
                return Err(ClientError::rejected(
                    SERVICE,
                    format!("inputs {} do not balance outputs {}", total_in, total_out),
                ));
            }
        }

        state.block_number += 1;
        let block_number = state.block_number;
        for input in &req.inputs {
            if let Some(leaf) = state.leaves.get_mut(&(ctx.asset_class, input.commitment)) {
                leaf.spent = true;
            }
        }

        let mut outputs = Vec::with_capacity(req.outputs.len());
        for output in &req.outputs {
            let commitment = commitment_hash(
                &ctx.token_contract,
                &output.value,
                &output.receiver_public_key,
                &output.salt,
            );
            let index = append_leaf(&mut state, ctx.asset_class, commitment, block_number)?;
            outputs.push(OutputCommitment {
                commitment,
                commitment_index: index,
            });
        }

        debug!(op, inputs = req.inputs.len(), outputs = outputs.len(), block_number, "mock spend");
        state.submitted.push((op, req));

        Ok(SpendReceipt {
            outputs,
            receipt: receipt(op, block_number),
        })
    }
}

fn receipt(op: &str, block_number: u64) -> TxReceipt {
    let digest = blake3::hash(format!("{}:{}", op, block_number).as_bytes());
    TxReceipt {
        tx_hash: format!("0x{}", digest.to_hex()),
        block_number,
    }
}

fn ft_total<'a>(
    values: impl Iterator<Item = &'a umbra_commitment::AssetValue>,
) -> Result<FtValue, ClientError> {
    let amounts: Vec<FtValue> = values
        .map(|v| {
            v.as_ft()
                .ok_or_else(|| ClientError::rejected(SERVICE, "non-fungible value in fungible spend"))
        })
        .collect::<Result<_, _>>()?;
    FtValue::total(&amounts).map_err(|e| ClientError::rejected(SERVICE, e.to_string()))
}

fn check_input(state: &LedgerState, ctx: &AssetContext, input: &SpendInput) -> Result<(), ClientError> {
    let recomputed = commitment_hash(
        &ctx.token_contract,
        &input.value,
        &input.owner_public_key,
        &input.salt,
    );
    if recomputed != input.commitment {
        return Err(ClientError::rejected(
            SERVICE,
            format!("opening does not match {}", input.commitment),
        ));
    }

    match state.leaves.get(&(ctx.asset_class, input.commitment)) {
        None => Err(ClientError::rejected(
            SERVICE,
            format!("unknown commitment {}", input.commitment),
        )),
        Some(leaf) if leaf.spent => Err(ClientError::rejected(
            SERVICE,
            format!("commitment {} already spent", input.commitment),
        )),
        Some(leaf) if leaf.index != input.commitment_index => Err(ClientError::rejected(
            SERVICE,
            format!("commitment {} is not at index {}", input.commitment, input.commitment_index),
        )),
        Some(_) => Ok(()),
    }
}

fn append_leaf(
    state: &mut LedgerState,
    class: AssetClass,
    commitment: CommitmentHash,
    block_number: u64,
) -> Result<u64, ClientError> {
    if state.leaves.contains_key(&(class, commitment)) {
        return Err(ClientError::rejected(
            SERVICE,
            format!("commitment {} already exists", commitment),
        ));
    }
    let index = state.next_index;
    state.next_index += 1;
    state.leaves.insert(
        (class, commitment),
        LeafRecord {
            index,
            block_number,
            spent: false,
        },
    );
    Ok(index)
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn mint(&self, ctx: &AssetContext, req: MintRequest) -> Result<MintReceipt, ClientError> {
        self.enter("mint").await?;
        let mut state = self.lock()?;

        let commitment = commitment_hash(
            &ctx.token_contract,
            &req.value,
            &req.owner_public_key,
            &req.salt,
        );
        state.block_number += 1;
        let block_number = state.block_number;
        let index = append_leaf(&mut state, ctx.asset_class, commitment, block_number)?;

        Ok(MintReceipt {
            commitment,
            commitment_index: index,
            receipt: receipt("mint", block_number),
        })
    }

    async fn transfer(&self, ctx: &AssetContext, req: SpendRequest) -> Result<SpendReceipt, ClientError> {
        self.enter("transfer").await?;
        self.spend("transfer", ctx, req)
    }

    async fn batch_transfer(
        &self,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError> {
        self.enter("batch_transfer").await?;
        self.spend("batch_transfer", ctx, req)
    }

    async fn consolidate(
        &self,
        ctx: &AssetContext,
        req: SpendRequest,
    ) -> Result<SpendReceipt, ClientError> {
        self.enter("consolidate").await?;
        self.spend("consolidate", ctx, req)
    }

    async fn burn(&self, ctx: &AssetContext, req: BurnRequest) -> Result<TxReceipt, ClientError> {
        self.enter("burn").await?;
        let mut state = self.lock()?;

        check_input(&state, ctx, &req.input)?;
        state.block_number += 1;
        let block_number = state.block_number;
        if let Some(leaf) = state.leaves.get_mut(&(ctx.asset_class, req.input.commitment)) {
            leaf.spent = true;
        }
        Ok(receipt("burn", block_number))
    }

    async fn check_correctness(
        &self,
        ctx: &AssetContext,
        query: CorrectnessQuery,
    ) -> Result<CorrectnessReport, ClientError> {
        self.enter("check_correctness").await?;
        let state = self.lock()?;

        let recomputed = commitment_hash(&ctx.token_contract, &query.value, &query.public_key, &query.salt);
        let z_onchain_correct = state
            .leaves
            .get(&(ctx.asset_class, query.commitment))
            .map(|leaf| leaf.index == query.commitment_index && leaf.block_number <= query.block_number)
            .unwrap_or(false);

        Ok(CorrectnessReport {
            z_correct: recomputed == query.commitment,
            z_onchain_correct,
        })
    }
}
