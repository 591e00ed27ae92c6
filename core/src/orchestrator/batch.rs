//! Fixed-width fan-out and fan-in.
//!
//! The batch circuit always consumes [`BATCH_WIDTH`] output slots. Requested
//! outputs take the first slots in order; the rest are addressed back to the
//! sender. When value is left over, the first of those padding slots carries
//! it as change and every other padding slot carries zero.
//!
//! ```text
//!  slot  0 .. n-1     n            n+1 .. 19
//!       ┌──────────┬────────────┬──────────────┐
//!       │ receivers│ change (≥0)│ zero padding │
//!       └──────────┴────────────┴──────────────┘
//! ```

use futures::future::try_join_all;
use std::collections::HashMap;
use tracing::info;

use umbra_commitment::{
    AssetClass, AssetValue, BATCH_WIDTH, Commitment, CommitmentHash, CommitmentSnapshot,
    CommitmentTransaction, FtValue, Identity, Salt, TransactionType,
};

use super::transfer::opening;
use super::{Orchestrator, ResolvedReceiver, SpendOutcome, UserSession, ft_total, snapshots};
use crate::channel::Notification;
use crate::clients::{SpendInput, SpendOutput, SpendRequest};
use crate::error::{Step, TransferError, ValidationError};
use crate::store::{OutboxEntry, StoreBatch};

/// One requested batch output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    pub value: FtValue,
    pub receiver: String,
}

impl BatchOutput {
    pub fn new(value: impl Into<FtValue>, receiver: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            receiver: receiver.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    Receiver,
    Change,
    Padding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlot {
    pub value: FtValue,
    pub salt: Salt,
    pub owner: Identity,
    pub role: SlotRole,
}

/// The full slot list submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub slots: Vec<BatchSlot>,
    /// Slot carrying the remainder back to the sender.
    pub change_slot: Option<usize>,
}

impl BatchPlan {
    /// Whether `requested` outputs and `remainder` fit the circuit.
    pub fn check(requested: usize, remainder: FtValue) -> Result<(), ValidationError> {
        if requested > BATCH_WIDTH {
            return Err(ValidationError::TooManyOutputs(requested));
        }
        if requested == BATCH_WIDTH && !remainder.is_zero() {
            return Err(ValidationError::NoChangeSlot(remainder));
        }
        Ok(())
    }

    pub fn build(
        requested: Vec<(FtValue, Identity)>,
        sender: &Identity,
        remainder: FtValue,
    ) -> Result<Self, ValidationError> {
        Self::check(requested.len(), remainder)?;

        let mut slots: Vec<BatchSlot> = requested
            .into_iter()
            .map(|(value, owner)| BatchSlot {
                value,
                salt: Salt::random(),
                owner,
                role: SlotRole::Receiver,
            })
            .collect();

        let mut change_slot = None;
        while slots.len() < BATCH_WIDTH {
            let carries_change = change_slot.is_none() && !remainder.is_zero();
            if carries_change {
                change_slot = Some(slots.len());
            }
            slots.push(BatchSlot {
                value: if carries_change { remainder } else { FtValue::ZERO },
                salt: Salt::random(),
                owner: sender.clone(),
                role: if carries_change {
                    SlotRole::Change
                } else {
                    SlotRole::Padding
                },
            });
        }

        Ok(Self { slots, change_slot })
    }

    pub fn spend_outputs(&self) -> Vec<SpendOutput> {
        self.slots
            .iter()
            .map(|slot| SpendOutput {
                value: AssetValue::ft(slot.value),
                salt: slot.salt,
                receiver_public_key: slot.owner.public_key,
            })
            .collect()
    }

    /// Slots addressed to requested receivers, with their index.
    pub fn receivers(&self) -> impl Iterator<Item = (usize, &BatchSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.role == SlotRole::Receiver)
    }

    pub fn change(&self) -> Option<&BatchSlot> {
        self.change_slot.map(|i| &self.slots[i])
    }
}

impl Orchestrator {
    /// Fan one commitment out to up to [`BATCH_WIDTH`] receivers.
    pub async fn batch_transfer_ft(
        &self,
        session: &UserSession,
        input: &CommitmentHash,
        outputs: &[BatchOutput],
    ) -> Result<SpendOutcome, TransferError> {
        if outputs.is_empty() || outputs.iter().any(|o| o.value.is_zero()) {
            return Err(ValidationError::ZeroValue.into());
        }
        if outputs.len() > BATCH_WIDTH {
            return Err(ValidationError::TooManyOutputs(outputs.len()).into());
        }

        let inputs = self.load_inputs(session, AssetClass::Fungible, std::slice::from_ref(input))?;
        let available = ft_total(&inputs)?;
        let requested_values: Vec<FtValue> = outputs.iter().map(|o| o.value).collect();
        let requested = FtValue::total(&requested_values)?;

        let failed = || {
            CommitmentTransaction::new(TransactionType::Batch, AssetClass::Fungible)
                .inputs(snapshots(&inputs))
                .outputs(
                    outputs
                        .iter()
                        .map(|o| CommitmentSnapshot::requested(AssetValue::ft(o.value), o.receiver.clone()))
                        .collect(),
                )
                .sender(session.identity.clone())
        };

        if requested > available {
            let err = TransferError::from(ValidationError::Overspend {
                available,
                requested,
            });
            self.record_failure(session, failed(), &err);
            return Err(err);
        }
        let remainder = available.checked_sub(requested)?;
        BatchPlan::check(outputs.len(), remainder)?;

        let mut names: Vec<&str> = outputs.iter().map(|o| o.receiver.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        self.vet_parties(session, &names, &failed).await?;

        let result = self.batch_steps(session, &inputs[0], outputs, &names, remainder).await;
        self.settle(session, failed, result)
    }

    async fn batch_steps(
        &self,
        session: &UserSession,
        input: &Commitment,
        outputs: &[BatchOutput],
        names: &[&str],
        remainder: FtValue,
    ) -> Result<SpendOutcome, TransferError> {
        let account = self.one_time_account(session).await?;
        let resolved = try_join_all(names.iter().map(|name| self.resolve_receiver(name))).await?;
        let resolved: HashMap<&str, ResolvedReceiver> = names.iter().copied().zip(resolved).collect();
        let sender_secret = self.sender_secret(session)?;

        let requested = outputs
            .iter()
            .map(|o| {
                let to = resolved
                    .get(o.receiver.as_str())
                    .ok_or_else(|| anyhow::anyhow!("receiver {} was not resolved", o.receiver))?;
                Ok((o.value, to.identity()))
            })
            .collect::<Result<Vec<_>, TransferError>>()?;
        let plan = BatchPlan::build(requested, &session.identity, remainder)?;

        let ctx = self.assets.ft.with_account(account);
        let request = SpendRequest {
            inputs: vec![SpendInput::from(input)],
            outputs: plan.spend_outputs(),
            sender_secret,
        };

        let mut notices: Vec<(usize, OutboxEntry)> = Vec::new();
        for (i, slot) in plan.receivers() {
            let to = &resolved[slot.owner.name.as_str()];
            notices.push((i, self.prepare_notice(session, &to.name, to.messaging_key)?));
        }

        let receipt = match self
            .ledger_call(
                Step::LedgerBatchTransfer,
                self.ledger.batch_transfer(&ctx, request.clone()),
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.abandon_notices(session, notices.into_iter().map(|(_, n)| n).collect());
                return Err(e);
            }
        };
        if receipt.outputs.len() != plan.slots.len() {
            return Err(anyhow::anyhow!(
                "ledger returned {} outputs for {} batch slots",
                receipt.outputs.len(),
                plan.slots.len()
            )
            .into());
        }

        for (i, notice) in notices.iter_mut() {
            let to = &resolved[plan.slots[*i].owner.name.as_str()];
            let committed = receipt.outputs[*i];
            let notification = Notification::FtCommitment(opening(
                &ctx,
                &request.outputs[*i],
                to,
                session,
                committed.commitment,
                committed.commitment_index,
                &receipt,
            ));
            self.ready_notice(session, notice, notification)?;
        }

        let mut recorded: Vec<CommitmentSnapshot> = plan
            .receivers()
            .map(|(i, slot)| {
                CommitmentSnapshot::intended(AssetValue::ft(slot.value), slot.salt, slot.owner.clone())
                    .confirmed(receipt.outputs[i].commitment, receipt.outputs[i].commitment_index)
            })
            .collect();

        let change = plan.change_slot.map(|i| {
            let slot = &plan.slots[i];
            let mut c = Commitment::new(
                AssetValue::ft(slot.value),
                slot.salt,
                session.identity.clone(),
                receipt.outputs[i].commitment,
                receipt.outputs[i].commitment_index,
            );
            c.is_change = true;
            c
        });
        recorded.extend(change.iter().map(Commitment::snapshot));

        let mut spent = input.clone();
        spent.is_batch_transferred = true;

        let record = CommitmentTransaction::new(TransactionType::Batch, AssetClass::Fungible)
            .inputs(vec![input.snapshot()])
            .outputs(recorded.clone())
            .sender(session.identity.clone())
            .block_number(receipt.receipt.block_number);

        self.commit(
            session,
            StoreBatch {
                inserts: change.iter().cloned().collect(),
                updates: vec![spent],
                transactions: vec![record],
                ..StoreBatch::default()
            },
            &receipt.receipt.tx_hash,
        )?;

        info!(
            tenant = %session.tenant,
            outputs = outputs.len(),
            change = %plan.change().map(|s| s.value).unwrap_or_default(),
            tx_hash = %receipt.receipt.tx_hash,
            "batch transfer submitted"
        );

        let mut first_failure = None;
        for (_, notice) in notices {
            if let Err(e) = self.deliver(session, notice).await {
                first_failure.get_or_insert(e);
            }
        }
        if let Some(e) = first_failure {
            return Err(e);
        }

        Ok(SpendOutcome {
            receipt: receipt.receipt,
            outputs: recorded,
            change,
        })
    }

    /// Collapse exactly [`BATCH_WIDTH`] commitments into one for `receiver`.
    ///
    /// `value` must equal the inputs' total; there is no change.
    pub async fn consolidate_ft(
        &self,
        session: &UserSession,
        inputs: &[CommitmentHash],
        receiver: &str,
        value: FtValue,
    ) -> Result<SpendOutcome, TransferError> {
        if inputs.len() != BATCH_WIDTH {
            return Err(ValidationError::InputCount {
                expected: "20",
                got: inputs.len(),
            }
            .into());
        }
        let inputs = self.load_inputs(session, AssetClass::Fungible, inputs)?;
        let total = ft_total(&inputs)?;
        if total != value {
            return Err(ValidationError::ConsolidationMismatch {
                inputs: total,
                output: value,
            }
            .into());
        }
        if value.is_zero() {
            return Err(ValidationError::ZeroValue.into());
        }

        let salt = Salt::random();
        let failed = || {
            CommitmentTransaction::new(TransactionType::Consolidate, AssetClass::Fungible)
                .inputs(snapshots(&inputs))
                .outputs(vec![CommitmentSnapshot::requested(AssetValue::ft(value), receiver)])
                .sender(session.identity.clone())
        };
        self.vet_parties(session, &[receiver], &failed).await?;

        let result = self.consolidate_steps(session, &inputs, receiver, value, salt).await;
        self.settle(session, failed, result)
    }

    async fn consolidate_steps(
        &self,
        session: &UserSession,
        inputs: &[Commitment],
        receiver: &str,
        value: FtValue,
        salt: Salt,
    ) -> Result<SpendOutcome, TransferError> {
        let account = self.one_time_account(session).await?;
        let to = self.resolve_receiver(receiver).await?;
        let sender_secret = self.sender_secret(session)?;

        let ctx = self.assets.ft.with_account(account);
        let request = SpendRequest {
            inputs: inputs.iter().map(SpendInput::from).collect(),
            outputs: vec![SpendOutput {
                value: AssetValue::ft(value),
                salt,
                receiver_public_key: to.public_key,
            }],
            sender_secret,
        };

        let mut notice = self.prepare_notice(session, &to.name, to.messaging_key)?;
        let receipt = match self
            .ledger_call(Step::LedgerConsolidate, self.ledger.consolidate(&ctx, request.clone()))
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.abandon_notices(session, vec![notice]);
                return Err(e);
            }
        };
        let [merged] = receipt.outputs[..] else {
            return Err(anyhow::anyhow!(
                "ledger returned {} outputs for a consolidation",
                receipt.outputs.len()
            )
            .into());
        };

        let notification = Notification::FtCommitment(opening(
            &ctx,
            &request.outputs[0],
            &to,
            session,
            merged.commitment,
            merged.commitment_index,
            &receipt,
        ));
        self.ready_notice(session, &mut notice, notification)?;

        let output = CommitmentSnapshot::intended(AssetValue::ft(value), salt, to.identity())
            .confirmed(merged.commitment, merged.commitment_index);
        let spent: Vec<Commitment> = inputs
            .iter()
            .cloned()
            .map(|mut c| {
                c.is_consolidate_transferred = true;
                c
            })
            .collect();

        let record = CommitmentTransaction::new(TransactionType::Consolidate, AssetClass::Fungible)
            .inputs(snapshots(inputs))
            .outputs(vec![output.clone()])
            .sender(session.identity.clone())
            .receiver(to.identity())
            .block_number(receipt.receipt.block_number);

        self.commit(
            session,
            StoreBatch {
                updates: spent,
                transactions: vec![record],
                ..StoreBatch::default()
            },
            &receipt.receipt.tx_hash,
        )?;

        info!(
            tenant = %session.tenant,
            receiver = %to.name,
            commitment = %merged.commitment,
            tx_hash = %receipt.receipt.tx_hash,
            "consolidation submitted"
        );

        self.deliver(session, notice).await?;

        Ok(SpendOutcome {
            receipt: receipt.receipt,
            outputs: vec![output],
            change: None,
        })
    }
}
