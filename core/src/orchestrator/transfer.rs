use tracing::info;

use umbra_commitment::{
    AssetClass, AssetValue, Commitment, CommitmentHash, CommitmentSnapshot, CommitmentTransaction,
    FtValue, Salt, TransactionType,
};

use super::{Orchestrator, ResolvedReceiver, SpendOutcome, UserSession, ft_total, snapshots};
use crate::channel::{CommitmentNotice, Notification};
use crate::clients::{AssetContext, MintRequest, SpendInput, SpendOutput, SpendReceipt, SpendRequest};
use crate::error::{Step, TransferError, ValidationError};
use crate::store::StoreBatch;

impl Orchestrator {
    /// Mint `value` into a new commitment owned by the session user.
    pub async fn mint_ft(
        &self,
        session: &UserSession,
        value: FtValue,
    ) -> Result<Commitment, TransferError> {
        if value.is_zero() {
            return Err(ValidationError::ZeroValue.into());
        }
        self.mint(session, AssetValue::ft(value)).await
    }

    pub(super) async fn mint(
        &self,
        session: &UserSession,
        value: AssetValue,
    ) -> Result<Commitment, TransferError> {
        let class = value.class();
        let salt = Salt::random();
        let owner = session.identity.clone();
        let intended = CommitmentSnapshot::intended(value.clone(), salt, owner.clone());

        let ctx = self.standing_context(session, class);
        let request = MintRequest {
            value: value.clone(),
            owner_public_key: owner.public_key,
            salt,
        };
        let result = self
            .ledger_call(Step::LedgerMint, self.ledger.mint(&ctx, request))
            .await;
        let receipt = self.settle(
            session,
            || {
                CommitmentTransaction::new(TransactionType::Mint, class)
                    .outputs(vec![intended.clone()])
                    .receiver(owner.clone())
            },
            result,
        )?;

        let mut commitment = Commitment::new(value, salt, owner.clone(), receipt.commitment, receipt.commitment_index);
        commitment.is_minted = true;

        let record = CommitmentTransaction::new(TransactionType::Mint, class)
            .outputs(vec![commitment.snapshot()])
            .receiver(owner)
            .block_number(receipt.receipt.block_number);

        self.commit(
            session,
            StoreBatch {
                inserts: vec![commitment.clone()],
                transactions: vec![record],
                ..StoreBatch::default()
            },
            &receipt.receipt.tx_hash,
        )?;

        info!(
            tenant = %session.tenant,
            class = class.as_str(),
            commitment = %commitment.commitment,
            index = commitment.commitment_index,
            "minted"
        );
        Ok(commitment)
    }

    /// Move `value` from one or two of the user's commitments to `receiver`.
    ///
    /// Outputs are `[transfer, change]`; change goes back to the sender and is
    /// only stored when nonzero.
    pub async fn transfer_ft(
        &self,
        session: &UserSession,
        inputs: &[CommitmentHash],
        receiver: &str,
        value: FtValue,
    ) -> Result<SpendOutcome, TransferError> {
        // Validation
        if !(1..=2).contains(&inputs.len()) {
            return Err(ValidationError::InputCount {
                expected: "1 or 2",
                got: inputs.len(),
            }
            .into());
        }
        if value.is_zero() {
            return Err(ValidationError::ZeroValue.into());
        }
        let inputs = self.load_inputs(session, AssetClass::Fungible, inputs)?;
        let available = ft_total(&inputs)?;
        if available < value {
            return Err(ValidationError::Overspend {
                available,
                requested: value,
            }
            .into());
        }
        let change = available.checked_sub(value)?;

        let transfer_salt = Salt::random();
        let change_salt = Salt::random();
        let intended_outputs = {
            let mut outputs = vec![CommitmentSnapshot::requested(AssetValue::ft(value), receiver)];
            if !change.is_zero() {
                outputs.push(CommitmentSnapshot::intended(
                    AssetValue::ft(change),
                    change_salt,
                    session.identity.clone(),
                ));
            }
            outputs
        };
        let failed = || {
            CommitmentTransaction::new(TransactionType::TransferOutgoing, AssetClass::Fungible)
                .inputs(snapshots(&inputs))
                .outputs(intended_outputs.clone())
                .sender(session.identity.clone())
        };
        self.vet_parties(session, &[receiver], &failed).await?;

        let result = self
            .transfer_steps(session, &inputs, receiver, value, change, transfer_salt, change_salt)
            .await;
        self.settle(session, failed, result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer_steps(
        &self,
        session: &UserSession,
        inputs: &[Commitment],
        receiver: &str,
        value: FtValue,
        change: FtValue,
        transfer_salt: Salt,
        change_salt: Salt,
    ) -> Result<SpendOutcome, TransferError> {
        let account = self.one_time_account(session).await?;
        let to = self.resolve_receiver(receiver).await?;
        let sender_secret = self.sender_secret(session)?;

        let ctx = self.assets.ft.with_account(account);
        let request = SpendRequest {
            inputs: inputs.iter().map(SpendInput::from).collect(),
            outputs: vec![
                SpendOutput {
                    value: AssetValue::ft(value),
                    salt: transfer_salt,
                    receiver_public_key: to.public_key,
                },
                SpendOutput {
                    value: AssetValue::ft(change),
                    salt: change_salt,
                    receiver_public_key: session.identity.public_key,
                },
            ],
            sender_secret,
        };

        let mut notice = self.prepare_notice(session, &to.name, to.messaging_key)?;
        let receipt = match self
            .ledger_call(Step::LedgerTransfer, self.ledger.transfer(&ctx, request.clone()))
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.abandon_notices(session, vec![notice]);
                return Err(e);
            }
        };

        let [sent, kept] = receipt.outputs[..] else {
            return Err(anyhow::anyhow!(
                "ledger returned {} outputs for a two-output transfer",
                receipt.outputs.len()
            )
            .into());
        };

        let notification = Notification::FtCommitment(opening(
            &ctx,
            &request.outputs[0],
            &to,
            session,
            sent.commitment,
            sent.commitment_index,
            &receipt,
        ));
        self.ready_notice(session, &mut notice, notification)?;

        let transferred = CommitmentSnapshot::intended(AssetValue::ft(value), transfer_salt, to.identity())
            .confirmed(sent.commitment, sent.commitment_index);

        let change_commitment = (!change.is_zero()).then(|| {
            let mut c = Commitment::new(
                AssetValue::ft(change),
                change_salt,
                session.identity.clone(),
                kept.commitment,
                kept.commitment_index,
            );
            c.is_change = true;
            c
        });

        let mut outputs = vec![transferred];
        outputs.extend(change_commitment.iter().map(Commitment::snapshot));

        let spent: Vec<Commitment> = inputs
            .iter()
            .cloned()
            .map(|mut c| {
                c.is_transferred = true;
                c
            })
            .collect();

        let record = CommitmentTransaction::new(TransactionType::TransferOutgoing, AssetClass::Fungible)
            .inputs(snapshots(inputs))
            .outputs(outputs.clone())
            .sender(session.identity.clone())
            .receiver(to.identity())
            .block_number(receipt.receipt.block_number);

        self.commit(
            session,
            StoreBatch {
                inserts: change_commitment.iter().cloned().collect(),
                updates: spent,
                transactions: vec![record],
                ..StoreBatch::default()
            },
            &receipt.receipt.tx_hash,
        )?;

        info!(
            tenant = %session.tenant,
            receiver = %to.name,
            commitment = %sent.commitment,
            tx_hash = %receipt.receipt.tx_hash,
            "transfer submitted"
        );

        self.deliver(session, notice).await?;

        Ok(SpendOutcome {
            receipt: receipt.receipt,
            outputs,
            change: change_commitment,
        })
    }
}

/// Opening of `output` as the ledger committed it, addressed to `to`.
pub(super) fn opening(
    ctx: &AssetContext,
    output: &SpendOutput,
    to: &ResolvedReceiver,
    session: &UserSession,
    commitment: CommitmentHash,
    commitment_index: u64,
    receipt: &SpendReceipt,
) -> CommitmentNotice {
    CommitmentNotice {
        value: output.value.clone(),
        salt: output.salt,
        public_key: output.receiver_public_key,
        commitment,
        commitment_index,
        block_number: receipt.receipt.block_number,
        token_contract: ctx.token_contract,
        shield_contract: ctx.shield_contract,
        sender: session.identity.clone(),
        receiver: to.identity(),
    }
}
