//! Non-fungible flows. One token per commitment, so transfers are 1-in/1-out
//! and never produce change.

use tracing::info;

use umbra_commitment::{
    AssetClass, AssetValue, Commitment, CommitmentHash, CommitmentSnapshot, CommitmentTransaction,
    Salt, TokenId, TransactionType,
};

use super::transfer::opening;
use super::{Orchestrator, SpendOutcome, UserSession};
use crate::channel::Notification;
use crate::clients::{SpendInput, SpendOutput, SpendRequest, TxReceipt};
use crate::error::{Step, TransferError};
use crate::store::StoreBatch;

impl Orchestrator {
    pub async fn mint_nft(
        &self,
        session: &UserSession,
        token_id: TokenId,
        token_uri: &str,
    ) -> Result<Commitment, TransferError> {
        self.mint(session, AssetValue::nft(token_id, token_uri)).await
    }

    pub async fn burn_nft(
        &self,
        session: &UserSession,
        input: &CommitmentHash,
        receiver: &str,
    ) -> Result<TxReceipt, TransferError> {
        self.burn(session, AssetClass::NonFungible, input, receiver).await
    }

    pub async fn transfer_nft(
        &self,
        session: &UserSession,
        input: &CommitmentHash,
        receiver: &str,
    ) -> Result<SpendOutcome, TransferError> {
        let mut inputs = self.load_inputs(session, AssetClass::NonFungible, std::slice::from_ref(input))?;
        let input = inputs.remove(0);
        let failed = || {
            CommitmentTransaction::new(TransactionType::TransferOutgoing, AssetClass::NonFungible)
                .inputs(vec![input.snapshot()])
                .outputs(vec![CommitmentSnapshot::requested(input.value.clone(), receiver)])
                .sender(session.identity.clone())
        };
        self.vet_parties(session, &[receiver], &failed).await?;

        let salt = Salt::random();
        let result = self.transfer_nft_steps(session, &input, receiver, salt).await;
        self.settle(session, failed, result)
    }

    async fn transfer_nft_steps(
        &self,
        session: &UserSession,
        input: &Commitment,
        receiver: &str,
        salt: Salt,
    ) -> Result<SpendOutcome, TransferError> {
        let account = self.one_time_account(session).await?;
        let to = self.resolve_receiver(receiver).await?;
        let sender_secret = self.sender_secret(session)?;

        let ctx = self.assets.nft.with_account(account);
        let request = SpendRequest {
            inputs: vec![SpendInput::from(input)],
            outputs: vec![SpendOutput {
                value: input.value.clone(),
                salt,
                receiver_public_key: to.public_key,
            }],
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
        let [sent] = receipt.outputs[..] else {
            return Err(anyhow::anyhow!(
                "ledger returned {} outputs for a token transfer",
                receipt.outputs.len()
            )
            .into());
        };

        let notification = Notification::NftCommitment(opening(
            &ctx,
            &request.outputs[0],
            &to,
            session,
            sent.commitment,
            sent.commitment_index,
            &receipt,
        ));
        self.ready_notice(session, &mut notice, notification)?;

        let output = CommitmentSnapshot::intended(input.value.clone(), salt, to.identity())
            .confirmed(sent.commitment, sent.commitment_index);
        let mut spent = input.clone();
        spent.is_transferred = true;

        let record = CommitmentTransaction::new(TransactionType::TransferOutgoing, AssetClass::NonFungible)
            .inputs(vec![input.snapshot()])
            .outputs(vec![output.clone()])
            .sender(session.identity.clone())
            .receiver(to.identity())
            .block_number(receipt.receipt.block_number);

        self.commit(
            session,
            StoreBatch {
                updates: vec![spent],
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
            "token transfer submitted"
        );

        self.deliver(session, notice).await?;

        Ok(SpendOutcome {
            receipt: receipt.receipt,
            outputs: vec![output],
            change: None,
        })
    }
}
