use chrono::Utc;
use tracing::info;

use umbra_commitment::{
    AssetClass, Commitment, CommitmentHash, CommitmentTransaction, Identity, PublicTokenTransaction,
    PublicTransferKind, TransactionType,
};

use super::{Orchestrator, UserSession};
use crate::channel::{Notification, TokenNotice};
use crate::clients::{BurnRequest, SpendInput, TxReceipt};
use crate::error::{Step, TransferError};
use crate::store::StoreBatch;

impl Orchestrator {
    /// Release a fungible commitment to `receiver`'s public balance.
    pub async fn burn_ft(
        &self,
        session: &UserSession,
        input: &CommitmentHash,
        receiver: &str,
    ) -> Result<TxReceipt, TransferError> {
        self.burn(session, AssetClass::Fungible, input, receiver).await
    }

    pub(super) async fn burn(
        &self,
        session: &UserSession,
        class: AssetClass,
        input: &CommitmentHash,
        receiver: &str,
    ) -> Result<TxReceipt, TransferError> {
        let mut inputs = self.load_inputs(session, class, std::slice::from_ref(input))?;
        let input = inputs.remove(0);
        let failed = || {
            CommitmentTransaction::new(TransactionType::Burn, class)
                .inputs(vec![input.snapshot()])
                .sender(session.identity.clone())
        };
        self.vet_parties(session, &[receiver], &failed).await?;

        let result = self.burn_steps(session, class, &input, receiver).await;
        self.settle(session, failed, result)
    }

    async fn burn_steps(
        &self,
        session: &UserSession,
        class: AssetClass,
        input: &Commitment,
        receiver: &str,
    ) -> Result<TxReceipt, TransferError> {
        let address = self
            .call(Step::ResolveAddress, self.directory.resolve_address(receiver))
            .await?;
        let to = self.resolve_receiver(receiver).await?;
        let receiver_identity: Identity = to.identity().with_address(address);
        let sender_secret = self.sender_secret(session)?;

        let ctx = self.standing_context(session, class);
        let request = BurnRequest {
            input: SpendInput::from(input),
            sender_secret,
            receiver_address: address,
        };

        let mut notice = self.prepare_notice(session, &to.name, to.messaging_key)?;
        let receipt = match self
            .ledger_call(Step::LedgerBurn, self.ledger.burn(&ctx, request))
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.abandon_notices(session, vec![notice]);
                return Err(e);
            }
        };

        let token = TokenNotice {
            value: input.value.clone(),
            token_contract: ctx.token_contract,
            shield_contract: ctx.shield_contract,
            block_number: receipt.block_number,
            sender: session.identity.clone(),
            receiver: receiver_identity.clone(),
        };
        let notification = match class {
            AssetClass::Fungible => Notification::FToken(token),
            AssetClass::NonFungible => Notification::NfToken(token),
        };
        self.ready_notice(session, &mut notice, notification)?;

        let mut burned = input.clone();
        burned.is_burned = true;

        let record = CommitmentTransaction::new(TransactionType::Burn, class)
            .inputs(vec![input.snapshot()])
            .sender(session.identity.clone())
            .receiver(receiver_identity.clone())
            .block_number(receipt.block_number);
        let public = PublicTokenTransaction {
            sequence: 0,
            kind: PublicTransferKind::Burned,
            value: input.value.clone(),
            shield_contract: ctx.shield_contract,
            sender: Some(session.identity.clone()),
            receiver: Some(receiver_identity),
            created_at: Utc::now(),
        };

        self.commit(
            session,
            StoreBatch {
                updates: vec![burned],
                transactions: vec![record],
                public_transactions: vec![public],
                ..StoreBatch::default()
            },
            &receipt.tx_hash,
        )?;

        info!(
            tenant = %session.tenant,
            class = class.as_str(),
            commitment = %input.commitment,
            receiver = %to.name,
            tx_hash = %receipt.tx_hash,
            "burned"
        );

        self.deliver(session, notice).await?;
        Ok(receipt)
    }
}
