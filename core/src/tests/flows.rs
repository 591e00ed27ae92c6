use super::*;
use crate::error::{Step, TransferError, ValidationError};
use crate::orchestrator::{BatchOutput, FlushReport};
use crate::store::{OutboxState, Page};
use umbra_commitment::{
    AssetClass, AssetValue, BATCH_WIDTH, PublicTransferKind, TokenId, TransactionType,
    commitment_hash,
};

fn history(h: &Harness, session: &UserSession) -> Vec<umbra_commitment::CommitmentTransaction> {
    h.orchestrator
        .transactions(session, AssetClass::Fungible, Page::all())
        .unwrap()
}

fn stored(h: &Harness, tenant: &str, hash: &umbra_commitment::CommitmentHash) -> umbra_commitment::Commitment {
    h.store
        .get_commitment(tenant, AssetClass::Fungible, hash)
        .unwrap()
        .unwrap()
}

// ============================================================================
// Mint
// ============================================================================

#[tokio::test]
async fn test_mint_commits_to_opening() {
    let h = Harness::new();
    let (alice, user) = h.user("alice", 0xa1);

    let minted = h.mint(&alice, 2).await;
    let expected = commitment_hash(
        &h.assets.ft.token_contract,
        &AssetValue::ft(2u128),
        &user.public_key,
        &minted.salt,
    );
    assert_eq!(minted.commitment, expected);
    assert!(minted.is_minted);
    assert!(minted.is_spendable());

    let records = history(&h, &alice);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transaction_type, TransactionType::Mint);
    assert_eq!(records[0].output_commitments[0].commitment, Some(expected));
    assert_eq!(h.orchestrator.balance(&alice).unwrap(), FtValue(2));
}

#[tokio::test]
async fn test_zero_mint_rejected() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);

    let err = h.orchestrator.mint_ft(&alice, FtValue::ZERO).await.unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::ZeroValue)));
    assert_eq!(h.ledger.calls("mint"), 0);
}

// ============================================================================
// Transfer
// ============================================================================

#[tokio::test]
async fn test_full_value_transfer_leaves_no_change() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    let (bob, bob_user) = h.user("bob", 0xb0);

    let minted = h.mint(&alice, 2).await;
    let outcome = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(2))
        .await
        .unwrap();

    assert!(outcome.change.is_none());
    assert_eq!(outcome.outputs.len(), 1);
    assert!(stored(&h, "alice", &minted.commitment).is_transferred);
    assert_eq!(h.orchestrator.balance(&alice).unwrap(), FtValue::ZERO);

    // The ledger still sees a zero change output.
    let (op, request) = h.ledger.submitted().pop().unwrap();
    assert_eq!(op, "transfer");
    assert_eq!(request.outputs.len(), 2);
    assert!(request.outputs[1].value.is_zero());

    // Submitted from a fresh, unlocked one-time account.
    let alice_record = h.store.get_user("alice").unwrap().unwrap();
    assert_eq!(alice_record.one_time_accounts.len(), 1);
    assert!(h.accounts.is_unlocked(&alice_record.one_time_accounts[0]));

    let sent = outcome.outputs[0].commitment.unwrap();
    let outcomes = h.receive(&bob_user).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(&outcomes[0], Ok(ListenerOutcome::Accepted(hash)) if *hash == sent));

    let received = stored(&h, "bob", &sent);
    assert!(received.is_received);
    assert_eq!(received.commitment_reconciles, Some(true));
    assert_eq!(received.commitment_exists_onchain, Some(true));
    assert_eq!(h.orchestrator.balance(&bob).unwrap(), FtValue(2));
    assert_eq!(history(&h, &bob)[0].transaction_type, TransactionType::TransferIncoming);
}

#[tokio::test]
async fn test_transfer_returns_change_to_sender() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);

    let minted = h.mint(&alice, 5).await;
    let outcome = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(3))
        .await
        .unwrap();

    let change = outcome.change.unwrap();
    assert!(change.is_change);
    assert_eq!(change.ft_value(), Some(FtValue(2)));
    assert_eq!(h.orchestrator.balance(&alice).unwrap(), FtValue(2));

    let picked = h.orchestrator.select_inputs(&alice, FtValue(2)).unwrap();
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].commitment, change.commitment);

    let record = &history(&h, &alice)[0];
    assert_eq!(record.transaction_type, TransactionType::TransferOutgoing);
    assert_eq!(record.output_commitments.len(), 2);
    assert_eq!(record.output_commitments[1], change.snapshot());
    assert!(!record.is_failed);
}

#[tokio::test]
async fn test_transfer_from_two_inputs() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);

    let a = h.mint(&alice, 3).await;
    let b = h.mint(&alice, 4).await;
    let outcome = h
        .orchestrator
        .transfer_ft(&alice, &[a.commitment, b.commitment], "bob", FtValue(6))
        .await
        .unwrap();

    assert_eq!(outcome.change.unwrap().ft_value(), Some(FtValue(1)));
    assert!(stored(&h, "alice", &a.commitment).is_transferred);
    assert!(stored(&h, "alice", &b.commitment).is_transferred);
}

#[tokio::test]
async fn test_transfer_validation() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);
    let minted = h.mint(&alice, 5).await;

    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(6))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Invalid(ValidationError::Overspend { available: FtValue(5), requested: FtValue(6) })
    ));

    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment, minted.commitment], "bob", FtValue(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::DuplicateInput(_))));

    let err = h
        .orchestrator
        .transfer_ft(&alice, &[], "bob", FtValue(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::InputCount { got: 0, .. })));

    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "carol", FtValue(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::NotRegistered(ref name)) if name == "carol"));

    // Nothing left the process and nothing was recorded beyond the mint.
    assert_eq!(h.ledger.calls("transfer"), 0);
    assert_eq!(history(&h, &alice).len(), 1);
    assert!(h.store.list_outbox("alice", None).unwrap().is_empty());
}

#[tokio::test]
async fn test_spent_commitments_are_never_selected() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);

    let five = h.mint(&alice, 5).await;
    let seven = h.mint(&alice, 7).await;
    h.orchestrator
        .transfer_ft(&alice, &[seven.commitment], "bob", FtValue(7))
        .await
        .unwrap();

    let err = h.orchestrator.select_inputs(&alice, FtValue(6)).unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::InsufficientFunds(_))));
    let picked = h.orchestrator.select_inputs(&alice, FtValue(5)).unwrap();
    assert_eq!(picked[0].commitment, five.commitment);

    let err = h
        .orchestrator
        .transfer_ft(&alice, &[seven.commitment], "bob", FtValue(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::AlreadySpent(hash)) if hash == seven.commitment));
}

#[tokio::test]
async fn test_select_inputs_prefers_single_then_tightest_pair() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    let three = h.mint(&alice, 3).await;
    let four = h.mint(&alice, 4).await;
    let ten = h.mint(&alice, 10).await;

    let picked = h.orchestrator.select_inputs(&alice, FtValue(4)).unwrap();
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].commitment, four.commitment);

    let picked: Vec<_> = h
        .orchestrator
        .select_inputs(&alice, FtValue(12))
        .unwrap()
        .into_iter()
        .map(|c| c.commitment)
        .collect();
    assert_eq!(picked, vec![three.commitment, ten.commitment]);

    assert!(h.orchestrator.select_inputs(&alice, FtValue(15)).is_err());
    assert!(h.orchestrator.select_inputs(&alice, FtValue::ZERO).is_err());
}

#[tokio::test]
async fn test_blacklisted_parties_rejected() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);
    let minted = h.mint(&alice, 5).await;

    h.orchestrator.blacklist("bob").unwrap();
    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::Blacklisted(ref name)) if name == "bob"));
    assert_eq!(h.ledger.calls("transfer"), 0);
    assert!(h.store.get_user("alice").unwrap().unwrap().one_time_accounts.is_empty());

    h.orchestrator.unblacklist("bob").unwrap();
    h.orchestrator.blacklist("alice").unwrap();
    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::Blacklisted(ref name)) if name == "alice"));

    h.orchestrator.unblacklist("alice").unwrap();
    h.orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(1))
        .await
        .unwrap();
}

// ============================================================================
// Failures after validation
// ============================================================================

#[tokio::test]
async fn test_ledger_failure_records_failed_transfer() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    let (_, bob_user) = h.user("bob", 0xb0);
    let minted = h.mint(&alice, 5).await;

    h.ledger.fail_next("transfer", "prover offline");
    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(3))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::External { step: Step::LedgerTransfer, .. }));

    let record = &history(&h, &alice)[0];
    assert!(record.is_failed);
    assert_eq!(record.transaction_type, TransactionType::TransferOutgoing);
    assert_eq!(record.output_commitments.len(), 2);
    assert_eq!(record.output_commitments[0].owner_name.as_deref(), Some("bob"));
    assert_eq!(record.output_commitments[0].commitment, None);
    assert_eq!(record.block_number, None);

    assert!(stored(&h, "alice", &minted.commitment).is_spendable());
    let abandoned = h
        .store
        .list_outbox("alice", Some(OutboxState::Abandoned))
        .unwrap();
    assert_eq!(abandoned.len(), 1);
    assert!(abandoned[0].notification.is_none());
    assert!(h.receive(&bob_user).await.is_empty());
}

#[tokio::test]
async fn test_directory_failure_records_failed_transfer() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);
    let minted = h.mint(&alice, 5).await;

    h.directory.set_down(true);
    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(3))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::External { step: Step::CheckRegistered, .. }));

    let record = &history(&h, &alice)[0];
    assert!(record.is_failed);
    assert_eq!(record.transaction_type, TransactionType::TransferOutgoing);
    assert_eq!(record.input_commitments.len(), 1);
    assert_eq!(h.ledger.calls("transfer"), 0);
    assert!(stored(&h, "alice", &minted.commitment).is_spendable());

    // Unknown names stay a plain rejection once the directory is back.
    h.directory.set_down(false);
    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "carol", FtValue(3))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(history(&h, &alice).len(), 2);
}

#[tokio::test]
async fn test_ledger_timeout_records_failed_mint() {
    let h = Harness::with_timeouts(Timeouts {
        call: Duration::from_secs(5),
        ledger: Duration::from_millis(20),
    });
    let (alice, _) = h.user("alice", 0xa1);
    h.ledger.set_latency(Duration::from_millis(500));

    let err = h.orchestrator.mint_ft(&alice, FtValue(7)).await.unwrap_err();
    assert!(matches!(err, TransferError::Timeout { step: Step::LedgerMint, .. }));

    let records = history(&h, &alice);
    assert_eq!(records.len(), 1);
    assert!(records[0].is_failed);
    assert_eq!(records[0].transaction_type, TransactionType::Mint);
    assert_eq!(records[0].output_commitments[0].value, AssetValue::ft(7u128));
    assert_eq!(records[0].output_commitments[0].commitment, None);
    assert!(
        h.orchestrator
            .commitments(&alice, AssetClass::Fungible, Page::all())
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_undelivered_notice_is_flushed_later() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    let (bob, bob_user) = h.user("bob", 0xb0);
    let minted = h.mint(&alice, 2).await;

    h.channel.set_down(true);
    let err = h
        .orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(2))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::External { step: Step::Publish, .. }));

    // The ledger accepted it, so the spend stands.
    assert!(stored(&h, "alice", &minted.commitment).is_transferred);
    let records = history(&h, &alice);
    assert!(records[0].is_failed);
    assert!(!records[1].is_failed);
    assert_eq!(records[1].transaction_type, TransactionType::TransferOutgoing);

    let ready = h.store.list_outbox("alice", Some(OutboxState::Ready)).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].attempts, 1);
    assert!(ready[0].last_error.is_some());

    // Still down: the entry stays ready.
    let report = h.orchestrator.flush_outbox(&alice).await.unwrap();
    assert_eq!(report, FlushReport { delivered: 0, failed: 1 });

    h.channel.set_down(false);
    let report = h.orchestrator.flush_outbox(&alice).await.unwrap();
    assert_eq!(report, FlushReport { delivered: 1, failed: 0 });
    let delivered = h.store.list_outbox("alice", Some(OutboxState::Delivered)).unwrap();
    assert_eq!(delivered[0].attempts, 3);

    let outcomes = h.receive(&bob_user).await;
    assert!(matches!(outcomes.as_slice(), [Ok(ListenerOutcome::Accepted(_))]));
    assert_eq!(h.orchestrator.balance(&bob).unwrap(), FtValue(2));

    let report = h.orchestrator.flush_outbox(&alice).await.unwrap();
    assert_eq!(report, FlushReport::default());
}

// ============================================================================
// Batch and consolidation
// ============================================================================

#[tokio::test]
async fn test_batch_of_nineteen_keeps_change_in_last_slot() {
    let h = Harness::new();
    let (alice, alice_user) = h.user("alice", 0xa1);
    let (bob, bob_user) = h.user("bob", 0xb0);
    let input = h.mint(&alice, 40).await;

    let outputs: Vec<BatchOutput> = (0..19).map(|_| BatchOutput::new(2u128, "bob")).collect();
    let outcome = h
        .orchestrator
        .batch_transfer_ft(&alice, &input.commitment, &outputs)
        .await
        .unwrap();

    let change = outcome.change.clone().unwrap();
    assert!(change.is_change);
    assert_eq!(change.ft_value(), Some(FtValue(2)));
    assert_eq!(outcome.outputs.len(), 20);

    let (op, request) = h.ledger.submitted().pop().unwrap();
    assert_eq!(op, "batch_transfer");
    assert_eq!(request.outputs.len(), BATCH_WIDTH);
    assert_eq!(request.outputs[19].receiver_public_key, alice_user.public_key);
    assert!(request.outputs[..19].iter().all(|o| o.receiver_public_key == bob_user.public_key));
    assert!(request.outputs.iter().all(|o| o.value == AssetValue::ft(2u128)));

    let alice_record = h.store.get_user("alice").unwrap().unwrap();
    assert_eq!(alice_record.one_time_accounts.len(), 1);
    assert!(h.accounts.is_unlocked(&alice_record.one_time_accounts[0]));

    assert!(stored(&h, "alice", &input.commitment).is_batch_transferred);
    assert_eq!(h.orchestrator.balance(&alice).unwrap(), FtValue(2));

    let record = &history(&h, &alice)[0];
    assert_eq!(record.transaction_type, TransactionType::Batch);
    assert_eq!(record.output_commitments.len(), 20);
    assert!(!record.is_failed);

    let outcomes = h.receive(&bob_user).await;
    assert_eq!(outcomes.len(), 19);
    assert!(outcomes.iter().all(|o| matches!(o, Ok(ListenerOutcome::Accepted(_)))));
    assert_eq!(h.orchestrator.balance(&bob).unwrap(), FtValue(38));
}

#[tokio::test]
async fn test_batch_without_remainder_pads_with_zero() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);
    h.user("carol", 0xc0);
    let input = h.mint(&alice, 5).await;

    let outputs = [BatchOutput::new(2u128, "bob"), BatchOutput::new(3u128, "carol")];
    let outcome = h
        .orchestrator
        .batch_transfer_ft(&alice, &input.commitment, &outputs)
        .await
        .unwrap();

    assert!(outcome.change.is_none());
    assert_eq!(outcome.outputs.len(), 2);
    let (_, request) = h.ledger.submitted().pop().unwrap();
    assert_eq!(request.outputs.len(), BATCH_WIDTH);
    assert!(request.outputs[2..].iter().all(|o| o.value.is_zero()));

    // Only real receivers get an outbox entry.
    assert_eq!(h.store.list_outbox("alice", None).unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_overspend_records_requested_outputs() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);
    let input = h.mint(&alice, 5).await;

    let outputs = [BatchOutput::new(3u128, "bob"), BatchOutput::new(3u128, "bob")];
    let err = h
        .orchestrator
        .batch_transfer_ft(&alice, &input.commitment, &outputs)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Invalid(ValidationError::Overspend { available: FtValue(5), requested: FtValue(6) })
    ));
    assert_eq!(h.ledger.calls("batch_transfer"), 0);

    let record = &history(&h, &alice)[0];
    assert!(record.is_failed);
    assert_eq!(record.transaction_type, TransactionType::Batch);
    assert_eq!(record.output_commitments.len(), 2);
    assert!(record.output_commitments.iter().all(|o| o.owner_name.as_deref() == Some("bob")));
    assert!(record.output_commitments.iter().all(|o| o.commitment.is_none()));
    assert!(stored(&h, "alice", &input.commitment).is_spendable());
}

#[tokio::test]
async fn test_batch_shape_checks() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    h.user("bob", 0xb0);
    let input = h.mint(&alice, 100).await;

    let too_many: Vec<BatchOutput> = (0..21).map(|_| BatchOutput::new(1u128, "bob")).collect();
    let err = h
        .orchestrator
        .batch_transfer_ft(&alice, &input.commitment, &too_many)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::TooManyOutputs(21))));

    let full: Vec<BatchOutput> = (0..20).map(|_| BatchOutput::new(1u128, "bob")).collect();
    let err = h
        .orchestrator
        .batch_transfer_ft(&alice, &input.commitment, &full)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::NoChangeSlot(FtValue(80)))));

    let err = h
        .orchestrator
        .batch_transfer_ft(&alice, &input.commitment, &[BatchOutput::new(0u128, "bob")])
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::ZeroValue)));

    assert_eq!(h.ledger.calls("batch_transfer"), 0);
}

#[tokio::test]
async fn test_consolidation() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    let (bob, bob_user) = h.user("bob", 0xb0);

    let mut inputs = Vec::new();
    for _ in 0..BATCH_WIDTH {
        inputs.push(h.mint(&alice, 1).await.commitment);
    }

    let err = h
        .orchestrator
        .consolidate_ft(&alice, &inputs, "bob", FtValue(21))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Invalid(ValidationError::ConsolidationMismatch { inputs: FtValue(20), output: FtValue(21) })
    ));

    let err = h
        .orchestrator
        .consolidate_ft(&alice, &inputs[..19], "bob", FtValue(19))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Invalid(ValidationError::InputCount { got: 19, .. })));
    assert_eq!(h.ledger.calls("consolidate"), 0);
    assert!(history(&h, &alice).iter().all(|r| !r.is_failed));

    let outcome = h
        .orchestrator
        .consolidate_ft(&alice, &inputs, "bob", FtValue(20))
        .await
        .unwrap();
    assert!(outcome.change.is_none());
    assert!(
        inputs
            .iter()
            .all(|hash| stored(&h, "alice", hash).is_consolidate_transferred)
    );
    assert_eq!(h.orchestrator.balance(&alice).unwrap(), FtValue::ZERO);
    assert_eq!(history(&h, &alice)[0].transaction_type, TransactionType::Consolidate);

    let outcomes = h.receive(&bob_user).await;
    assert!(matches!(outcomes.as_slice(), [Ok(ListenerOutcome::Accepted(_))]));
    assert_eq!(h.orchestrator.balance(&bob).unwrap(), FtValue(20));
}

// ============================================================================
// Burn and NFTs
// ============================================================================

#[tokio::test]
async fn test_burn_releases_to_public_balance() {
    let h = Harness::new();
    let (alice, _) = h.user("alice", 0xa1);
    let (bob, bob_user) = h.user("bob", 0xb0);
    let minted = h.mint(&alice, 4).await;

    h.orchestrator
        .burn_ft(&alice, &minted.commitment, "bob")
        .await
        .unwrap();

    assert!(stored(&h, "alice", &minted.commitment).is_burned);
    assert_eq!(history(&h, &alice)[0].transaction_type, TransactionType::Burn);
    let public = h
        .store
        .list_public_transactions("alice", AssetClass::Fungible, Page::all())
        .unwrap();
    assert_eq!(public[0].kind, PublicTransferKind::Burned);

    let outcomes = h.receive(&bob_user).await;
    assert!(matches!(outcomes.as_slice(), [Ok(ListenerOutcome::TokenRecorded)]));
    let received = h
        .store
        .list_public_transactions(&bob.tenant, AssetClass::Fungible, Page::all())
        .unwrap();
    assert_eq!(received[0].kind, PublicTransferKind::Received);
    assert_eq!(received[0].value, AssetValue::ft(4u128));
    assert_eq!(
        received[0].receiver.as_ref().and_then(|r| r.address),
        Some(Address([0xb0; 20]))
    );
}

#[tokio::test]
async fn test_nft_mint_transfer_burn() {
    let h = Harness::new();
    let (alice, alice_user) = h.user("alice", 0xa1);
    let (bob, bob_user) = h.user("bob", 0xb0);

    let token = h
        .orchestrator
        .mint_nft(&alice, TokenId([7; 32]), "ipfs://cat")
        .await
        .unwrap();
    assert_eq!(token.asset_class(), AssetClass::NonFungible);

    let outcome = h
        .orchestrator
        .transfer_nft(&alice, &token.commitment, "bob")
        .await
        .unwrap();
    let sent = outcome.outputs[0].commitment.unwrap();
    assert!(
        h.store
            .get_commitment("alice", AssetClass::NonFungible, &token.commitment)
            .unwrap()
            .unwrap()
            .is_transferred
    );

    let outcomes = h.receive(&bob_user).await;
    assert!(matches!(&outcomes[..], [Ok(ListenerOutcome::Accepted(hash))] if *hash == sent));
    let held = h
        .orchestrator
        .commitments(&bob, AssetClass::NonFungible, Page::all())
        .unwrap();
    assert_eq!(held[0].value, AssetValue::nft(TokenId([7; 32]), "ipfs://cat"));

    h.orchestrator.burn_nft(&bob, &sent, "alice").await.unwrap();
    assert!(
        h.store
            .get_commitment("bob", AssetClass::NonFungible, &sent)
            .unwrap()
            .unwrap()
            .is_burned
    );

    let outcomes = h.receive(&alice_user).await;
    assert!(matches!(outcomes.as_slice(), [Ok(ListenerOutcome::TokenRecorded)]));
    let public = h
        .store
        .list_public_transactions("alice", AssetClass::NonFungible, Page::all())
        .unwrap();
    assert_eq!(public[0].kind, PublicTransferKind::Received);
}
