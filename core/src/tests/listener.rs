use super::*;
use crate::channel::{CommitmentNotice, Notification};
use crate::store::{OutboxState, Page};
use tokio_util::sync::CancellationToken;
use umbra_commitment::{Address, AssetClass, Identity, Salt};

/// Transfer 2 from alice to bob and return bob with the opening that was sent.
async fn sent_to_bob(h: &Harness) -> (UserRecord, Notification) {
    let (alice, _) = h.user("alice", 0xa1);
    let (_, bob) = h.user("bob", 0xb0);
    let minted = h.mint(&alice, 2).await;
    h.orchestrator
        .transfer_ft(&alice, &[minted.commitment], "bob", FtValue(2))
        .await
        .unwrap();

    let entry = h
        .store
        .list_outbox("alice", Some(OutboxState::Delivered))
        .unwrap()
        .remove(0);
    (bob, entry.notification.unwrap())
}

fn seal_for(user: &UserRecord, notification: &Notification) -> SealedEnvelope {
    umbra_envelope::seal(notification, &user.messaging_key().0).unwrap()
}

fn held(h: &Harness, tenant: &str) -> usize {
    h.store
        .list_commitments(tenant, AssetClass::Fungible, Page::all())
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_redelivered_opening_is_already_known() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    let listener = h.listener(&bob);

    let first = listener.dispatch(&seal_for(&bob, &notification)).await.unwrap();
    let second = listener.dispatch(&seal_for(&bob, &notification)).await.unwrap();

    let ListenerOutcome::Accepted(hash) = first else {
        panic!("first delivery was not accepted");
    };
    assert_eq!(second, ListenerOutcome::AlreadyKnown(hash));
    assert_eq!(held(&h, "bob"), 1);
    assert_eq!(
        h.store
            .list_transactions("bob", AssetClass::Fungible, Page::all())
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_tampered_salt_fails_reconciliation() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    let Notification::FtCommitment(mut notice) = notification else {
        panic!("expected a fungible commitment notice");
    };
    notice.salt = Salt::random();

    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&bob, &Notification::FtCommitment(notice)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::CorrectnessFailed { z_correct: false, z_onchain_correct: true, .. }
    ));
    assert_eq!(held(&h, "bob"), 0);
}

#[tokio::test]
async fn test_wrong_index_fails_onchain_check() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    let Notification::FtCommitment(mut notice) = notification else {
        panic!("expected a fungible commitment notice");
    };
    notice.commitment_index += 100;

    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&bob, &Notification::FtCommitment(notice)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::CorrectnessFailed { z_correct: true, z_onchain_correct: false, .. }
    ));
    assert_eq!(held(&h, "bob"), 0);
}

#[tokio::test]
async fn test_opening_of_senders_own_commitment_is_refused() {
    let h = Harness::new();
    let (alice, alice_user) = h.user("alice", 0xa1);
    let (_, bob) = h.user("bob", 0xb0);
    let minted = h.mint(&alice, 50).await;

    // A genuine opening that still commits to alice's key, addressed to bob.
    let notice = CommitmentNotice {
        value: minted.value.clone(),
        salt: minted.salt,
        public_key: alice_user.public_key,
        commitment: minted.commitment,
        commitment_index: minted.commitment_index,
        block_number: u64::MAX,
        token_contract: h.assets.ft.token_contract,
        shield_contract: h.assets.ft.shield_contract,
        sender: alice.identity.clone(),
        receiver: Identity::new("bob", bob.public_key),
    };
    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&bob, &Notification::FtCommitment(notice.clone())))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::WrongOwner { commitment, owner }
            if commitment == minted.commitment && owner == alice_user.public_key
    ));

    // Claiming bob as the receiver identity does not help either.
    let relabelled = CommitmentNotice {
        receiver: Identity::new("bob", alice_user.public_key),
        ..notice
    };
    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&bob, &Notification::FtCommitment(relabelled)))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenerError::WrongOwner { .. }));

    assert_eq!(held(&h, "bob"), 0);
    assert_eq!(h.ledger.calls("check_correctness"), 0);
    assert_eq!(h.orchestrator.balance(&alice).unwrap(), FtValue(50));
}

#[tokio::test]
async fn test_foreign_token_contract_is_refused() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    let Notification::FtCommitment(mut notice) = notification else {
        panic!("expected a fungible commitment notice");
    };
    notice.token_contract = Address([0xee; 20]);

    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&bob, &Notification::FtCommitment(notice)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::WrongContract { claimed, expected }
            if claimed == Address([0xee; 20]) && expected == h.assets.ft.token_contract
    ));
    assert_eq!(held(&h, "bob"), 0);
}

#[tokio::test]
async fn test_envelope_for_someone_else_is_rejected() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    let alice = h.store.get_user("alice").unwrap().unwrap();

    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&alice, &notification))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenerError::Envelope(_)));
    assert_eq!(held(&h, "bob"), 0);
}

#[tokio::test]
async fn test_ledger_failure_during_check_stores_nothing() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    h.ledger.fail_next("check_correctness", "node unreachable");

    let err = h
        .listener(&bob)
        .dispatch(&seal_for(&bob, &notification))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenerError::External { .. }));
    assert_eq!(held(&h, "bob"), 0);

    // The same opening is accepted once the ledger answers.
    let outcome = h.listener(&bob).dispatch(&seal_for(&bob, &notification)).await.unwrap();
    assert!(matches!(outcome, ListenerOutcome::Accepted(_)));
}

#[tokio::test]
async fn test_run_drains_until_channel_closes() {
    let h = Harness::new();
    let (bob, notification) = sent_to_bob(&h).await;
    let listener = h.listener(&bob);

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(seal_for(&h.store.get_user("alice").unwrap().unwrap(), &notification))
        .unwrap();
    tx.send(seal_for(&bob, &notification)).unwrap();
    drop(tx);

    // The undecryptable envelope is skipped, the loop keeps going.
    listener.run(rx, CancellationToken::new()).await;
    assert_eq!(held(&h, "bob"), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = Harness::new();
    let (_, bob) = h.user("bob", 0xb0);
    let listener = h.listener(&bob);

    let (_tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { listener.run(rx, shutdown).await }
    });

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
