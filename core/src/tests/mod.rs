mod flows;
mod listener;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use umbra_commitment::{Address, FtValue, MessagingKey, ZkpPublicKey};
use umbra_config::AssetConfig;
use umbra_envelope::SealedEnvelope;

use crate::channel::{LocalChannel, NotificationChannel};
use crate::clients::{
    AssetRegistry, ClientError, DirectoryEntry, KeyDirectory, LocalAccounts, MockLedger,
    StaticKeyDirectory,
};
use crate::error::ListenerError;
use crate::listener::{ListenerOutcome, NotificationListener};
use crate::orchestrator::{Orchestrator, Timeouts, UserSession};
use crate::store::{CommitmentStore, RocksDbStore, UserRecord};

/// Create a temporary DB for each test; the directory lives as long as the guard.
fn temp_db() -> (TempDir, RocksDbStore) {
    let dir = TempDir::new().unwrap();
    let store = RocksDbStore::open(dir.path()).unwrap();
    (dir, store)
}

/// Local broker that can be taken offline.
#[derive(Default)]
struct FlakyChannel {
    inner: LocalChannel,
    down: AtomicBool,
}

impl FlakyChannel {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationChannel for FlakyChannel {
    async fn publish(&self, recipient: &MessagingKey, envelope: SealedEnvelope) -> Result<(), ClientError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ClientError::Transport {
                service: "relay",
                message: "connection refused".into(),
            });
        }
        self.inner.publish(recipient, envelope).await
    }

    async fn subscribe(&self, identity: &MessagingKey) -> Result<mpsc::UnboundedReceiver<SealedEnvelope>, ClientError> {
        self.inner.subscribe(identity).await
    }
}

/// In-memory directory whose registration lookups can be made to fail.
#[derive(Default)]
struct FlakyDirectory {
    inner: StaticKeyDirectory,
    down: AtomicBool,
}

impl FlakyDirectory {
    fn register(&self, name: &str, entry: DirectoryEntry) {
        self.inner.register(name, entry);
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyDirectory for FlakyDirectory {
    async fn resolve_public_key(&self, name: &str) -> Result<ZkpPublicKey, ClientError> {
        self.inner.resolve_public_key(name).await
    }

    async fn resolve_address(&self, name: &str) -> Result<Address, ClientError> {
        self.inner.resolve_address(name).await
    }

    async fn resolve_messaging_key(&self, name: &str) -> Result<MessagingKey, ClientError> {
        self.inner.resolve_messaging_key(name).await
    }

    async fn is_registered(&self, name: &str) -> Result<bool, ClientError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ClientError::Transport {
                service: "directory",
                message: "connection reset".into(),
            });
        }
        self.inner.is_registered(name).await
    }
}

/// Every collaborator in-process, one shared store.
struct Harness {
    _dir: TempDir,
    store: Arc<RocksDbStore>,
    ledger: Arc<MockLedger>,
    directory: Arc<FlakyDirectory>,
    channel: Arc<FlakyChannel>,
    accounts: Arc<LocalAccounts>,
    assets: AssetRegistry,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new() -> Self {
        Self::with_timeouts(Timeouts {
            call: Duration::from_secs(5),
            ledger: Duration::from_secs(5),
        })
    }

    fn with_timeouts(timeouts: Timeouts) -> Self {
        let (dir, store) = temp_db();
        let store = Arc::new(store);
        let ledger = Arc::new(MockLedger::new());
        let directory = Arc::new(FlakyDirectory::default());
        let channel = Arc::new(FlakyChannel::default());
        let accounts = Arc::new(LocalAccounts::new());
        let assets = AssetRegistry::from_config(&AssetConfig::default()).unwrap();

        let orchestrator = Orchestrator::new(
            store.clone(),
            ledger.clone(),
            directory.clone(),
            channel.clone(),
            accounts.clone(),
            assets.clone(),
            timeouts,
        );

        Self {
            _dir: dir,
            store,
            ledger,
            directory,
            channel,
            accounts,
            assets,
            orchestrator,
        }
    }

    /// Store and register a user with fresh keys.
    fn user(&self, name: &str, address_byte: u8) -> (UserSession, UserRecord) {
        let user = UserRecord::generate(name, Address([address_byte; 20]));
        self.store.put_user(&user).unwrap();
        self.directory.register(
            name,
            DirectoryEntry {
                public_key: user.public_key,
                address: user.address,
                messaging_key: user.messaging_key(),
            },
        );
        (UserSession::from_record(&user), user)
    }

    fn listener(&self, user: &UserRecord) -> NotificationListener {
        NotificationListener::new(
            user.name.clone(),
            user.public_key,
            user.messaging_keypair(),
            self.store.clone(),
            self.ledger.clone(),
            self.assets.clone(),
            Duration::from_secs(5),
        )
    }

    /// Dispatch everything currently queued for `user`.
    async fn receive(&self, user: &UserRecord) -> Vec<Result<ListenerOutcome, ListenerError>> {
        let listener = self.listener(user);
        let mut rx = self.channel.subscribe(&user.messaging_key()).await.unwrap();

        let mut outcomes = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            outcomes.push(listener.dispatch(&envelope).await);
        }
        outcomes
    }

    async fn mint(&self, session: &UserSession, value: u128) -> umbra_commitment::Commitment {
        self.orchestrator
            .mint_ft(session, FtValue(value))
            .await
            .unwrap()
    }
}
