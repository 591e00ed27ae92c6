//! Umbra daemon
//!
//! Runs the notification listener for the configured user against the
//! configured store, ledger and channel.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      umbra-core                          │
//! │                                                          │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────┐  │
//! │  │   Channel   │──▶│   Listener   │──▶│    RocksDB    │  │
//! │  │ local/relay │   │ check + save │   │ (per tenant)  │  │
//! │  └─────────────┘   └──────┬───────┘   └───────────────┘  │
//! │                           │                              │
//! │                    ┌──────▼───────┐                      │
//! │                    │    Ledger    │                      │
//! │                    │  mock / http │                      │
//! │                    └──────────────┘                      │
//! └──────────────────────────────────────────────────────────┘
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use umbra_commitment::Address;
use umbra_config::{ChannelMode, ServiceMode, UmbraConfig};
use umbra_core::channel::{HttpRelayChannel, LocalChannel, NotificationChannel};
use umbra_core::clients::{
    AccountProvisioning, AssetRegistry, DirectoryEntry, HttpAccounts, HttpKeyDirectory,
    HttpLedgerClient, KeyDirectory, LedgerClient, LocalAccounts, MockLedger, StaticKeyDirectory,
};
use umbra_core::store::{CommitmentStore, RocksDbStore, UserRecord};
use umbra_core::{NotificationListener, Orchestrator, Timeouts, UserSession};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "umbra_core=info,umbra_config=info".into()),
        )
        .init();

    if std::env::args().nth(1).as_deref() == Some("sample-config") {
        print!("{}", UmbraConfig::generate_sample());
        return Ok(());
    }

    let config = UmbraConfig::load()?;
    let timeouts = Timeouts::from_config(&config);

    info!("============================================");
    info!("          UMBRA DAEMON v{}", env!("CARGO_PKG_VERSION"));
    info!("============================================");
    info!("User          : {}", config.user.name);
    info!("DB path       : {}", config.database.path);
    info!("Ledger        : {:?} ({})", config.ledger.mode, config.ledger.url);
    info!("Directory     : {:?} ({})", config.directory.mode, config.directory.url);
    info!("Accounts      : {:?} ({})", config.accounts.mode, config.accounts.url);
    info!("Channel       : {:?} ({})", config.channel.mode, config.channel.relay_url);
    info!("============================================");

    let store = Arc::new(RocksDbStore::open(&config.database.path).context("failed to open RocksDB")?);
    let assets = AssetRegistry::from_config(&config.asset)?;

    let ledger: Arc<dyn LedgerClient> = match config.ledger.mode {
        ServiceMode::Mock => {
            warn!("Using MockLedger: commitments are not proven or settled");
            Arc::new(MockLedger::new())
        }
        ServiceMode::Http => Arc::new(HttpLedgerClient::new(&config.ledger.url, config.ledger_timeout())?),
    };

    let accounts: Arc<dyn AccountProvisioning> = match config.accounts.mode {
        ServiceMode::Mock => Arc::new(LocalAccounts::new()),
        ServiceMode::Http => Arc::new(HttpAccounts::new(&config.accounts.url, config.call_timeout())?),
    };

    let relay = match config.channel.mode {
        ChannelMode::Local => None,
        ChannelMode::Relay => Some(Arc::new(HttpRelayChannel::new(
            &config.channel.relay_url,
            config.call_timeout(),
            Duration::from_millis(config.channel.poll_interval_ms),
        )?)),
    };
    let channel: Arc<dyn NotificationChannel> = match &relay {
        Some(relay) => relay.clone(),
        None => Arc::new(LocalChannel::new()),
    };

    let user = load_or_create_user(store.as_ref(), &config.user.name)?;

    let directory: Arc<dyn KeyDirectory> = match config.directory.mode {
        ServiceMode::Mock => {
            let directory = StaticKeyDirectory::new();
            directory.register(
                user.name.clone(),
                DirectoryEntry {
                    public_key: user.public_key,
                    address: user.address,
                    messaging_key: user.messaging_key(),
                },
            );
            Arc::new(directory)
        }
        ServiceMode::Http => Arc::new(HttpKeyDirectory::new(&config.directory.url, config.call_timeout())?),
    };

    let orchestrator = Orchestrator::new(
        store.clone(),
        ledger.clone(),
        directory,
        channel.clone(),
        accounts,
        assets.clone(),
        timeouts,
    );
    let session = UserSession::from_record(&user);
    info!(
        "Spendable balance for {}: {}",
        session.tenant,
        orchestrator.balance(&session)?
    );

    let listener = NotificationListener::new(
        user.name.clone(),
        user.public_key,
        user.messaging_keypair(),
        store,
        ledger,
        assets,
        timeouts.ledger,
    );
    let rx = channel
        .subscribe(&user.messaging_key())
        .await
        .context("failed to subscribe to notification channel")?;

    let shutdown = CancellationToken::new();
    let listener_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.run(rx, shutdown).await })
    };

    info!("Listening for notifications to {}", user.messaging_key());

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    if let Some(relay) = relay {
        relay.shutdown();
    }
    if let Err(e) = listener_handle.await {
        warn!("listener task ended abnormally: {}", e);
    }

    info!("Umbra daemon stopped");
    Ok(())
}

/// Key material for `name`, generated on first start.
fn load_or_create_user(store: &dyn CommitmentStore, name: &str) -> Result<UserRecord> {
    if let Some(user) = store.get_user(name)? {
        return Ok(user);
    }

    let seed = blake3::hash(name.as_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&seed.as_bytes()[..20]);

    let user = UserRecord::generate(name, Address(address));
    store.put_user(&user)?;
    info!("Generated keys for {} (public key {})", user.name, user.public_key);
    Ok(user)
}
