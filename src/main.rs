// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use fogwar_enclave::api::router;
use fogwar_enclave::backup::{RecoveryCoordinator, TileCipher};
use fogwar_enclave::blockchain::{
    EnclaveSigner, LedgerClient, LedgerError, LedgerReader, LedgerWatcher,
};
use fogwar_enclave::config::{
    ConfigError, EnclaveConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV,
};
use fogwar_enclave::enclave::{Enclave, EnclaveState};
use fogwar_enclave::game::{Board, FogOfWar};
use fogwar_enclave::state::AppState;
use fogwar_enclave::storage::{
    key_fingerprint, AuditEvent, AuditEventType, AuditRepository, EncryptedStorage, KeyStore,
    KeyStoreError, StorageError, StoragePaths, BACKUP_KEY_LEN,
};

/// Grace period for open connections on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("sealed storage: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Keys(#[from] KeyStoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Enclave failed to start");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<(), StartupError> {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = EnclaveConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        contract = %config.ledger.contract,
        recovery_mode = config.recovery_mode,
        board_size = config.board_size,
        "Starting fogwar enclave"
    );

    let mut storage = EncryptedStorage::new(StoragePaths::new(&config.data_dir));
    storage.initialize()?;

    let backup_key = backup_key(&storage, config.recovery_mode)?;
    let signer = {
        let pem = KeyStore::new(&storage).load_or_create_enclave_key()?;
        EnclaveSigner::from_pem(pem.as_bytes())?
    };
    tracing::info!(signer = %signer.address(), "Enclave signing key ready");

    let client = Arc::new(LedgerClient::new(config.ledger.clone())?);
    let head = client.block_number().await?;

    let recovery = if config.recovery_mode {
        let history = client.tile_commit_history(head).await?;
        tracing::info!(
            head,
            commitments = history.len(),
            "Loaded tile commitment history for recovery"
        );
        Some(RecoveryCoordinator::new(history))
    } else {
        None
    };

    let state = EnclaveState::new(
        Board::seeded(config.board_size, config.terrain_seed),
        FogOfWar::new(config.fog_radius),
        recovery,
        head,
    );
    let ledger: Arc<dyn LedgerReader> = client.clone();
    let enclave = Enclave::new(
        state,
        config.settings,
        TileCipher::new(&backup_key),
        signer,
        ledger,
    )
    .with_audit(storage.clone());

    let handle = enclave.handle();
    let status = enclave.subscribe_status();
    let shutdown = CancellationToken::new();

    let core = tokio::spawn(enclave.run(shutdown.clone()));
    let watcher = LedgerWatcher::new(client, handle.clone(), head + 1, config.poll_interval);
    let watcher = tokio::spawn(watcher.run(shutdown.clone()));

    let app = router(AppState::new(handle, status, Arc::new(storage)));

    let server_handle = axum_server::Handle::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        let server_handle = server_handle.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
            server_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let addr = config.bind_addr;
    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            tracing::info!("Fogwar enclave listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(server_handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::warn!("TLS not configured, serving plain HTTP");
            tracing::info!("Fogwar enclave listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr)
                .handle(server_handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    shutdown.cancel();
    let _ = tokio::join!(core, watcher);
    tracing::info!("Fogwar enclave stopped");
    Ok(())
}

/// Load the backup key in recovery mode, otherwise replace it with a fresh one.
///
/// Without the previous key, backups held by the DA node cannot be read, so a
/// missing key in recovery mode is fatal.
fn backup_key(
    storage: &EncryptedStorage,
    recovery_mode: bool,
) -> Result<[u8; BACKUP_KEY_LEN], StartupError> {
    let keys = KeyStore::new(storage);
    let audit = AuditRepository::new(storage);

    let (key, event) = if recovery_mode {
        (keys.load_backup_key()?, AuditEventType::BackupKeyLoaded)
    } else {
        let key = TileCipher::generate_key();
        keys.store_backup_key(&key)?;
        (key, AuditEventType::BackupKeyGenerated)
    };

    let fingerprint = key_fingerprint(&key);
    tracing::info!(fingerprint = %fingerprint, recovery_mode, "Backup key ready");
    if let Err(e) = audit.log(
        &AuditEvent::new(event).with_details(serde_json::json!({ "fingerprint": fingerprint })),
    ) {
        tracing::warn!(error = %e, "Failed to write audit event");
    }
    Ok(key)
}
