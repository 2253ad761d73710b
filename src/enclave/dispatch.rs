// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The enclave task and its message handlers.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::reconciler;
use super::{
    EnclaveHandle, EnclaveSettings, EnclaveState, EnclaveStatus, Inbound, MoveKey, SpawnContext,
    SpawnRequest,
};
use crate::backup::TileCipher;
use crate::blockchain::signing::recover_signer;
use crate::blockchain::{EnclaveSigner, LedgerError, LedgerEvent, LedgerReader};
use crate::error::{EnclaveError, EnclaveResult};
use crate::game::{spawn_challenge, spawn_location};
use crate::models::{BackupEnvelope, Location, Player, PlayerAddress, Terrain, Tile};
use crate::protocol::{ClientMessage, ConnId, ServerMessage};
use crate::storage::{AuditEvent, AuditEventType, AuditRepository, EncryptedStorage};

/// Single owner of [`EnclaveState`].
pub struct Enclave {
    state: EnclaveState,
    settings: EnclaveSettings,
    cipher: TileCipher,
    signer: EnclaveSigner,
    ledger: Arc<dyn LedgerReader>,
    audit: Option<EncryptedStorage>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    handle: EnclaveHandle,
    status: watch::Sender<EnclaveStatus>,
}

impl Enclave {
    pub fn new(
        state: EnclaveState,
        settings: EnclaveSettings,
        cipher: TileCipher,
        signer: EnclaveSigner,
        ledger: Arc<dyn LedgerReader>,
    ) -> Self {
        let (handle, inbox) = EnclaveHandle::channel();
        let (status, _) = watch::channel(state.status());

        Self {
            state,
            settings,
            cipher,
            signer,
            ledger,
            audit: None,
            inbox,
            handle,
            status,
        }
    }

    /// Record security events in the sealed audit log.
    pub fn with_audit(mut self, storage: EncryptedStorage) -> Self {
        self.audit = Some(storage);
        self
    }

    pub fn handle(&self) -> EnclaveHandle {
        self.handle.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EnclaveStatus> {
        self.status.subscribe()
    }

    /// Process the inbox until shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            signer = %self.signer.address(),
            recovery_mode = self.state.is_recovering(),
            height = self.state.height,
            "Enclave core started"
        );

        loop {
            tokio::select! {
                received = self.step() => {
                    if !received {
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Enclave core stopped");
    }

    /// Wait for the next input and handle it. Returns `false` when the inbox
    /// is closed.
    pub async fn step(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(inbound) => {
                self.dispatch(inbound);
                true
            }
            None => false,
        }
    }

    /// Handle one input to completion.
    pub fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Connected { conn, outbound } => self.connected(conn, outbound),
            Inbound::Message { conn, message } => {
                if !self.state.sessions.is_connected(conn) {
                    tracing::debug!(conn = %conn, "Dropping message from closed connection");
                } else if let Err(e) = self.handle_message(conn, message) {
                    self.reject(conn, e);
                }
            }
            Inbound::Malformed { conn, error } => {
                if self.state.sessions.is_connected(conn) {
                    self.reject(conn, EnclaveError::Protocol(error));
                }
            }
            Inbound::Disconnected { conn } => self.drop_connection(conn),
            Inbound::Ledger(event) => self.handle_ledger(event),
            Inbound::SpawnContext {
                conn,
                request,
                context,
            } => {
                if let Err(e) = self.complete_spawn(conn, request, context) {
                    self.reject(conn, e);
                }
            }
        }

        self.state.drain_backups();
        self.status.send_replace(self.state.status());
    }

    // =========================================================================
    // Connections
    // =========================================================================

    fn connected(&mut self, conn: ConnId, outbound: super::Outbound) {
        self.state.sessions.connect(conn, outbound);
        if let Some(nonce) = self.state.sessions.bind_challenge(conn) {
            self.state
                .sessions
                .send(conn, ServerMessage::Challenge { nonce });
        }
        tracing::debug!(conn = %conn, "Connection opened");
    }

    /// Report `err` to `conn`, closing the connection when the error is fatal.
    fn reject(&mut self, conn: ConnId, err: EnclaveError) {
        if matches!(
            err,
            EnclaveError::ClaimConflict(_) | EnclaveError::RateLimited { .. }
        ) {
            let mut event = AuditEvent::new(AuditEventType::ClaimRejected)
                .with_connection(conn)
                .failed(err.to_string());
            if let Some(player) = self.state.sessions.resolve(conn) {
                event = event.with_player(player);
            }
            self.audit(event);
        }

        if err.terminates_connection() {
            tracing::warn!(conn = %conn, code = err.error_code(), error = %err, "Terminating connection");
            self.state.sessions.send(
                conn,
                ServerMessage::Disconnect {
                    reason: err.to_string(),
                },
            );
            self.drop_connection(conn);
        } else {
            tracing::info!(conn = %conn, code = err.error_code(), error = %err, "Request rejected");
            self.state.sessions.send(conn, ServerMessage::error(&err));
        }
    }

    /// Forget `conn`, releasing its address and the DA slot. Idempotent.
    fn drop_connection(&mut self, conn: ConnId) {
        let released = self.state.sessions.disconnect(conn);
        if self.state.backups.detach(conn) {
            tracing::warn!(
                conn = %conn,
                queued = self.state.backups.depth(),
                "DA node detached, backups paused"
            );
            self.audit(AuditEvent::new(AuditEventType::DaDetached).with_connection(conn));
        }
        if let Some(address) = released {
            tracing::debug!(conn = %conn, player = %address, "Session released");
        }
    }

    fn handle_message(&mut self, conn: ConnId, message: ClientMessage) -> EnclaveResult<()> {
        let from_da = self.state.backups.is_attached(conn);
        if message.is_da_message() != from_da && message != ClientMessage::HandshakeDa {
            return Err(EnclaveError::ProtocolViolation(if from_da {
                format!("DA node may not send {}", message.event_name())
            } else {
                format!("{} is reserved for the DA node", message.event_name())
            }));
        }

        match message {
            ClientMessage::Login { address, signature } => self.login(conn, address, &signature),
            ClientMessage::GetSpawnSignature {
                symbol,
                address,
                signature,
                secret,
            } => self.request_spawn(
                conn,
                SpawnRequest {
                    symbol,
                    address,
                    secret,
                },
                &signature,
            ),
            ClientMessage::GetMoveSignature { from_tile, to_tile } => {
                self.endorse_move(conn, from_tile, to_tile)
            }
            ClientMessage::Decrypt { location } => self.decrypt(conn, location),
            ClientMessage::HandshakeDa => self.handshake_da(conn),
            ClientMessage::SendRecoveredTileResponse { envelope } => {
                self.recovered_tile(conn, envelope)
            }
            ClientMessage::SaveToDatabaseResponse => self.backup_saved(conn),
            ClientMessage::RecoveryFinished => self.finish_recovery(conn),
        }
    }

    fn require_live(&self) -> EnclaveResult<()> {
        if self.state.is_recovering() {
            return Err(EnclaveError::Recovering);
        }
        Ok(())
    }

    fn require_player(&self, conn: ConnId) -> EnclaveResult<PlayerAddress> {
        self.state
            .sessions
            .resolve(conn)
            .ok_or_else(|| EnclaveError::Auth("connection is not logged in".to_string()))
    }

    // =========================================================================
    // Player requests
    // =========================================================================

    fn login(&mut self, conn: ConnId, address: PlayerAddress, signature: &str) -> EnclaveResult<()> {
        self.require_live()?;

        if let Err(e) = self.state.sessions.complete_login(conn, address, signature) {
            self.audit(
                AuditEvent::new(AuditEventType::LoginRejected)
                    .with_player(address)
                    .with_connection(conn)
                    .failed(e.to_string()),
            );
            return Err(e);
        }

        let locations = self
            .state
            .fog
            .visible_locations(&self.state.board, &address)
            .into_iter()
            .collect();
        self.state
            .sessions
            .send(conn, ServerMessage::LoginResponse { locations });

        tracing::info!(conn = %conn, player = %address, "Player logged in");
        self.audit(
            AuditEvent::new(AuditEventType::LoginAccepted)
                .with_player(address)
                .with_connection(conn),
        );
        Ok(())
    }

    /// First half of a spawn: validate, then read the ledger off the core task.
    fn request_spawn(
        &mut self,
        conn: ConnId,
        request: SpawnRequest,
        signature: &str,
    ) -> EnclaveResult<()> {
        self.require_live()?;
        let player = self.require_player(conn)?;
        if player != request.address {
            return Err(EnclaveError::Auth(format!(
                "spawn for {} requested by {player}",
                request.address
            )));
        }

        let signer = recover_signer(conn.to_string().as_bytes(), signature).map_err(EnclaveError::Auth)?;
        if signer != player.as_address() {
            return Err(EnclaveError::Auth(format!(
                "spawn request signed by {signer}, not {player}"
            )));
        }

        self.check_can_spawn(&player)?;

        let ledger = Arc::clone(&self.ledger);
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let context = fetch_spawn_context(ledger.as_ref(), request.address).await;
            handle.send(Inbound::SpawnContext {
                conn,
                request,
                context,
            });
        });
        Ok(())
    }

    fn check_can_spawn(&self, player: &PlayerAddress) -> EnclaveResult<()> {
        if self.state.board.is_spawned(player) {
            return Err(EnclaveError::ClaimConflict(format!("{player} is already spawned")));
        }
        if self.state.claims.has_pending_spawn(player) {
            return Err(EnclaveError::ClaimConflict(format!(
                "{player} already has a pending spawn"
            )));
        }
        Ok(())
    }

    /// Second half of a spawn, once the ledger reads are back.
    ///
    /// Other inputs may have been handled in between, so everything checked
    /// before the reads is checked again.
    fn complete_spawn(
        &mut self,
        conn: ConnId,
        request: SpawnRequest,
        context: Result<SpawnContext, LedgerError>,
    ) -> EnclaveResult<()> {
        let player = request.address;
        if self.state.sessions.resolve(conn) != Some(player) {
            tracing::debug!(conn = %conn, player = %player, "Spawn context for a closed session");
            return Ok(());
        }
        self.require_live()?;

        let context = match context {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(player = %player, error = %e, "Spawn context unavailable");
                self.state.sessions.send(conn, ServerMessage::TrySpawnAgain);
                return Ok(());
            }
        };

        if spawn_challenge(request.secret) != context.challenge_hash {
            return Err(EnclaveError::Auth(format!(
                "spawn secret of {player} does not match the committed challenge"
            )));
        }
        self.check_can_spawn(&player)?;

        let location = spawn_location(request.secret, context.block_hash, self.state.board.size());
        let previous = self
            .state
            .board
            .tile(location)
            .cloned()
            .ok_or_else(|| EnclaveError::Protocol(format!("spawn location {location} is off the board")))?;

        if !previous.is_spawnable() || self.state.claims.spawn_targets(location) {
            tracing::info!(player = %player, location = %location, "Spawn location unavailable");
            self.state.sessions.send(conn, ServerMessage::TrySpawnAgain);
            return Ok(());
        }

        let city_id = self
            .state
            .board
            .max_city_id()
            .max(self.state.claims.max_reserved_city_id())
            + 1;
        let proposed = Tile {
            location,
            owner: Some(Player {
                symbol: request.symbol,
                address: player,
            }),
            resources: self.settings.spawn_resources,
            city_id,
            terrain: Terrain::Capital,
        };

        let signature = self
            .signer
            .sign_spawn(player, previous.hash(), proposed.hash())?;
        self.state
            .claims
            .propose_spawn(player, previous.clone(), proposed.clone())?;

        self.state.sessions.send(
            conn,
            ServerMessage::SpawnSignatureResponse {
                signature,
                previous_tile: previous,
                proposed_tile: proposed,
            },
        );

        tracing::info!(
            player = %player,
            location = %location,
            commitment_height = context.commitment_height,
            "Spawn endorsed"
        );
        self.audit(
            AuditEvent::new(AuditEventType::SpawnEndorsed)
                .with_player(player)
                .with_connection(conn)
                .with_details(serde_json::json!({
                    "location": location,
                    "cityId": city_id,
                    "commitmentHeight": context.commitment_height,
                })),
        );
        Ok(())
    }

    fn endorse_move(&mut self, conn: ConnId, from: Tile, to: Tile) -> EnclaveResult<()> {
        self.require_live()?;
        let player = self.require_player(conn)?;

        let board = &self.state.board;
        if !board.contains(from.location) || !board.contains(to.location) {
            return Err(EnclaveError::Protocol(format!(
                "move {} -> {} leaves the board",
                from.location, to.location
            )));
        }
        if !from.location.is_adjacent(&to.location) {
            return Err(EnclaveError::Protocol(format!(
                "{} and {} are not adjacent",
                from.location, to.location
            )));
        }

        let (previous_from, previous_to) = match (board.tile(from.location), board.tile(to.location)) {
            (Some(f), Some(t)) => (f.clone(), t.clone()),
            _ => {
                return Err(EnclaveError::Protocol("move tiles not found".to_string()));
            }
        };
        if !previous_from.is_owned_by(&player) {
            return Err(EnclaveError::ClaimConflict(format!(
                "{} is not owned by {player} on the current board",
                from.location
            )));
        }

        let height = self.state.height;
        let signature = self.signer.sign_move(
            previous_from.hash(),
            previous_to.hash(),
            from.hash(),
            to.hash(),
            height,
        )?;
        let backups = [self.cipher.encrypt(&from)?, self.cipher.encrypt(&to)?];

        let key = self
            .state
            .claims
            .propose_move(player, from, to, height, backups)?;

        self.state
            .sessions
            .send(conn, ServerMessage::MoveSignatureResponse { signature, height });

        tracing::debug!(player = %player, key = %key, height, "Move endorsed");
        self.audit(
            AuditEvent::new(AuditEventType::MoveEndorsed)
                .with_player(player)
                .with_connection(conn)
                .with_details(serde_json::json!({
                    "fromHash": key.from,
                    "toHash": key.to,
                    "height": height,
                })),
        );
        Ok(())
    }

    fn decrypt(&mut self, conn: ConnId, location: Location) -> EnclaveResult<()> {
        self.require_live()?;
        let player = self.require_player(conn)?;
        if !self.state.board.contains(location) {
            return Err(EnclaveError::Protocol(format!("{location} is off the board")));
        }

        let tile = self
            .state
            .fog
            .masked_view(&self.state.board, location, &player);
        self.state
            .sessions
            .send(conn, ServerMessage::DecryptResponse { tile });
        Ok(())
    }

    // =========================================================================
    // DA node
    // =========================================================================

    fn handshake_da(&mut self, conn: ConnId) -> EnclaveResult<()> {
        if self.state.backups.is_attached(conn) {
            return Err(EnclaveError::Protocol(
                "DA node is already attached on this connection".to_string(),
            ));
        }
        if self.state.sessions.resolve(conn).is_some() {
            return Err(EnclaveError::ProtocolViolation(
                "player connections cannot act as DA node".to_string(),
            ));
        }
        if !self.state.backups.try_attach(conn) {
            self.audit(
                AuditEvent::new(AuditEventType::DaRejected)
                    .with_connection(conn)
                    .failed("slot already held"),
            );
            return Err(EnclaveError::ProtocolViolation(
                "a DA node is already attached".to_string(),
            ));
        }

        let recovery_mode = self.state.is_recovering();
        tracing::info!(
            conn = %conn,
            recovery_mode,
            queued = self.state.backups.depth(),
            commitments = self
                .state
                .recovery
                .as_ref()
                .map_or(0, |recovery| recovery.commitment_count()),
            "DA node attached"
        );
        self.audit(AuditEvent::new(AuditEventType::DaAttached).with_connection(conn));

        self.state
            .sessions
            .send(conn, ServerMessage::HandshakeDaResponse { recovery_mode });
        if let Some(recovery) = &self.state.recovery {
            self.state.sessions.send(
                conn,
                ServerMessage::SendRecoveredTile {
                    index: recovery.next_index(),
                },
            );
        }
        Ok(())
    }

    fn recovered_tile(&mut self, conn: ConnId, envelope: BackupEnvelope) -> EnclaveResult<()> {
        let (result, index) = {
            let Some(recovery) = self.state.recovery.as_mut() else {
                return Err(EnclaveError::Protocol("not in recovery mode".to_string()));
            };
            let result = recovery.apply(&mut self.state.board, &self.cipher, &envelope);
            (result, recovery.next_index())
        };

        match result {
            Ok(tile) => tracing::debug!(index, location = %tile.location, "Recovered tile accepted"),
            Err(e) => {
                tracing::warn!(index, error = %e, "Recovered tile rejected");
                self.audit(
                    AuditEvent::new(AuditEventType::RecoveredTileRejected)
                        .with_connection(conn)
                        .with_details(serde_json::json!({ "index": index.saturating_sub(1) }))
                        .failed(e.to_string()),
                );
            }
        }

        self.state
            .sessions
            .send(conn, ServerMessage::SendRecoveredTile { index });
        Ok(())
    }

    fn backup_saved(&mut self, conn: ConnId) -> EnclaveResult<()> {
        if !self.state.backups.acknowledge(conn) {
            return Err(EnclaveError::Protocol(
                "no backup is awaiting acknowledgement".to_string(),
            ));
        }
        Ok(())
    }

    fn finish_recovery(&mut self, conn: ConnId) -> EnclaveResult<()> {
        let Some(recovery) = self.state.recovery.take() else {
            return Err(EnclaveError::Protocol("not in recovery mode".to_string()));
        };

        let summary = recovery.summary();
        tracing::info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Recovery finished, serving live sessions"
        );
        self.audit(
            AuditEvent::new(AuditEventType::RecoveryFinished)
                .with_connection(conn)
                .with_details(serde_json::json!({
                    "accepted": summary.accepted,
                    "rejected": summary.rejected,
                })),
        );
        Ok(())
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    fn handle_ledger(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::TileCommitted { hash } => {
                if let Some(recovery) = self.state.recovery.as_mut() {
                    recovery.record_commitment(hash);
                }
            }
            LedgerEvent::MoveFinalized { from_hash, to_hash } => {
                reconciler::move_finalized(&mut self.state, MoveKey::new(from_hash, to_hash));
            }
            LedgerEvent::SpawnAttemptResolved { player, success } => {
                reconciler::spawn_resolved(&mut self.state, &self.cipher, player, success);
            }
            LedgerEvent::NewBlock { height } => self.advance_height(height),
        }
    }

    fn advance_height(&mut self, height: u64) {
        if height <= self.state.height {
            return;
        }
        self.state.height = height;

        let expired = self
            .state
            .claims
            .sweep_expired(height, self.settings.max_move_lifespan);
        if !expired.is_empty() {
            tracing::debug!(height, expired = expired.len(), "Expired move claims");
        }
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(storage) = &self.audit {
            if let Err(e) = AuditRepository::new(storage).log(&event) {
                tracing::warn!(error = %e, "Failed to write audit event");
            }
        }
    }
}

async fn fetch_spawn_context(
    ledger: &dyn LedgerReader,
    player: PlayerAddress,
) -> Result<SpawnContext, LedgerError> {
    let commitment_height = ledger
        .spawn_commitment(player)
        .await?
        .ok_or(LedgerError::NoSpawnCommitment(player))?;
    let challenge_hash = ledger.spawn_challenge_hash(player).await?;
    let block_hash = ledger.block_hash(commitment_height).await?;

    Ok(SpawnContext {
        commitment_height,
        challenge_hash,
        block_hash,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy::primitives::{B256, U256};
    use async_trait::async_trait;
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;
    use k256::pkcs8::{EncodePrivateKey, LineEnding};
    use tempfile::TempDir;

    use super::*;
    use crate::backup::RecoveryCoordinator;
    use crate::enclave::testing::{drain, Actor};
    use crate::game::{Board, FogOfWar};
    use crate::models::MaskedTile;
    use crate::storage::{StoragePaths, BACKUP_KEY_LEN};

    const SIZE: u32 = 12;
    const LIFESPAN: u64 = 5;
    const BLOCK_HASH: B256 = B256::repeat_byte(0x5e);

    #[derive(Default)]
    struct MockLedger {
        commitments: HashMap<PlayerAddress, (u64, B256)>,
    }

    impl MockLedger {
        fn committed(actor: &Actor, secret: U256) -> Self {
            let mut ledger = Self::default();
            ledger
                .commitments
                .insert(actor.address(), (90, spawn_challenge(secret)));
            ledger
        }
    }

    #[async_trait]
    impl LedgerReader for MockLedger {
        async fn spawn_commitment(&self, player: PlayerAddress) -> Result<Option<u64>, LedgerError> {
            Ok(self.commitments.get(&player).map(|(height, _)| *height))
        }

        async fn spawn_challenge_hash(&self, player: PlayerAddress) -> Result<B256, LedgerError> {
            Ok(self
                .commitments
                .get(&player)
                .map(|(_, hash)| *hash)
                .unwrap_or_default())
        }

        async fn block_hash(&self, _height: u64) -> Result<B256, LedgerError> {
            Ok(BLOCK_HASH)
        }
    }

    fn cipher() -> TileCipher {
        TileCipher::new(&[7u8; BACKUP_KEY_LEN])
    }

    fn enclave_with(ledger: MockLedger, recovery: Option<RecoveryCoordinator>) -> Enclave {
        let pem = SigningKey::random(&mut OsRng)
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap();
        let signer = EnclaveSigner::from_pem(pem.as_bytes()).unwrap();
        let state = EnclaveState::new(Board::seeded(SIZE, 0), FogOfWar::new(1), recovery, 100);
        let settings = EnclaveSettings {
            max_move_lifespan: LIFESPAN,
            spawn_resources: 10,
        };
        Enclave::new(state, settings, cipher(), signer, Arc::new(ledger))
    }

    fn enclave() -> Enclave {
        enclave_with(MockLedger::default(), None)
    }

    fn connect(enclave: &mut Enclave) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn = ConnId::new();
        let (outbound, mut rx) = mpsc::unbounded_channel();
        enclave.dispatch(Inbound::Connected { conn, outbound });
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::Challenge {
                nonce: conn.to_string()
            }]
        );
        (conn, rx)
    }

    fn send(enclave: &mut Enclave, conn: ConnId, message: ClientMessage) {
        enclave.dispatch(Inbound::Message { conn, message });
    }

    fn log_in(enclave: &mut Enclave, actor: &Actor) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (conn, mut rx) = connect(enclave);
        send(
            enclave,
            conn,
            ClientMessage::Login {
                address: actor.address(),
                signature: actor.sign_nonce(conn),
            },
        );
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::LoginResponse { .. }]
        ));
        (conn, rx)
    }

    fn attach_da(enclave: &mut Enclave) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (conn, rx) = connect(enclave);
        send(enclave, conn, ClientMessage::HandshakeDa);
        (conn, rx)
    }

    /// First secret whose spawn location is free on the seeded board.
    fn spawnable_secret(board: &Board) -> U256 {
        (1u64..)
            .map(U256::from)
            .find(|secret| {
                let location = spawn_location(*secret, BLOCK_HASH, SIZE);
                board.tile(location).is_some_and(Tile::is_spawnable)
            })
            .unwrap()
    }

    fn spawn_request(actor: &Actor, conn: ConnId, secret: U256) -> ClientMessage {
        ClientMessage::GetSpawnSignature {
            symbol: actor.player.symbol.clone(),
            address: actor.address(),
            signature: actor.sign_nonce(conn),
            secret,
        }
    }

    fn is_disconnect(messages: &[ServerMessage]) -> bool {
        messages.last().is_some_and(ServerMessage::closes_connection)
    }

    #[test]
    fn login_binds_the_address() {
        let mut enclave = enclave();
        let alice = Actor::new("A");

        let (conn, _rx) = log_in(&mut enclave, &alice);

        assert_eq!(enclave.state.sessions.resolve(conn), Some(alice.address()));
        assert_eq!(enclave.subscribe_status().borrow().players_online, 1);
    }

    #[test]
    fn bad_login_signature_closes_the_connection() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let mallory = Actor::new("M");
        let (conn, mut rx) = connect(&mut enclave);

        send(
            &mut enclave,
            conn,
            ClientMessage::Login {
                address: alice.address(),
                signature: mallory.sign_nonce(conn),
            },
        );

        assert!(is_disconnect(&drain(&mut rx)));
        assert!(!enclave.state.sessions.is_connected(conn));
    }

    #[test]
    fn second_login_for_same_address_is_refused() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let (first, _first_rx) = log_in(&mut enclave, &alice);
        let (second, mut second_rx) = connect(&mut enclave);

        send(
            &mut enclave,
            second,
            ClientMessage::Login {
                address: alice.address(),
                signature: alice.sign_nonce(second),
            },
        );

        assert!(is_disconnect(&drain(&mut second_rx)));
        assert_eq!(enclave.state.sessions.resolve(first), Some(alice.address()));
    }

    #[test]
    fn requests_before_login_are_refused() {
        let mut enclave = enclave();
        let (conn, mut rx) = connect(&mut enclave);

        send(
            &mut enclave,
            conn,
            ClientMessage::Decrypt {
                location: Location::new(0, 0),
            },
        );

        assert!(is_disconnect(&drain(&mut rx)));
    }

    #[test]
    fn malformed_frame_is_reported_without_closing() {
        let mut enclave = enclave();
        let (conn, mut rx) = connect(&mut enclave);

        enclave.dispatch(Inbound::Malformed {
            conn,
            error: "expected value at line 1".to_string(),
        });

        let messages = drain(&mut rx);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "protocol_error"
        ));
        assert!(enclave.state.sessions.is_connected(conn));
    }

    #[tokio::test]
    async fn spawn_is_endorsed_then_committed_by_the_ledger() {
        let alice = Actor::new("A");
        let secret = spawnable_secret(&Board::seeded(SIZE, 0));
        let mut enclave = enclave_with(MockLedger::committed(&alice, secret), None);
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(&mut enclave, conn, spawn_request(&alice, conn, secret));
        assert!(enclave.step().await);

        let location = spawn_location(secret, BLOCK_HASH, SIZE);
        let messages = drain(&mut rx);
        let [ServerMessage::SpawnSignatureResponse {
            previous_tile,
            proposed_tile,
            ..
        }] = messages.as_slice()
        else {
            panic!("unexpected messages: {messages:?}");
        };
        assert_eq!(previous_tile.location, location);
        assert_eq!(proposed_tile.terrain, Terrain::Capital);
        assert_eq!(proposed_tile.resources, 10);
        assert!(proposed_tile.is_owned_by(&alice.address()));
        assert!(enclave.state.claims.has_pending_spawn(&alice.address()));

        enclave.dispatch(Inbound::Ledger(LedgerEvent::SpawnAttemptResolved {
            player: alice.address(),
            success: true,
        }));

        assert!(enclave.state.board.is_spawned(&alice.address()));
        assert_eq!(enclave.state.board.capital_of(&alice.address()), Some(location));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::UpdateDisplay { .. }]
        ));
        assert_eq!(enclave.state.backups.depth(), 1);
    }

    #[tokio::test]
    async fn spawn_with_wrong_secret_closes_the_connection() {
        let alice = Actor::new("A");
        let secret = spawnable_secret(&Board::seeded(SIZE, 0));
        let mut enclave = enclave_with(MockLedger::committed(&alice, secret), None);
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(&mut enclave, conn, spawn_request(&alice, conn, secret + U256::from(1)));
        assert!(enclave.step().await);

        assert!(is_disconnect(&drain(&mut rx)));
        assert!(!enclave.state.claims.has_pending_spawn(&alice.address()));
    }

    #[tokio::test]
    async fn spawn_without_commitment_asks_to_retry() {
        let alice = Actor::new("A");
        let mut enclave = enclave();
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(&mut enclave, conn, spawn_request(&alice, conn, U256::from(1)));
        assert!(enclave.step().await);

        assert_eq!(drain(&mut rx), vec![ServerMessage::TrySpawnAgain]);
        assert!(enclave.state.sessions.is_connected(conn));
    }

    #[tokio::test]
    async fn spawn_for_another_address_is_refused() {
        let alice = Actor::new("A");
        let bob = Actor::new("B");
        let mut enclave = enclave();
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(&mut enclave, conn, spawn_request(&bob, conn, U256::from(1)));

        assert!(is_disconnect(&drain(&mut rx)));
    }

    #[test]
    fn one_move_per_block_then_disconnect() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        enclave.state.board.set_tile(alice.tile(2, 2, 1, Terrain::Capital));
        enclave.state.board.set_tile(alice.tile(4, 4, 1, Terrain::Bare));
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        let mut from = alice.tile(2, 2, 1, Terrain::Capital);
        from.resources = 1;
        let mut to = Tile::terrain_only(Location::new(2, 3), Terrain::Bare);
        to.owner = Some(alice.player.clone());
        to.resources = 3;
        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: from,
                to_tile: to,
            },
        );

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::MoveSignatureResponse { height: 100, .. }]
        ));
        assert_eq!(enclave.state.claims.pending_moves(), 1);

        let mut from = alice.tile(4, 4, 1, Terrain::Bare);
        from.resources = 1;
        let to = alice.tile(4, 5, 1, Terrain::Bare);
        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: from,
                to_tile: to,
            },
        );

        let messages = drain(&mut rx);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::Disconnect { reason }] if reason.contains("rate limited")
        ));
        assert_eq!(enclave.state.claims.pending_moves(), 1);
    }

    #[tokio::test]
    async fn spawning_lets_the_player_move_again_in_the_same_block() {
        let alice = Actor::new("A");
        let secret = spawnable_secret(&Board::seeded(SIZE, 0));
        let location = spawn_location(secret, BLOCK_HASH, SIZE);
        let mut enclave = enclave_with(MockLedger::committed(&alice, secret), None);

        // A stray tile left over from an earlier life, away from the spawn row.
        let stray_row = if location.row > SIZE / 2 { 0 } else { SIZE - 1 };
        enclave.state.board.set_tile(alice.tile(stray_row, 0, 0, Terrain::Bare));
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        let mut from = alice.tile(stray_row, 0, 0, Terrain::Bare);
        from.resources = 1;
        let to = alice.tile(stray_row, 1, 0, Terrain::Bare);
        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: from,
                to_tile: to,
            },
        );
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::MoveSignatureResponse { height: 100, .. }]
        ));

        send(&mut enclave, conn, spawn_request(&alice, conn, secret));
        assert!(enclave.step().await);
        drain(&mut rx);
        enclave.dispatch(Inbound::Ledger(LedgerEvent::SpawnAttemptResolved {
            player: alice.address(),
            success: true,
        }));
        drain(&mut rx);
        assert_eq!(enclave.state.height, 100);

        let capital = enclave.state.board.tile(location).cloned().unwrap();
        let mut from = capital.clone();
        from.resources = 1;
        let col = if location.col + 1 < SIZE {
            location.col + 1
        } else {
            location.col - 1
        };
        let mut to = Tile::terrain_only(Location::new(location.row, col), Terrain::Bare);
        to.owner = Some(alice.player.clone());
        to.city_id = capital.city_id;
        to.resources = 8;
        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: from,
                to_tile: to,
            },
        );

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::MoveSignatureResponse { height: 100, .. }]
        ));
        assert_eq!(enclave.state.claims.pending_moves(), 2);
    }

    #[test]
    fn move_from_unowned_tile_is_a_conflict() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: alice.tile(2, 2, 1, Terrain::Bare),
                to_tile: alice.tile(2, 3, 1, Terrain::Bare),
            },
        );

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Disconnect { reason }] if reason.contains("claim conflict")
        ));
    }

    #[test]
    fn non_adjacent_move_is_rejected() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        enclave.state.board.set_tile(alice.tile(2, 2, 1, Terrain::Capital));
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: alice.tile(2, 2, 1, Terrain::Capital),
                to_tile: alice.tile(5, 5, 1, Terrain::Bare),
            },
        );

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code, .. }] if code == "protocol_error"
        ));
        assert_eq!(enclave.state.claims.pending_moves(), 0);
    }

    #[test]
    fn new_block_expires_stale_moves() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        enclave.state.board.set_tile(alice.tile(2, 2, 1, Terrain::Capital));
        let (conn, _rx) = log_in(&mut enclave, &alice);
        send(
            &mut enclave,
            conn,
            ClientMessage::GetMoveSignature {
                from_tile: alice.tile(2, 2, 1, Terrain::Capital),
                to_tile: alice.tile(2, 3, 1, Terrain::Bare),
            },
        );
        assert_eq!(enclave.state.claims.pending_moves(), 1);

        enclave.dispatch(Inbound::Ledger(LedgerEvent::NewBlock { height: 100 + LIFESPAN }));
        assert_eq!(enclave.state.claims.pending_moves(), 1);

        enclave.dispatch(Inbound::Ledger(LedgerEvent::NewBlock {
            height: 100 + LIFESPAN + 1,
        }));
        assert_eq!(enclave.state.claims.pending_moves(), 0);
        assert_eq!(enclave.subscribe_status().borrow().height, 100 + LIFESPAN + 1);

        enclave.dispatch(Inbound::Ledger(LedgerEvent::NewBlock { height: 50 }));
        assert_eq!(enclave.state.height, 100 + LIFESPAN + 1);
    }

    #[test]
    fn decrypt_masks_tiles_outside_the_fog() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let bob = Actor::new("B");
        enclave.state.board.set_tile(alice.tile(2, 2, 1, Terrain::Capital));
        enclave.state.board.set_tile(bob.tile(9, 9, 2, Terrain::Capital));
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(
            &mut enclave,
            conn,
            ClientMessage::Decrypt {
                location: Location::new(2, 3),
            },
        );
        send(
            &mut enclave,
            conn,
            ClientMessage::Decrypt {
                location: Location::new(9, 9),
            },
        );

        let messages = drain(&mut rx);
        assert!(matches!(
            &messages[0],
            ServerMessage::DecryptResponse {
                tile: MaskedTile::Visible(_)
            }
        ));
        assert_eq!(
            messages[1],
            ServerMessage::DecryptResponse {
                tile: MaskedTile::Mystery {
                    location: Location::new(9, 9)
                }
            }
        );
    }

    #[test]
    fn backups_flow_to_the_da_node_one_at_a_time() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let cipher = cipher();
        enclave.state.back_up(&cipher, &alice.tile(1, 1, 1, Terrain::Capital));
        enclave.state.back_up(&cipher, &alice.tile(1, 2, 1, Terrain::Bare));

        let (da, mut da_rx) = attach_da(&mut enclave);
        let messages = drain(&mut da_rx);
        assert_eq!(
            messages[0],
            ServerMessage::HandshakeDaResponse {
                recovery_mode: false
            }
        );
        assert!(matches!(messages[1], ServerMessage::SaveToDatabase { .. }));
        assert_eq!(messages.len(), 2);

        send(&mut enclave, da, ClientMessage::SaveToDatabaseResponse);
        assert!(matches!(
            drain(&mut da_rx).as_slice(),
            [ServerMessage::SaveToDatabase { .. }]
        ));

        send(&mut enclave, da, ClientMessage::SaveToDatabaseResponse);
        assert!(drain(&mut da_rx).is_empty());
        assert_eq!(enclave.state.backups.depth(), 0);
    }

    #[test]
    fn only_one_da_node_may_attach() {
        let mut enclave = enclave();
        let (first, _first_rx) = attach_da(&mut enclave);
        let (_second, mut second_rx) = attach_da(&mut enclave);

        assert!(is_disconnect(&drain(&mut second_rx)));
        assert!(enclave.state.backups.is_attached(first));
    }

    #[test]
    fn da_node_detaches_on_disconnect_and_keeps_unacknowledged_backup() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        enclave
            .state
            .back_up(&cipher(), &alice.tile(1, 1, 1, Terrain::Capital));
        let (da, _da_rx) = attach_da(&mut enclave);

        enclave.dispatch(Inbound::Disconnected { conn: da });

        assert!(enclave.state.backups.attached().is_none());
        assert_eq!(enclave.state.backups.depth(), 1);

        let (_again, mut again_rx) = attach_da(&mut enclave);
        assert!(matches!(
            drain(&mut again_rx).as_slice(),
            [ServerMessage::HandshakeDaResponse { .. }, ServerMessage::SaveToDatabase { .. }]
        ));
    }

    #[test]
    fn player_messages_from_the_da_node_are_violations() {
        let mut enclave = enclave();
        let (da, mut da_rx) = attach_da(&mut enclave);
        drain(&mut da_rx);

        send(
            &mut enclave,
            da,
            ClientMessage::Decrypt {
                location: Location::new(0, 0),
            },
        );

        assert!(is_disconnect(&drain(&mut da_rx)));
        assert!(enclave.state.backups.attached().is_none());
    }

    #[test]
    fn da_messages_from_players_are_violations() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let (conn, mut rx) = log_in(&mut enclave, &alice);

        send(&mut enclave, conn, ClientMessage::RecoveryFinished);

        assert!(is_disconnect(&drain(&mut rx)));
    }

    #[test]
    fn recovery_replays_committed_tiles_then_goes_live() {
        let alice = Actor::new("A");
        let committed = alice.tile(3, 3, 1, Terrain::Capital);
        let forged = alice.tile(3, 4, 1, Terrain::City);
        let recovery = RecoveryCoordinator::new([committed.hash()]);
        let mut enclave = enclave_with(MockLedger::default(), Some(recovery));
        let cipher = cipher();

        let (player, mut player_rx) = connect(&mut enclave);
        send(
            &mut enclave,
            player,
            ClientMessage::Login {
                address: alice.address(),
                signature: alice.sign_nonce(player),
            },
        );
        assert!(matches!(
            drain(&mut player_rx).as_slice(),
            [ServerMessage::Error { code, .. }] if code == "recovering"
        ));

        let (da, mut da_rx) = attach_da(&mut enclave);
        assert_eq!(
            drain(&mut da_rx),
            vec![
                ServerMessage::HandshakeDaResponse {
                    recovery_mode: true
                },
                ServerMessage::SendRecoveredTile { index: 0 },
            ]
        );

        send(
            &mut enclave,
            da,
            ClientMessage::SendRecoveredTileResponse {
                envelope: cipher.encrypt(&committed).unwrap(),
            },
        );
        send(
            &mut enclave,
            da,
            ClientMessage::SendRecoveredTileResponse {
                envelope: cipher.encrypt(&forged).unwrap(),
            },
        );
        assert_eq!(
            drain(&mut da_rx),
            vec![
                ServerMessage::SendRecoveredTile { index: 1 },
                ServerMessage::SendRecoveredTile { index: 2 },
            ]
        );

        send(&mut enclave, da, ClientMessage::RecoveryFinished);

        assert!(!enclave.state.is_recovering());
        assert_eq!(enclave.state.board.tile(committed.location), Some(&committed));
        assert!(enclave
            .state
            .board
            .tile(forged.location)
            .is_some_and(|tile| tile.owner.is_none()));

        send(
            &mut enclave,
            player,
            ClientMessage::Login {
                address: alice.address(),
                signature: alice.sign_nonce(player),
            },
        );
        let messages = drain(&mut player_rx);
        let [ServerMessage::LoginResponse { locations }] = messages.as_slice() else {
            panic!("unexpected messages: {messages:?}");
        };
        assert!(locations.contains(&committed.location));
    }

    #[test]
    fn recovered_tile_outside_recovery_is_rejected() {
        let mut enclave = enclave();
        let alice = Actor::new("A");
        let (da, mut da_rx) = attach_da(&mut enclave);
        drain(&mut da_rx);

        send(
            &mut enclave,
            da,
            ClientMessage::SendRecoveredTileResponse {
                envelope: cipher().encrypt(&alice.tile(0, 0, 1, Terrain::Bare)).unwrap(),
            },
        );

        assert!(matches!(
            drain(&mut da_rx).as_slice(),
            [ServerMessage::Error { code, .. }] if code == "protocol_error"
        ));
    }

    #[test]
    fn tile_commitments_extend_recovery_history() {
        let alice = Actor::new("A");
        let late = alice.tile(6, 6, 1, Terrain::Capital);
        let mut enclave = enclave_with(MockLedger::default(), Some(RecoveryCoordinator::new([])));

        enclave.dispatch(Inbound::Ledger(LedgerEvent::TileCommitted { hash: late.hash() }));

        let recovery = enclave.state.recovery.as_ref().unwrap();
        assert!(recovery.is_committed(&late.hash()));
    }

    #[test]
    fn rejected_login_is_audited() {
        let temp = TempDir::new().unwrap();
        let mut storage = EncryptedStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        let mut enclave = enclave().with_audit(storage.clone());
        let alice = Actor::new("A");
        let mallory = Actor::new("M");
        let (conn, _rx) = connect(&mut enclave);

        send(
            &mut enclave,
            conn,
            ClientMessage::Login {
                address: alice.address(),
                signature: mallory.sign_nonce(conn),
            },
        );

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(&storage).read_events(&today).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::LoginRejected);
        assert!(!events[0].success);
    }
}
