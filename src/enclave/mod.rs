// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Core
//!
//! The enclave's state has exactly one owner: the [`Enclave`] task. Every
//! input (connection messages, ledger events, block ticks, results of
//! asynchronous ledger reads) arrives as an [`Inbound`] message on one
//! ordered inbox and is handled to completion before the next one.
//!
//! ```text
//! ws tasks ───┐
//! watcher ────┼──► inbox ──► Enclave::dispatch ──► EnclaveState
//! spawn reads ┘                    │
//!                                  └──► per-connection outbound channels
//! ```

pub mod claims;
mod dispatch;
pub mod reconciler;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

use alloy::primitives::{B256, U256};
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::backup::{BackupQueue, RecoveryCoordinator, TileCipher};
use crate::blockchain::{LedgerError, LedgerEvent};
use crate::game::{Board, FogOfWar};
use crate::models::{PlayerAddress, Tile};
use crate::protocol::{ClientMessage, ConnId, ServerMessage};

pub use dispatch::Enclave;
pub use claims::{ClaimLedger, ClaimedMove, ClaimedSpawn, MoveKey};
pub use session::SessionDirectory;

/// Sender half of one connection's outbound queue.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Everything the enclave reacts to.
#[derive(Debug)]
pub enum Inbound {
    Connected {
        conn: ConnId,
        outbound: Outbound,
    },
    Message {
        conn: ConnId,
        message: ClientMessage,
    },
    /// A frame that did not parse as a [`ClientMessage`].
    Malformed {
        conn: ConnId,
        error: String,
    },
    Disconnected {
        conn: ConnId,
    },
    Ledger(LedgerEvent),
    /// Ledger reads for a spawn request completed.
    SpawnContext {
        conn: ConnId,
        request: SpawnRequest,
        context: Result<SpawnContext, LedgerError>,
    },
}

/// Cloneable entry point into the enclave inbox.
#[derive(Debug, Clone)]
pub struct EnclaveHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EnclaveHandle {
    /// A handle and the inbox it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the enclave has stopped.
    pub fn send(&self, inbound: Inbound) -> bool {
        self.tx.send(inbound).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub symbol: String,
    pub address: PlayerAddress,
    pub secret: U256,
}

/// Ledger facts a spawn endorsement depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnContext {
    pub commitment_height: u64,
    pub challenge_hash: B256,
    pub block_hash: B256,
}

/// Tunables of the game rules.
#[derive(Debug, Clone, Copy)]
pub struct EnclaveSettings {
    /// Blocks a move claim may stay unfinalized.
    pub max_move_lifespan: u64,
    /// Resources on a freshly spawned capital.
    pub spawn_resources: u32,
}

/// Snapshot published after every handled input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EnclaveStatus {
    /// Board is being rebuilt from the DA node
    pub recovery_mode: bool,
    /// A DA node is attached
    pub da_attached: bool,
    /// Last block height seen
    pub height: u64,
    /// Backups not yet acknowledged by the DA node
    pub backup_queue_depth: usize,
    pub pending_spawns: usize,
    pub pending_moves: usize,
    /// Open connections
    pub connections: usize,
    /// Logged-in players
    pub players_online: usize,
}

/// The enclave's full mutable state.
#[derive(Debug)]
pub struct EnclaveState {
    pub board: Board,
    pub fog: FogOfWar,
    pub claims: ClaimLedger,
    pub sessions: SessionDirectory,
    pub backups: BackupQueue,
    /// Present while the board is being rebuilt.
    pub recovery: Option<RecoveryCoordinator>,
    pub height: u64,
}

impl EnclaveState {
    pub fn new(
        board: Board,
        fog: FogOfWar,
        recovery: Option<RecoveryCoordinator>,
        height: u64,
    ) -> Self {
        Self {
            board,
            fog,
            claims: ClaimLedger::new(),
            sessions: SessionDirectory::new(),
            backups: BackupQueue::new(),
            recovery,
            height,
        }
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery.is_some()
    }

    /// Encrypt `tile` and queue it for the DA node.
    pub fn back_up(&mut self, cipher: &TileCipher, tile: &Tile) {
        match cipher.encrypt(tile) {
            Ok(envelope) => self.backups.enqueue(envelope),
            Err(e) => tracing::error!(
                location = %tile.location,
                error = %e,
                "Failed to encrypt tile backup"
            ),
        }
    }

    /// Hand the next backup to the DA node if it is attached and idle.
    ///
    /// Backups wait while recovering so the DA node never receives new
    /// tiles before it finished replaying old ones.
    pub fn drain_backups(&mut self) {
        if self.is_recovering() {
            return;
        }
        if let Some((conn, envelope)) = self.backups.drain_one() {
            if !self
                .sessions
                .send(conn, ServerMessage::SaveToDatabase { envelope })
            {
                tracing::warn!(conn = %conn, "DA node unreachable, backup stays queued");
            }
        }
    }

    pub fn status(&self) -> EnclaveStatus {
        EnclaveStatus {
            recovery_mode: self.is_recovering(),
            da_attached: self.backups.attached().is_some(),
            height: self.height,
            backup_queue_depth: self.backups.depth(),
            pending_spawns: self.claims.pending_spawns(),
            pending_moves: self.claims.pending_moves(),
            connections: self.sessions.len(),
            players_online: self.sessions.logged_in(),
        }
    }
}
