// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Board reconstruction from DA-supplied backups.
//!
//! The DA node is not trusted with the board: every tile it returns must
//! decrypt under the enclave's backup key *and* hash to a commitment the
//! ledger has emitted. Anything else is skipped.

use std::collections::HashSet;

use alloy::primitives::B256;

use super::TileCipher;
use crate::error::{EnclaveError, EnclaveResult};
use crate::game::Board;
use crate::models::{BackupEnvelope, Tile};

/// Drives one recovery session.
#[derive(Debug, Default)]
pub struct RecoveryCoordinator {
    committed: HashSet<B256>,
    next_index: u64,
    accepted: u64,
    rejected: u64,
}

/// Counters reported once recovery finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySummary {
    pub accepted: u64,
    pub rejected: u64,
}

impl RecoveryCoordinator {
    /// Start from the ledger's historical tile commitments.
    pub fn new(history: impl IntoIterator<Item = B256>) -> Self {
        Self {
            committed: history.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a commitment observed after startup.
    pub fn record_commitment(&mut self, hash: B256) {
        self.committed.insert(hash);
    }

    pub fn is_committed(&self, hash: &B256) -> bool {
        self.committed.contains(hash)
    }

    pub fn commitment_count(&self) -> usize {
        self.committed.len()
    }

    /// Index of the next tile to request from the DA node.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Validate one recovered envelope and apply it to `board`.
    ///
    /// The request index advances whether or not the tile is accepted, so
    /// a bad tile never stalls recovery.
    pub fn apply(
        &mut self,
        board: &mut Board,
        cipher: &TileCipher,
        envelope: &BackupEnvelope,
    ) -> EnclaveResult<Tile> {
        self.next_index += 1;

        let result = self.validate(board, cipher, envelope);
        match &result {
            Ok(tile) => {
                board.set_tile(tile.clone());
                self.accepted += 1;
            }
            Err(_) => self.rejected += 1,
        }
        result
    }

    fn validate(
        &self,
        board: &Board,
        cipher: &TileCipher,
        envelope: &BackupEnvelope,
    ) -> EnclaveResult<Tile> {
        let tile = cipher
            .decrypt(envelope)
            .map_err(|e| EnclaveError::RecoveryRejection(e.to_string()))?;

        if !board.contains(tile.location) {
            return Err(EnclaveError::RecoveryRejection(format!(
                "tile at {} lies outside the board",
                tile.location
            )));
        }

        let hash = tile.hash();
        if !self.committed.contains(&hash) {
            return Err(EnclaveError::RecoveryRejection(format!(
                "hash {hash} of tile at {} was never committed on the ledger",
                tile.location
            )));
        }

        Ok(tile)
    }

    pub fn summary(&self) -> RecoverySummary {
        RecoverySummary {
            accepted: self.accepted,
            rejected: self.rejected,
        }
    }
}
