// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending spawn and move claims.
//!
//! A claim lives from the moment the enclave endorses a proposal until the
//! ledger resolves it. Spawn claims are keyed by player and never expire.
//! Move claims are keyed by the hashes of the proposed tiles and expire once
//! they are more than `max_lifespan` blocks old.

use std::collections::HashMap;
use std::fmt;

use alloy::primitives::B256;

use crate::error::{EnclaveError, EnclaveResult};
use crate::models::{BackupEnvelope, Location, PlayerAddress, Tile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedSpawn {
    pub previous: Tile,
    pub proposed: Tile,
}

/// Key of a move claim: hashes of the proposed origin and destination tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveKey {
    pub from: B256,
    pub to: B256,
}

impl MoveKey {
    pub fn new(from: B256, to: B256) -> Self {
        Self { from, to }
    }

    pub fn of(from: &Tile, to: &Tile) -> Self {
        Self::new(from.hash(), to.hash())
    }
}

impl fmt::Display for MoveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from, self.to)
    }
}

#[derive(Debug, Clone)]
pub struct ClaimedMove {
    pub player: PlayerAddress,
    pub from: Tile,
    pub to: Tile,
    /// Block height the proposal was endorsed at.
    pub proposed_at: u64,
    /// Encrypted backups of `from` and `to`, prepared at proposal time.
    pub backups: [BackupEnvelope; 2],
}

#[derive(Debug, Default)]
pub struct ClaimLedger {
    spawns: HashMap<PlayerAddress, ClaimedSpawn>,
    moves: HashMap<MoveKey, ClaimedMove>,
    last_move_height: HashMap<PlayerAddress, u64>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propose_spawn(
        &mut self,
        player: PlayerAddress,
        previous: Tile,
        proposed: Tile,
    ) -> EnclaveResult<()> {
        if self.spawns.contains_key(&player) {
            return Err(EnclaveError::ClaimConflict(format!(
                "{player} already has a pending spawn"
            )));
        }
        self.spawns.insert(player, ClaimedSpawn { previous, proposed });
        Ok(())
    }

    pub fn has_pending_spawn(&self, player: &PlayerAddress) -> bool {
        self.spawns.contains_key(player)
    }

    /// Whether another pending spawn already targets `location`.
    pub fn spawn_targets(&self, location: Location) -> bool {
        self.spawns
            .values()
            .any(|claim| claim.proposed.location == location)
    }

    /// Highest city id handed out to a pending spawn (0 when none).
    pub fn max_reserved_city_id(&self) -> u32 {
        self.spawns
            .values()
            .map(|claim| claim.proposed.city_id)
            .max()
            .unwrap_or(0)
    }

    /// Record a move proposal at block `height`.
    ///
    /// An address gets one proposal per block: a proposal at or below the
    /// height of its last accepted one is rate limited.
    pub fn propose_move(
        &mut self,
        player: PlayerAddress,
        from: Tile,
        to: Tile,
        height: u64,
        backups: [BackupEnvelope; 2],
    ) -> EnclaveResult<MoveKey> {
        if let Some(&last_height) = self.last_move_height.get(&player) {
            if last_height >= height {
                return Err(EnclaveError::RateLimited {
                    address: player.to_string(),
                    last_height,
                    height,
                });
            }
        }

        let key = MoveKey::of(&from, &to);
        if self.moves.contains_key(&key) {
            return Err(EnclaveError::ClaimConflict(format!(
                "move {key} is already pending"
            )));
        }

        self.moves.insert(
            key,
            ClaimedMove {
                player,
                from,
                to,
                proposed_at: height,
                backups,
            },
        );
        self.last_move_height.insert(player, height);
        Ok(key)
    }

    pub fn pending_move(&self, key: &MoveKey) -> Option<&ClaimedMove> {
        self.moves.get(key)
    }

    /// Retire the spawn claim of `player`.
    ///
    /// `None` when nothing matches, e.g. after a restart; the caller decides
    /// how to report it.
    pub fn finalize_spawn(&mut self, player: &PlayerAddress) -> Option<ClaimedSpawn> {
        self.spawns.remove(player)
    }

    /// Retire the move claim `key`.
    pub fn finalize_move(&mut self, key: &MoveKey) -> Option<ClaimedMove> {
        self.moves.remove(key)
    }

    /// Let `player` propose again in the current block.
    pub fn reset_move_counter(&mut self, player: &PlayerAddress) {
        self.last_move_height.remove(player);
    }

    /// Drop move claims older than `max_lifespan` blocks at `height`.
    ///
    /// Move heights below `height` are forgotten as well; they can no longer
    /// rate limit anyone.
    pub fn sweep_expired(&mut self, height: u64, max_lifespan: u64) -> Vec<MoveKey> {
        self.last_move_height.retain(|_, last| *last >= height);

        let expired: Vec<MoveKey> = self
            .moves
            .iter()
            .filter(|(_, claim)| height.saturating_sub(claim.proposed_at) > max_lifespan)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            if let Some(claim) = self.moves.remove(key) {
                tracing::debug!(
                    player = %claim.player,
                    proposed_at = claim.proposed_at,
                    height,
                    "Move claim expired"
                );
            }
        }
        expired
    }

    pub fn pending_spawns(&self) -> usize {
        self.spawns.len()
    }

    pub fn pending_moves(&self) -> usize {
        self.moves.len()
    }
}
