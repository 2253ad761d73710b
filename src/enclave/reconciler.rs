// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Applies ledger finalizations to the board.
//!
//! The ledger is authoritative: a finalization retires the matching claim,
//! commits the claimed tiles, backs them up and tells every stakeholder which
//! tiles to re-decrypt. A finalization without a local claim (possible after
//! a restart) is reported and otherwise ignored, since the event only carries
//! hashes and the board cannot be rebuilt from them.
//!
//! ## Captures
//!
//! When a move changes the owner of a destination tile, more tiles than the
//! two moved ones are affected:
//!
//! | Destination before the move | Extra affected tiles |
//! |-----------------------------|----------------------|
//! | capital | every tile of every city of the dispossessed player |
//! | city center | every tile of that city |
//! | anything else | none |
//!
//! The old owner, the new owner and everyone near an affected tile refresh
//! it. Only the two moved tiles are written: the ledger commits nothing
//! else, and any other tile changes through its own committed move.

use std::collections::{BTreeMap, BTreeSet};

use crate::backup::TileCipher;
use crate::error::EnclaveError;
use crate::game::Stakeholders;
use crate::models::{Location, PlayerAddress, Terrain, Tile};
use crate::protocol::ServerMessage;

use super::{EnclaveState, MoveKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Capital committed at `location`.
    Spawned { location: Location },
    /// Ledger rejected the attempt; the player was asked to retry.
    Retry,
    /// No local claim matched.
    Unclaimed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub affected: BTreeSet<Location>,
    pub stakeholders: Stakeholders,
}

pub fn spawn_resolved(
    state: &mut EnclaveState,
    cipher: &TileCipher,
    player: PlayerAddress,
    success: bool,
) -> SpawnOutcome {
    let Some(claim) = state.claims.finalize_spawn(&player) else {
        let anomaly =
            EnclaveError::ReconciliationAnomaly(format!("spawn of {player} resolved without a claim"));
        tracing::warn!(error = %anomaly, success, "Ignoring spawn resolution");
        return SpawnOutcome::Unclaimed;
    };

    if !success {
        tracing::info!(player = %player, "Spawn attempt rejected by the ledger");
        state
            .sessions
            .send_to_player(&player, ServerMessage::TrySpawnAgain);
        return SpawnOutcome::Retry;
    }

    let location = claim.proposed.location;
    state.board.set_tile(claim.proposed.clone());
    state.claims.reset_move_counter(&player);
    state.back_up(cipher, &claim.proposed);

    let view = state.fog.visible_locations(&state.board, &player);
    state.sessions.send_to_player(
        &player,
        ServerMessage::UpdateDisplay {
            locations: view.into_iter().collect(),
        },
    );

    let stakeholders =
        state
            .fog
            .stakeholders(&state.board, &BTreeSet::from([location]), &BTreeMap::new());
    notify(state, &stakeholders, Some(&player));

    tracing::info!(player = %player, location = %location, "Player spawned");
    SpawnOutcome::Spawned { location }
}

pub fn move_finalized(state: &mut EnclaveState, key: MoveKey) -> Option<MoveOutcome> {
    let Some(claim) = state.claims.finalize_move(&key) else {
        let anomaly =
            EnclaveError::ReconciliationAnomaly(format!("move {key} finalized without a claim"));
        tracing::warn!(error = %anomaly, "Ignoring move finalization");
        if let Some(recovery) = state.recovery.as_mut() {
            recovery.record_commitment(key.from);
            recovery.record_commitment(key.to);
        }
        return None;
    };

    let previous_from = state.board.tile(claim.from.location).cloned();
    let previous_to = state.board.tile(claim.to.location).cloned();

    let mut affected = BTreeSet::from([claim.from.location, claim.to.location]);
    let mut prior_owners = BTreeMap::new();
    for (previous, next) in [(&previous_from, &claim.from), (&previous_to, &claim.to)] {
        if let Some(owner) = previous.as_ref().and_then(Tile::owner_address) {
            if !next.is_owned_by(&owner) {
                prior_owners.insert(next.location, owner);
            }
        }
    }

    let dispossessed = previous_to
        .as_ref()
        .and_then(Tile::owner_address)
        .filter(|old| !claim.to.is_owned_by(old));

    let captured_cities = match (dispossessed, &previous_to) {
        (Some(old), Some(prev)) if prev.terrain == Terrain::Capital => state.board.cities_of(&old),
        (Some(_), Some(prev)) if prev.terrain == Terrain::City && prev.city_id != 0 => {
            vec![prev.city_id]
        }
        _ => Vec::new(),
    };

    if let Some(old) = dispossessed {
        for city_id in &captured_cities {
            for location in state.board.city_tiles(*city_id) {
                affected.insert(location);
                prior_owners.entry(location).or_insert(old);
            }
        }
        tracing::info!(
            old_owner = %old,
            new_owner = ?claim.to.owner_address(),
            cities = ?captured_cities,
            "Destination captured"
        );
    }

    state.board.set_tile(claim.from.clone());
    state.board.set_tile(claim.to.clone());
    for envelope in claim.backups {
        state.backups.enqueue(envelope);
    }

    let stakeholders = state.fog.stakeholders(&state.board, &affected, &prior_owners);
    notify(state, &stakeholders, None);

    tracing::debug!(
        player = %claim.player,
        from = %claim.from.location,
        to = %claim.to.location,
        affected = affected.len(),
        "Move finalized"
    );

    Some(MoveOutcome {
        affected,
        stakeholders,
    })
}

/// Send each logged-in stakeholder the locations to refresh.
fn notify(state: &EnclaveState, stakeholders: &Stakeholders, skip: Option<&PlayerAddress>) {
    for (viewer, locations) in stakeholders {
        if Some(viewer) == skip {
            continue;
        }
        state.sessions.send_to_player(
            viewer,
            ServerMessage::UpdateDisplay {
                locations: locations.iter().copied().collect(),
            },
        );
    }
}
