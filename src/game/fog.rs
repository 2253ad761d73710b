// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fog-of-war visibility.
//!
//! A player sees a tile when they own it or own any tile in its
//! neighbourhood. Notification sets are computed per viewer: anyone owning a
//! tile near a changed tile is a stakeholder of that change, no matter how far
//! the rest of their empire is.

use std::collections::{BTreeMap, BTreeSet};

use super::Board;
use crate::models::{Location, MaskedTile, PlayerAddress};

/// Viewer → locations they must re-decrypt.
pub type Stakeholders = BTreeMap<PlayerAddress, BTreeSet<Location>>;

#[derive(Debug, Clone, Copy)]
pub struct FogOfWar {
    radius: u32,
}

impl FogOfWar {
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }

    /// Board-clipped square neighbourhood of `location`, including itself.
    pub fn nearby(&self, board: &Board, location: Location) -> Vec<Location> {
        let size = board.size();
        if !location.in_bounds(size) {
            return Vec::new();
        }

        let row_lo = location.row.saturating_sub(self.radius);
        let row_hi = location.row.saturating_add(self.radius).min(size - 1);
        let col_lo = location.col.saturating_sub(self.radius);
        let col_hi = location.col.saturating_add(self.radius).min(size - 1);

        let mut out = Vec::with_capacity(((row_hi - row_lo + 1) * (col_hi - col_lo + 1)) as usize);
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                out.push(Location::new(row, col));
            }
        }
        out
    }

    pub fn is_visible(&self, board: &Board, location: Location, player: &PlayerAddress) -> bool {
        self.nearby(board, location)
            .into_iter()
            .any(|loc| board.owner_of(loc).as_ref() == Some(player))
    }

    /// The true tile when visible, a location-only sentinel otherwise.
    pub fn masked_view(&self, board: &Board, location: Location, player: &PlayerAddress) -> MaskedTile {
        match board.tile(location) {
            Some(tile) if self.is_visible(board, location, player) => MaskedTile::Visible(tile.clone()),
            _ => MaskedTile::Mystery { location },
        }
    }

    /// Every location `player` can currently see.
    pub fn visible_locations(&self, board: &Board, player: &PlayerAddress) -> BTreeSet<Location> {
        board
            .owned_by(player)
            .into_iter()
            .flat_map(|loc| self.nearby(board, loc))
            .collect()
    }

    /// Per-viewer notification map for a set of changed locations.
    ///
    /// `prior_owners` maps affected locations to whoever owned them before
    /// the change; those players lose sight and must refresh too.
    pub fn stakeholders(
        &self,
        board: &Board,
        affected: &BTreeSet<Location>,
        prior_owners: &BTreeMap<Location, PlayerAddress>,
    ) -> Stakeholders {
        let mut out = Stakeholders::new();

        for location in affected {
            for near in self.nearby(board, *location) {
                if let Some(owner) = board.owner_of(near) {
                    out.entry(owner).or_default().insert(*location);
                }
            }
            if let Some(prior) = prior_owners.get(location) {
                out.entry(*prior).or_default().insert(*location);
            }
        }

        out
    }
}
