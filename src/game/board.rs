// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory board with derived city and ownership indices.
//!
//! The board is the enclave's belief about the full game state. It is only
//! mutated through [`Board::set_tile`], which keeps the indices consistent
//! with the grid.

use std::collections::{BTreeSet, HashMap};

use alloy::primitives::{keccak256, B256};
use alloy::sol_types::SolValue;

use crate::models::{Location, PlayerAddress, Terrain, Tile};

/// Full game board plus indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: u32,
    tiles: Vec<Tile>,
    /// city id → member tile locations
    city_tiles: HashMap<u32, BTreeSet<Location>>,
    /// city id → owning player
    city_owner: HashMap<u32, PlayerAddress>,
    /// player → owned city ids
    player_cities: HashMap<PlayerAddress, BTreeSet<u32>>,
    /// player → capital location; presence means the player is spawned
    capitals: HashMap<PlayerAddress, Location>,
}

impl Board {
    /// Terrain-only board derived from `seed`.
    ///
    /// The same seed always produces the same terrain, which is what lets a
    /// recovering enclave start from the board the game was created with.
    pub fn seeded(size: u32, seed: u64) -> Self {
        let mut tiles = Vec::with_capacity((size as usize) * (size as usize));
        for row in 0..size {
            for col in 0..size {
                let location = Location::new(row, col);
                tiles.push(Tile::terrain_only(location, seed_terrain(seed, location)));
            }
        }

        Self {
            size,
            tiles,
            city_tiles: HashMap::new(),
            city_owner: HashMap::new(),
            player_cities: HashMap::new(),
            capitals: HashMap::new(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn contains(&self, location: Location) -> bool {
        location.in_bounds(self.size)
    }

    fn index(&self, location: Location) -> usize {
        (location.row as usize) * (self.size as usize) + location.col as usize
    }

    /// Tile at `location`, or `None` when off the board.
    pub fn tile(&self, location: Location) -> Option<&Tile> {
        if !self.contains(location) {
            return None;
        }
        self.tiles.get(self.index(location))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub fn owner_of(&self, location: Location) -> Option<PlayerAddress> {
        self.tile(location).and_then(Tile::owner_address)
    }

    pub fn is_spawned(&self, player: &PlayerAddress) -> bool {
        self.capitals.contains_key(player)
    }

    pub fn capital_of(&self, player: &PlayerAddress) -> Option<Location> {
        self.capitals.get(player).copied()
    }

    pub fn cities_of(&self, player: &PlayerAddress) -> Vec<u32> {
        self.player_cities
            .get(player)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn city_tiles(&self, city_id: u32) -> BTreeSet<Location> {
        self.city_tiles.get(&city_id).cloned().unwrap_or_default()
    }

    /// Locations of every tile owned by `player`.
    pub fn owned_by(&self, player: &PlayerAddress) -> Vec<Location> {
        self.tiles
            .iter()
            .filter(|t| t.is_owned_by(player))
            .map(|t| t.location)
            .collect()
    }

    /// Highest city id in use on the board (0 when there are none).
    pub fn max_city_id(&self) -> u32 {
        self.city_tiles.keys().copied().max().unwrap_or(0)
    }

    /// Replace the tile at its location and update every index.
    ///
    /// Returns the tile that was replaced. Off-board tiles are ignored and
    /// return `None`.
    pub fn set_tile(&mut self, tile: Tile) -> Option<Tile> {
        if !self.contains(tile.location) {
            tracing::warn!(location = %tile.location, "Ignoring off-board tile");
            return None;
        }

        let idx = self.index(tile.location);
        let previous = std::mem::replace(&mut self.tiles[idx], tile.clone());
        self.unindex(&previous);
        self.reindex(&tile);
        Some(previous)
    }

    fn unindex(&mut self, previous: &Tile) {
        let location = previous.location;

        if previous.city_id != 0 {
            if let Some(members) = self.city_tiles.get_mut(&previous.city_id) {
                members.remove(&location);
                if members.is_empty() {
                    self.city_tiles.remove(&previous.city_id);
                    if let Some(owner) = self.city_owner.remove(&previous.city_id) {
                        self.drop_player_city(&owner, previous.city_id);
                    }
                }
            }
        }

        if previous.terrain == Terrain::Capital {
            if let Some(owner) = previous.owner_address() {
                if self.capitals.get(&owner) == Some(&location) {
                    self.capitals.remove(&owner);
                }
            }
        }
    }

    fn reindex(&mut self, tile: &Tile) {
        if tile.city_id != 0 {
            self.city_tiles
                .entry(tile.city_id)
                .or_default()
                .insert(tile.location);

            if tile.terrain.is_city_center() {
                match tile.owner_address() {
                    Some(owner) => self.assign_city(tile.city_id, owner),
                    None => {
                        if let Some(old) = self.city_owner.remove(&tile.city_id) {
                            self.drop_player_city(&old, tile.city_id);
                        }
                    }
                }
            }
        }

        if tile.terrain == Terrain::Capital {
            if let Some(owner) = tile.owner_address() {
                self.capitals.insert(owner, tile.location);
            }
        }
    }

    fn assign_city(&mut self, city_id: u32, owner: PlayerAddress) {
        if let Some(old) = self.city_owner.insert(city_id, owner) {
            if old != owner {
                self.drop_player_city(&old, city_id);
            }
        }
        self.player_cities.entry(owner).or_default().insert(city_id);
    }

    fn drop_player_city(&mut self, owner: &PlayerAddress, city_id: u32) {
        if let Some(ids) = self.player_cities.get_mut(owner) {
            ids.remove(&city_id);
            if ids.is_empty() {
                self.player_cities.remove(owner);
            }
        }
    }
}

/// Deterministic terrain for one location.
fn seed_terrain(seed: u64, location: Location) -> Terrain {
    let digest: B256 = keccak256((seed, location.row, location.col).abi_encode());
    match digest[0] % 100 {
        0..=7 => Terrain::Water,
        8..=17 => Terrain::Hill,
        _ => Terrain::Bare,
    }
}
