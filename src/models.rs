// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Game Data Models
//!
//! Core value types shared by the board, the claim ledger, the wire protocol
//! and the backup pipeline. All types derive `Serialize` and `Deserialize`
//! so they can travel over the WebSocket protocol and inside encrypted
//! backup envelopes unchanged.
//!
//! ## Player Address Type
//!
//! The [`PlayerAddress`] newtype wraps an EVM address. It is the durable
//! identity of a player on the ledger; the player's symbol is cosmetic.
//!
//! ## Tile Commitments
//!
//! [`Tile::hash`] is the commitment the ledger stores for a tile. It must be
//! computed identically here and in the correctness proof, so the encoding
//! is plain ABI encoding of the tile fields.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

// =============================================================================
// Player Address Type
// =============================================================================

/// EVM address of a player.
///
/// # Example
///
/// ```rust,ignore
/// let addr: PlayerAddress = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12".parse()?;
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PlayerAddress(pub Address);

impl PlayerAddress {
    pub fn as_address(&self) -> Address {
        self.0
    }
}

impl fmt::Display for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for PlayerAddress {
    fn from(value: Address) -> Self {
        PlayerAddress(value)
    }
}

impl From<PlayerAddress> for Address {
    fn from(value: PlayerAddress) -> Self {
        value.0
    }
}

impl FromStr for PlayerAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_str(s)
            .map(PlayerAddress)
            .map_err(|e| format!("invalid player address {s}: {e}"))
    }
}

/// A player as it appears on owned tiles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Player {
    /// Display symbol chosen at spawn time.
    pub symbol: String,
    pub address: PlayerAddress,
}

// =============================================================================
// Board Geometry
// =============================================================================

/// Grid coordinate of a tile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub row: u32,
    pub col: u32,
}

impl Location {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Whether the location lies on a `size × size` board.
    pub fn in_bounds(&self, size: u32) -> bool {
        self.row < size && self.col < size
    }

    /// Orthogonal neighbours share an edge.
    pub fn is_adjacent(&self, other: &Location) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Terrain of a tile. City centers and capitals are terrain kinds too.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Terrain {
    #[default]
    Bare = 0,
    Water = 1,
    Hill = 2,
    City = 3,
    Capital = 4,
}

impl Terrain {
    pub fn is_city_center(&self) -> bool {
        matches!(self, Terrain::City | Terrain::Capital)
    }
}

// =============================================================================
// Tiles
// =============================================================================

/// Full state of one board tile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub location: Location,
    pub owner: Option<Player>,
    pub resources: u32,
    /// `0` when the tile is not part of any city.
    pub city_id: u32,
    pub terrain: Terrain,
}

impl Tile {
    /// Unowned tile carrying only terrain.
    pub fn terrain_only(location: Location, terrain: Terrain) -> Self {
        Self {
            location,
            owner: None,
            resources: 0,
            city_id: 0,
            terrain,
        }
    }

    pub fn owner_address(&self) -> Option<PlayerAddress> {
        self.owner.as_ref().map(|p| p.address)
    }

    pub fn is_owned_by(&self, address: &PlayerAddress) -> bool {
        self.owner_address().as_ref() == Some(address)
    }

    /// A player may only spawn on empty bare land.
    pub fn is_spawnable(&self) -> bool {
        self.owner.is_none() && self.terrain == Terrain::Bare && self.city_id == 0
    }

    /// Ledger commitment of this tile.
    ///
    /// `keccak256(abi.encode(row, col, owner, resources, cityId, terrain))`,
    /// where an unowned tile encodes the zero address. The symbol is not
    /// committed. `terrain` is widened to a full word, which is exactly how
    /// `uint8` is ABI encoded.
    pub fn hash(&self) -> B256 {
        let owner = self
            .owner_address()
            .map(Address::from)
            .unwrap_or(Address::ZERO);
        let encoded = (
            self.location.row,
            self.location.col,
            owner,
            self.resources,
            self.city_id,
            U256::from(self.terrain as u8),
        )
            .abi_encode();
        keccak256(encoded)
    }
}

/// What a player is allowed to see of a tile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskedTile {
    Visible(Tile),
    /// Sentinel that carries nothing but the location.
    Mystery { location: Location },
}

// =============================================================================
// Backup Envelopes
// =============================================================================

/// Encrypted tile as stored by the DA node.
///
/// The owner fields are plaintext metadata so the DA node can index
/// backups; the tile itself is only in the ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<PlayerAddress>,
    /// Hex-encoded AES-256-GCM ciphertext (without tag).
    pub ciphertext: String,
    /// Hex-encoded 96-bit nonce.
    pub iv: String,
    /// Hex-encoded 128-bit authentication tag.
    pub tag: String,
}
