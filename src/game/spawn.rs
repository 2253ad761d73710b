// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Spawn location derivation.
//!
//! The ledger and the enclave must agree on where a player spawns, so the
//! location is a pure function of the player's committed secret and the
//! hash of the block at commitment height:
//!
//! ```text
//! row = keccak256(abi.encode(secret, blockhash, 0)) mod size
//! col = keccak256(abi.encode(secret, blockhash, 1)) mod size
//! ```

use alloy::primitives::{keccak256, B256, U256};
use alloy::sol_types::SolValue;

use crate::models::Location;

fn coordinate(secret: U256, block_hash: B256, axis: u8, size: u32) -> u32 {
    let digest = keccak256((secret, block_hash, U256::from(axis)).abi_encode());
    let value = U256::from_be_bytes(digest.0) % U256::from(size);
    value.to::<u32>()
}

/// Deterministic spawn coordinate for `(secret, block_hash)` on a `size` board.
pub fn spawn_location(secret: U256, block_hash: B256, size: u32) -> Location {
    Location::new(
        coordinate(secret, block_hash, 0, size),
        coordinate(secret, block_hash, 1, size),
    )
}

/// Hash the player committed on-chain before revealing `secret`.
pub fn spawn_challenge(secret: U256) -> B256 {
    keccak256(secret.abi_encode())
}
