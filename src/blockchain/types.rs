// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger-side types shared by the client, the watcher and the enclave core.

use alloy::primitives::{Address, B256};

use crate::models::PlayerAddress;

/// Default block chunk size per `eth_getLogs` query.
pub const DEFAULT_LOG_CHUNK_SIZE: u64 = 2000;

/// Game contract deployment the enclave follows.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Game contract address
    pub contract: Address,
    /// Block the contract was deployed at; history scans start here.
    pub deploy_block: u64,
}

/// Event observed on the ledger, in ledger order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A tile hash became part of the committed board history.
    TileCommitted { hash: B256 },
    /// A move was accepted on-chain.
    MoveFinalized { from_hash: B256, to_hash: B256 },
    /// The ledger decided a spawn attempt.
    SpawnAttemptResolved { player: PlayerAddress, success: bool },
    /// All events up to and including `height` have been delivered.
    NewBlock { height: u64 },
}

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Block {0} not found")]
    MissingBlock(u64),

    #[error("No spawn commitment for {0}")]
    NoSpawnCommitment(PlayerAddress),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}
