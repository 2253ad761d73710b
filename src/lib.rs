// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fogwar Enclave - Trusted Coordinator for a Fog-of-War Strategy Game
//!
//! This crate runs inside an Intel SGX enclave (Gramine) next to an EVM
//! ledger that holds only tile hashes. The enclave keeps the plaintext
//! board, endorses spawn and move proposals, reveals tiles through the fog
//! of war and streams encrypted backups to a data-availability node.
//!
//! ## Modules
//!
//! - `api` - HTTP and WebSocket handlers (Axum)
//! - `backup` - Tile encryption, DA backup queue and recovery
//! - `blockchain` - Game contract bindings, ledger reads and the log watcher
//! - `enclave` - The single-owner core: sessions, claims, reconciliation
//! - `game` - Board, fog of war and spawn rules
//! - `protocol` - JSON messages exchanged with players and the DA node
//! - `storage` - Sealed storage (Gramine encrypted FS): keys and audit log

pub mod api;
pub mod backup;
pub mod blockchain;
pub mod config;
pub mod enclave;
pub mod error;
pub mod game;
pub mod models;
pub mod protocol;
pub mod state;
pub mod storage;
