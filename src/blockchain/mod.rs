// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration for the game contract.
//!
//! This module provides functionality for:
//! - Reading spawn commitments and block hashes
//! - Following game events (tile commitments, finalizations, spawn results)
//! - Signing spawn and move endorsements with the enclave key

pub mod client;
pub mod contract;
pub mod signing;
pub mod types;
pub mod watcher;

pub use client::{LedgerClient, LedgerReader};
pub use signing::EnclaveSigner;
pub use types::*;
pub use watcher::LedgerWatcher;
