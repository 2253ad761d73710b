// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted board backups and recovery against the DA node.

pub mod cipher;
pub mod queue;
pub mod recovery;

pub use cipher::TileCipher;
pub use queue::{BackupQueue, DaSlot};
pub use recovery::{RecoveryCoordinator, RecoverySummary};
