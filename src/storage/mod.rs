// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sealed Storage Module
//!
//! This module provides persistent storage using **Gramine encrypted files**.
//! All data is stored under `/data` which is mounted as an encrypted filesystem
//! in the Gramine manifest.
//!
//! The board itself is never persisted here: the ledger and the DA node hold
//! the durable copies. Only the enclave's secrets and its audit trail live on
//! the sealed mount.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   keys/
//!     backup.key      # AES-256-GCM key for DA backups (NEVER exposed)
//!     enclave.pem     # secp256k1 endorsement key (NEVER exposed)
//!   audit/
//!     {date}/events.jsonl  # Daily audit logs
//! ```

pub mod audit;
pub mod encrypted_fs;
pub mod keys;
pub mod paths;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use encrypted_fs::{EncryptedStorage, StorageError, StorageResult};
pub use keys::{key_fingerprint, KeyStore, KeyStoreError, BACKUP_KEY_LEN};
pub use paths::StoragePaths;
