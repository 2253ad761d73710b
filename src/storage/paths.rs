// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the sealed storage layout.

use std::path::{Path, PathBuf};

/// Base directory for all sealed persistent storage.
/// This MUST be mounted as `type = "encrypted"` in the Gramine manifest.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the encrypted filesystem.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all sealed data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Key Paths ==========

    /// Directory containing enclave secrets.
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    /// Raw 32-byte AES key protecting DA backups.
    pub fn backup_key(&self) -> PathBuf {
        self.keys_dir().join("backup.key")
    }

    /// PKCS#8 PEM secp256k1 key used for endorsements.
    pub fn enclave_key(&self) -> PathBuf {
        self.keys_dir().join("enclave.pem")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}
