// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistence of the enclave's two secrets.
//!
//! - The **backup key** is the only secret protecting DA backups. It is
//!   regenerated at every normal start and loaded (never regenerated) when
//!   starting in recovery mode.
//! - The **endorsement key** signs spawn and move claims. It is created once
//!   and reused so the ledger-side signer registration survives restarts.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use k256::pkcs8::{EncodePrivateKey, LineEnding};
use sha2::{Digest, Sha256};

use super::{EncryptedStorage, StorageError};

/// Length of the AES-256 backup key.
pub const BACKUP_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("backup key has {0} bytes, expected {BACKUP_KEY_LEN}")]
    InvalidKeyLength(usize),

    #[error("backup key missing; cannot recover without the key used for the backups")]
    MissingBackupKey,

    #[error("key encoding failed: {0}")]
    Encoding(String),
}

/// Repository for sealed key material.
pub struct KeyStore<'a> {
    storage: &'a EncryptedStorage,
}

impl<'a> KeyStore<'a> {
    pub fn new(storage: &'a EncryptedStorage) -> Self {
        Self { storage }
    }

    /// Persist a freshly generated backup key, replacing any previous one.
    pub fn store_backup_key(&self, key: &[u8; BACKUP_KEY_LEN]) -> Result<(), KeyStoreError> {
        self.storage
            .write_raw(self.storage.paths().backup_key(), key)?;
        Ok(())
    }

    /// Load the backup key written by a previous run.
    pub fn load_backup_key(&self) -> Result<[u8; BACKUP_KEY_LEN], KeyStoreError> {
        let bytes = match self.storage.read_raw(self.storage.paths().backup_key()) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Err(KeyStoreError::MissingBackupKey),
            Err(e) => return Err(e.into()),
        };

        <[u8; BACKUP_KEY_LEN]>::try_from(bytes.as_slice())
            .map_err(|_| KeyStoreError::InvalidKeyLength(bytes.len()))
    }

    /// Return the endorsement key PEM, generating it on first use.
    pub fn load_or_create_enclave_key(&self) -> Result<String, KeyStoreError> {
        let path = self.storage.paths().enclave_key();
        if self.storage.exists(&path) {
            let bytes = self.storage.read_raw(&path)?;
            return String::from_utf8(bytes).map_err(|e| KeyStoreError::Encoding(e.to_string()));
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;

        self.storage.create_raw(&path, pem.as_bytes())?;
        tracing::info!("Generated new enclave endorsement key");
        Ok(pem.to_string())
    }
}

/// Short non-reversible identifier of a key, safe to log.
pub fn key_fingerprint(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    alloy::hex::encode(&digest[..8])
}
