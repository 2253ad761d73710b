// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tile encryption gateway for DA backups.
//!
//! **Envelope format** (all fields hex-encoded):
//! ```text
//! iv:         12-byte random nonce, unique per envelope
//! ciphertext: AES-256-GCM(JSON(tile)) without the tag
//! tag:        16-byte authentication tag
//! ```
//!
//! The owner symbol and address travel in plaintext next to the ciphertext
//! so the DA node can index backups without learning the tile.

use aes_gcm::{
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce, Tag,
};

use crate::error::{EnclaveError, EnclaveResult};
use crate::models::{BackupEnvelope, Tile};
use crate::storage::BACKUP_KEY_LEN;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts tiles into [`BackupEnvelope`]s and back.
#[derive(Clone)]
pub struct TileCipher {
    cipher: Aes256Gcm,
}

impl TileCipher {
    pub fn new(key: &[u8; BACKUP_KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Fresh random backup key.
    pub fn generate_key() -> [u8; BACKUP_KEY_LEN] {
        let generated = Aes256Gcm::generate_key(&mut OsRng);
        let mut key = [0u8; BACKUP_KEY_LEN];
        key.copy_from_slice(&generated);
        key
    }

    pub fn encrypt(&self, tile: &Tile) -> EnclaveResult<BackupEnvelope> {
        let mut buffer = serde_json::to_vec(tile)
            .map_err(|e| EnclaveError::Crypto(format!("tile serialization failed: {e}")))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|e| EnclaveError::Crypto(format!("AES-GCM encryption failed: {e}")))?;

        Ok(BackupEnvelope {
            owner_symbol: tile.owner.as_ref().map(|p| p.symbol.clone()),
            owner_address: tile.owner_address(),
            ciphertext: alloy::hex::encode(&buffer),
            iv: alloy::hex::encode(nonce),
            tag: alloy::hex::encode(tag),
        })
    }

    /// Decrypt and authenticate an envelope.
    ///
    /// Fails on a wrong key, a tampered field, or a plaintext that is not a tile.
    pub fn decrypt(&self, envelope: &BackupEnvelope) -> EnclaveResult<Tile> {
        let iv = decode_field("iv", &envelope.iv, Some(NONCE_LEN))?;
        let tag = decode_field("tag", &envelope.tag, Some(TAG_LEN))?;
        let mut buffer = decode_field("ciphertext", &envelope.ciphertext, None)?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| {
                EnclaveError::Crypto(
                    "AES-GCM authentication failed (wrong key or corrupted envelope)".to_string(),
                )
            })?;

        serde_json::from_slice(&buffer)
            .map_err(|e| EnclaveError::Crypto(format!("decrypted payload is not a tile: {e}")))
    }
}

fn decode_field(name: &str, value: &str, expected_len: Option<usize>) -> EnclaveResult<Vec<u8>> {
    let bytes = alloy::hex::decode(value)
        .map_err(|e| EnclaveError::Crypto(format!("envelope {name} is not hex: {e}")))?;
    if let Some(len) = expected_len {
        if bytes.len() != len {
            return Err(EnclaveError::Crypto(format!(
                "envelope {name} has {} bytes, expected {len}",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}
