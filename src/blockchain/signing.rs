// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave endorsement signatures.
//!
//! The enclave key lives in sealed storage as PKCS#8 PEM. Endorsements are
//! EIP-191 personal signatures over a keccak digest of the claim, so the
//! contract can verify them with `ecrecover` after prefixing.
//!
//! ```text
//! spawn: keccak256(abi.encode(player, previousHash, proposedHash))
//! move:  keccak256(abi.encode(prevFromHash, prevToHash, fromHash, toHash, height))
//! ```

use alloy::{
    primitives::{keccak256, Address, Signature, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolValue,
};
use k256::SecretKey;

use super::types::LedgerError;
use crate::models::PlayerAddress;

/// Parse a private key from PEM format to hex string.
///
/// Accepts SEC1 and PKCS#8 encodings.
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, LedgerError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid UTF-8: {e}")))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid PEM: {e}")))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid key format: {e}")))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

pub fn spawn_digest(player: PlayerAddress, previous_hash: B256, proposed_hash: B256) -> B256 {
    keccak256((player.as_address(), previous_hash, proposed_hash).abi_encode())
}

pub fn move_digest(
    previous_from: B256,
    previous_to: B256,
    from: B256,
    to: B256,
    height: u64,
) -> B256 {
    keccak256((previous_from, previous_to, from, to, U256::from(height)).abi_encode())
}

/// Recover the address that signed `message` (EIP-191) with a hex signature.
pub fn recover_signer(message: &[u8], signature_hex: &str) -> Result<Address, String> {
    let raw = alloy::hex::decode(signature_hex).map_err(|e| format!("signature is not hex: {e}"))?;
    let signature = Signature::from_raw(&raw).map_err(|e| format!("malformed signature: {e}"))?;
    signature
        .recover_address_from_msg(message)
        .map_err(|e| format!("signature recovery failed: {e}"))
}

/// The enclave's endorsement key.
#[derive(Clone)]
pub struct EnclaveSigner {
    signer: PrivateKeySigner,
}

impl EnclaveSigner {
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, LedgerError> {
        let key_bytes = alloy::hex::decode(pem_to_hex(pem_bytes)?)
            .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))?;
        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Address the contract must have registered as the enclave signer.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn sign_spawn(
        &self,
        player: PlayerAddress,
        previous_hash: B256,
        proposed_hash: B256,
    ) -> Result<String, LedgerError> {
        self.sign_digest(spawn_digest(player, previous_hash, proposed_hash))
    }

    pub fn sign_move(
        &self,
        previous_from: B256,
        previous_to: B256,
        from: B256,
        to: B256,
        height: u64,
    ) -> Result<String, LedgerError> {
        self.sign_digest(move_digest(previous_from, previous_to, from, to, height))
    }

    fn sign_digest(&self, digest: B256) -> Result<String, LedgerError> {
        let signature = self
            .signer
            .sign_message_sync(digest.as_slice())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        Ok(alloy::hex::encode_prefixed(signature.as_bytes()))
    }
}

impl std::fmt::Debug for EnclaveSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnclaveSigner")
            .field("address", &self.address())
            .finish()
    }
}
