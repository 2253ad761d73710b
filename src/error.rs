// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave error taxonomy.
//!
//! Every error that can surface while handling a connection message or a
//! ledger event maps to one [`EnclaveError`] variant. The variant decides
//! whether the offending connection is terminated.

use crate::blockchain::LedgerError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    /// Bad or missing signature, double login, wrong spawn secret.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Duplicate claim or a proposal built on stale tile state.
    #[error("claim conflict: {0}")]
    ClaimConflict(String),

    /// Second move proposal from the same address within one block.
    #[error("rate limited: {address} already proposed at height {last_height} (current {height})")]
    RateLimited {
        address: String,
        last_height: u64,
        height: u64,
    },

    /// Malformed or invalid request; the request is ignored.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A message the connection is never allowed to send.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Live session operations are refused while the board is rebuilt.
    #[error("enclave is in recovery mode")]
    Recovering,

    /// Ledger finalization without a matching local claim.
    #[error("reconciliation anomaly: {0}")]
    ReconciliationAnomaly(String),

    /// DA-supplied tile whose hash is absent from ledger history.
    #[error("recovered tile rejected: {0}")]
    RecoveryRejection(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EnclaveError {
    /// Stable machine-readable code sent to clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            EnclaveError::Auth(_) => "auth_error",
            EnclaveError::ClaimConflict(_) => "claim_conflict",
            EnclaveError::RateLimited { .. } => "rate_limited",
            EnclaveError::Protocol(_) => "protocol_error",
            EnclaveError::ProtocolViolation(_) => "protocol_violation",
            EnclaveError::Recovering => "recovering",
            EnclaveError::ReconciliationAnomaly(_) => "reconciliation_anomaly",
            EnclaveError::RecoveryRejection(_) => "recovery_rejection",
            EnclaveError::Ledger(_) => "ledger_error",
            EnclaveError::Crypto(_) => "crypto_error",
            EnclaveError::Storage(_) => "storage_error",
        }
    }

    /// Whether the connection that caused this error must be dropped.
    pub fn terminates_connection(&self) -> bool {
        matches!(
            self,
            EnclaveError::Auth(_)
                | EnclaveError::ClaimConflict(_)
                | EnclaveError::RateLimited { .. }
                | EnclaveError::ProtocolViolation(_)
        )
    }
}

pub type EnclaveResult<T> = Result<T, EnclaveError>;
