// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Connection Protocol
//!
//! JSON messages exchanged over the `/ws` WebSocket. Every frame is
//! `{"event": "<name>", "data": { ... }}`; events without payload omit
//! `data`.
//!
//! ## Player messages
//!
//! | Client → enclave | Enclave → client |
//! |------------------|------------------|
//! | `login` | `loginResponse` or `disconnect` |
//! | `getSpawnSignature` | `spawnSignatureResponse` or `trySpawnAgain` |
//! | `getMoveSignature` | `moveSignatureResponse` or `disconnect` |
//! | `decrypt` | `decryptResponse` |
//!
//! The enclave also pushes `challenge` on connect, `updateDisplay` after
//! finalizations and `error` for rejected requests.
//!
//! ## DA node messages
//!
//! | DA → enclave | Enclave → DA |
//! |--------------|--------------|
//! | `handshakeDA` | `handshakeDAResponse` |
//! | `sendRecoveredTileResponse` | `sendRecoveredTile` (next index) |
//! | `saveToDatabaseResponse` | `saveToDatabase` (next envelope) |
//! | `recoveryFinished` | |

use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnclaveError;
use crate::models::{BackupEnvelope, Location, MaskedTile, PlayerAddress, Tile};

/// Identity of one live connection. Its string form is the login nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(pub Uuid);

impl ConnId {
    pub fn new() -> Self {
        ConnId(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    Login {
        address: PlayerAddress,
        /// EIP-191 signature over the challenge nonce.
        signature: String,
    },
    GetSpawnSignature {
        symbol: String,
        address: PlayerAddress,
        signature: String,
        /// Secret whose hash the player committed on the ledger.
        secret: U256,
    },
    GetMoveSignature {
        from_tile: Tile,
        to_tile: Tile,
    },
    Decrypt {
        location: Location,
    },
    #[serde(rename = "handshakeDA")]
    HandshakeDa,
    SendRecoveredTileResponse {
        envelope: BackupEnvelope,
    },
    SaveToDatabaseResponse,
    RecoveryFinished,
}

impl ClientMessage {
    /// Messages only the attached DA node may send.
    pub fn is_da_message(&self) -> bool {
        matches!(
            self,
            ClientMessage::HandshakeDa
                | ClientMessage::SendRecoveredTileResponse { .. }
                | ClientMessage::SaveToDatabaseResponse
                | ClientMessage::RecoveryFinished
        )
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Login { .. } => "login",
            ClientMessage::GetSpawnSignature { .. } => "getSpawnSignature",
            ClientMessage::GetMoveSignature { .. } => "getMoveSignature",
            ClientMessage::Decrypt { .. } => "decrypt",
            ClientMessage::HandshakeDa => "handshakeDA",
            ClientMessage::SendRecoveredTileResponse { .. } => "sendRecoveredTileResponse",
            ClientMessage::SaveToDatabaseResponse => "saveToDatabaseResponse",
            ClientMessage::RecoveryFinished => "recoveryFinished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Challenge {
        nonce: String,
    },
    LoginResponse {
        locations: Vec<Location>,
    },
    SpawnSignatureResponse {
        signature: String,
        previous_tile: Tile,
        proposed_tile: Tile,
    },
    TrySpawnAgain,
    MoveSignatureResponse {
        signature: String,
        height: u64,
    },
    DecryptResponse {
        tile: MaskedTile,
    },
    UpdateDisplay {
        locations: Vec<Location>,
    },
    Error {
        code: String,
        message: String,
    },
    Disconnect {
        reason: String,
    },
    #[serde(rename = "handshakeDAResponse")]
    HandshakeDaResponse {
        recovery_mode: bool,
    },
    SaveToDatabase {
        envelope: BackupEnvelope,
    },
    SendRecoveredTile {
        index: u64,
    },
}

impl ServerMessage {
    pub fn error(err: &EnclaveError) -> Self {
        ServerMessage::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the transport must close the socket after sending this.
    pub fn closes_connection(&self) -> bool {
        matches!(self, ServerMessage::Disconnect { .. })
    }
}
