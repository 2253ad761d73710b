// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Game contract bindings.

use alloy::{rpc::types::Log, sol, sol_types::SolEvent};

use super::types::LedgerEvent;

// Only the reads and events the enclave consumes.
sol! {
    #[sol(rpc)]
    interface IFogGame {
        event TileCommitted(bytes32 tileHash);
        event MoveFinalized(bytes32 fromHash, bytes32 toHash);
        event SpawnAttemptResolved(address player, bool success);

        function getSpawnCommitment(address player) external view returns (uint256);
        function getSpawnChallengeHash(address player) external view returns (bytes32);
    }
}

/// Decode a game contract log into a [`LedgerEvent`].
///
/// Returns `None` for logs of events the enclave does not follow.
pub fn decode_log(log: &Log) -> Option<LedgerEvent> {
    let topic = log.topic0()?;

    let event = if *topic == IFogGame::TileCommitted::SIGNATURE_HASH {
        let decoded = log.log_decode::<IFogGame::TileCommitted>().ok()?;
        LedgerEvent::TileCommitted {
            hash: decoded.inner.data.tileHash,
        }
    } else if *topic == IFogGame::MoveFinalized::SIGNATURE_HASH {
        let decoded = log.log_decode::<IFogGame::MoveFinalized>().ok()?;
        LedgerEvent::MoveFinalized {
            from_hash: decoded.inner.data.fromHash,
            to_hash: decoded.inner.data.toHash,
        }
    } else if *topic == IFogGame::SpawnAttemptResolved::SIGNATURE_HASH {
        let decoded = log.log_decode::<IFogGame::SpawnAttemptResolved>().ok()?;
        LedgerEvent::SpawnAttemptResolved {
            player: decoded.inner.data.player.into(),
            success: decoded.inner.data.success,
        }
    } else {
        return None;
    };

    Some(event)
}
