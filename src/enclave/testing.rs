// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for enclave tests.

use alloy::signers::{local::PrivateKeySigner, SignerSync};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use tokio::sync::mpsc;

use super::SessionDirectory;
use crate::models::{Location, Player, PlayerAddress, Terrain, Tile};
use crate::protocol::{ConnId, ServerMessage};

/// A player with a real key, so it can pass login.
pub struct Actor {
    pub signer: PrivateKeySigner,
    pub player: Player,
}

impl Actor {
    pub fn new(symbol: &str) -> Self {
        let signer = PrivateKeySigner::from_signing_key(SigningKey::random(&mut OsRng));
        let player = Player {
            symbol: symbol.to_string(),
            address: PlayerAddress(signer.address()),
        };
        Self { signer, player }
    }

    pub fn address(&self) -> PlayerAddress {
        self.player.address
    }

    /// Login signature over the nonce of `conn`.
    pub fn sign_nonce(&self, conn: ConnId) -> String {
        let signature = self
            .signer
            .sign_message_sync(conn.to_string().as_bytes())
            .unwrap();
        alloy::hex::encode_prefixed(signature.as_bytes())
    }

    pub fn tile(&self, row: u32, col: u32, city_id: u32, terrain: Terrain) -> Tile {
        Tile {
            location: Location::new(row, col),
            owner: Some(self.player.clone()),
            resources: 4,
            city_id,
            terrain,
        }
    }
}

pub fn open(sessions: &mut SessionDirectory) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
    let conn = ConnId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    sessions.connect(conn, tx);
    (conn, rx)
}

/// Open a connection for `actor` and log it in.
pub fn log_in(
    sessions: &mut SessionDirectory,
    actor: &Actor,
) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
    let (conn, rx) = open(sessions);
    sessions
        .complete_login(conn, actor.address(), &actor.sign_nonce(conn))
        .unwrap();
    (conn, rx)
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

/// Locations of every `updateDisplay` in `messages`, merged.
pub fn refreshed(messages: &[ServerMessage]) -> Vec<Location> {
    let mut out: Vec<Location> = messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::UpdateDisplay { locations } => Some(locations.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    out.sort();
    out.dedup();
    out
}
