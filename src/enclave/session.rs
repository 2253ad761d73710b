// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Live connections and their bound player addresses.
//!
//! The mapping is bijective: a connection binds at most one address and an
//! address is bound to at most one live connection.

use std::collections::HashMap;

use super::Outbound;
use crate::blockchain::signing::recover_signer;
use crate::error::{EnclaveError, EnclaveResult};
use crate::models::PlayerAddress;
use crate::protocol::{ConnId, ServerMessage};

#[derive(Debug)]
struct Session {
    outbound: Outbound,
    address: Option<PlayerAddress>,
}

#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: HashMap<ConnId, Session>,
    by_address: HashMap<PlayerAddress, ConnId>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, unbound connection.
    pub fn connect(&mut self, conn: ConnId, outbound: Outbound) {
        self.sessions.insert(
            conn,
            Session {
                outbound,
                address: None,
            },
        );
    }

    pub fn is_connected(&self, conn: ConnId) -> bool {
        self.sessions.contains_key(&conn)
    }

    /// Login nonce for `conn`. The connection id doubles as the nonce.
    pub fn bind_challenge(&self, conn: ConnId) -> Option<String> {
        self.sessions.get(&conn).map(|_| conn.to_string())
    }

    /// Bind `address` to `conn` after checking the signature over the nonce.
    pub fn complete_login(
        &mut self,
        conn: ConnId,
        address: PlayerAddress,
        signature: &str,
    ) -> EnclaveResult<()> {
        let nonce = self
            .bind_challenge(conn)
            .ok_or_else(|| EnclaveError::Auth(format!("unknown connection {conn}")))?;

        let recovered = recover_signer(nonce.as_bytes(), signature).map_err(EnclaveError::Auth)?;
        if recovered != address.as_address() {
            return Err(EnclaveError::Auth(format!(
                "signature recovers {recovered}, not {address}"
            )));
        }

        if let Some(bound) = self.resolve(conn) {
            return Err(EnclaveError::Auth(format!(
                "connection already logged in as {bound}"
            )));
        }
        if let Some(other) = self.by_address.get(&address) {
            return Err(EnclaveError::Auth(format!(
                "{address} is already logged in on connection {other}"
            )));
        }

        if let Some(session) = self.sessions.get_mut(&conn) {
            session.address = Some(address);
        }
        self.by_address.insert(address, conn);
        Ok(())
    }

    pub fn resolve(&self, conn: ConnId) -> Option<PlayerAddress> {
        self.sessions.get(&conn).and_then(|s| s.address)
    }

    pub fn connection_for(&self, address: &PlayerAddress) -> Option<ConnId> {
        self.by_address.get(address).copied()
    }

    /// Drop the address binding of `conn`. Idempotent.
    pub fn release(&mut self, conn: ConnId) -> Option<PlayerAddress> {
        let address = self.sessions.get_mut(&conn)?.address.take()?;
        if self.by_address.get(&address) == Some(&conn) {
            self.by_address.remove(&address);
        }
        Some(address)
    }

    /// Forget `conn` entirely, releasing its binding. Idempotent.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<PlayerAddress> {
        let released = self.release(conn);
        self.sessions.remove(&conn);
        released
    }

    /// Queue a message for `conn`. Returns `false` if it is gone.
    pub fn send(&self, conn: ConnId, message: ServerMessage) -> bool {
        match self.sessions.get(&conn) {
            Some(session) => session.outbound.send(message).is_ok(),
            None => false,
        }
    }

    /// Queue a message for whichever connection `address` is bound to.
    pub fn send_to_player(&self, address: &PlayerAddress, message: ServerMessage) -> bool {
        match self.connection_for(address) {
            Some(conn) => self.send(conn, message),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn logged_in(&self) -> usize {
        self.by_address.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;
    use tokio::sync::mpsc;

    fn player() -> PrivateKeySigner {
        PrivateKeySigner::from_signing_key(SigningKey::random(&mut OsRng))
    }

    fn sign(signer: &PrivateKeySigner, conn: ConnId) -> String {
        let sig = signer.sign_message_sync(conn.to_string().as_bytes()).unwrap();
        alloy::hex::encode_prefixed(sig.as_bytes())
    }

    fn connect(dir: &mut SessionDirectory) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn = ConnId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        dir.connect(conn, tx);
        (conn, rx)
    }

    #[test]
    fn login_binds_both_directions() {
        let mut dir = SessionDirectory::new();
        let (conn, _rx) = connect(&mut dir);
        let alice = player();
        let address = PlayerAddress(alice.address());

        dir.complete_login(conn, address, &sign(&alice, conn)).unwrap();

        assert_eq!(dir.resolve(conn), Some(address));
        assert_eq!(dir.connection_for(&address), Some(conn));
    }

    #[test]
    fn signature_over_another_nonce_is_rejected() {
        let mut dir = SessionDirectory::new();
        let (conn, _rx) = connect(&mut dir);
        let alice = player();

        let result = dir.complete_login(
            conn,
            PlayerAddress(alice.address()),
            &sign(&alice, ConnId::new()),
        );

        assert!(matches!(result, Err(EnclaveError::Auth(_))));
        assert_eq!(dir.resolve(conn), None);
    }

    #[test]
    fn second_live_login_for_same_address_is_rejected() {
        let mut dir = SessionDirectory::new();
        let (first, _rx1) = connect(&mut dir);
        let (second, _rx2) = connect(&mut dir);
        let alice = player();
        let address = PlayerAddress(alice.address());

        dir.complete_login(first, address, &sign(&alice, first)).unwrap();
        let result = dir.complete_login(second, address, &sign(&alice, second));

        assert!(matches!(result, Err(EnclaveError::Auth(_))));
        assert_eq!(dir.connection_for(&address), Some(first));
    }

    #[test]
    fn connection_cannot_log_in_twice() {
        let mut dir = SessionDirectory::new();
        let (conn, _rx) = connect(&mut dir);
        let alice = player();
        let bob = player();

        dir.complete_login(conn, PlayerAddress(alice.address()), &sign(&alice, conn))
            .unwrap();
        let result = dir.complete_login(conn, PlayerAddress(bob.address()), &sign(&bob, conn));

        assert!(matches!(result, Err(EnclaveError::Auth(_))));
    }

    #[test]
    fn release_frees_the_address_and_is_idempotent() {
        let mut dir = SessionDirectory::new();
        let (first, _rx1) = connect(&mut dir);
        let alice = player();
        let address = PlayerAddress(alice.address());
        dir.complete_login(first, address, &sign(&alice, first)).unwrap();

        assert_eq!(dir.disconnect(first), Some(address));
        assert_eq!(dir.disconnect(first), None);
        assert_eq!(dir.connection_for(&address), None);

        let (second, _rx2) = connect(&mut dir);
        dir.complete_login(second, address, &sign(&alice, second)).unwrap();
        assert_eq!(dir.logged_in(), 1);
    }

    #[test]
    fn messages_reach_the_bound_connection() {
        let mut dir = SessionDirectory::new();
        let (conn, mut rx) = connect(&mut dir);
        let alice = player();
        let address = PlayerAddress(alice.address());
        dir.complete_login(conn, address, &sign(&alice, conn)).unwrap();

        assert!(dir.send_to_player(&address, ServerMessage::TrySpawnAgain));
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::TrySpawnAgain);
        assert!(!dir.send_to_player(&PlayerAddress(player().address()), ServerMessage::TrySpawnAgain));
    }
}
