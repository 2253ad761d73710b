// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ordered, lossless queue of backup envelopes awaiting the DA node.
//!
//! Delivery is pull-based with one envelope in flight: the next envelope is
//! only handed out after the DA node acknowledged the previous one. If the DA
//! node goes away before acknowledging, the in-flight envelope returns to the
//! front of the queue.

use std::collections::VecDeque;

use crate::models::BackupEnvelope;
use crate::protocol::ConnId;

/// Single-owner attachment slot for the DA node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DaSlot(Option<ConnId>);

impl DaSlot {
    /// Claim the slot for `conn` if it is free.
    ///
    /// Returns `false` when another connection holds the slot. Re-attaching
    /// the current holder is also refused.
    pub fn try_attach(&mut self, conn: ConnId) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(conn);
        true
    }

    /// Free the slot if `conn` holds it.
    pub fn release(&mut self, conn: ConnId) -> bool {
        if self.0 == Some(conn) {
            self.0 = None;
            return true;
        }
        false
    }

    pub fn holder(&self) -> Option<ConnId> {
        self.0
    }

    pub fn is_held_by(&self, conn: ConnId) -> bool {
        self.0 == Some(conn)
    }
}

#[derive(Debug, Default)]
pub struct BackupQueue {
    pending: VecDeque<BackupEnvelope>,
    in_flight: Option<BackupEnvelope>,
    slot: DaSlot,
}

impl BackupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an envelope. Never fails.
    pub fn enqueue(&mut self, envelope: BackupEnvelope) {
        self.pending.push_back(envelope);
    }

    pub fn try_attach(&mut self, conn: ConnId) -> bool {
        self.slot.try_attach(conn)
    }

    /// Detach `conn` if it is the DA node.
    ///
    /// An unacknowledged envelope goes back to the front of the queue.
    pub fn detach(&mut self, conn: ConnId) -> bool {
        if !self.slot.release(conn) {
            return false;
        }
        if let Some(envelope) = self.in_flight.take() {
            self.pending.push_front(envelope);
        }
        true
    }

    pub fn attached(&self) -> Option<ConnId> {
        self.slot.holder()
    }

    pub fn is_attached(&self, conn: ConnId) -> bool {
        self.slot.is_held_by(conn)
    }

    /// Pop the next envelope for delivery.
    ///
    /// Returns the DA connection and the envelope, or `None` when no DA node
    /// is attached, an envelope is still unacknowledged, or nothing is queued.
    pub fn drain_one(&mut self) -> Option<(ConnId, BackupEnvelope)> {
        let conn = self.slot.holder()?;
        if self.in_flight.is_some() {
            return None;
        }
        let envelope = self.pending.pop_front()?;
        self.in_flight = Some(envelope.clone());
        Some((conn, envelope))
    }

    /// The DA node confirmed persistence of the in-flight envelope.
    ///
    /// Returns `false` for an acknowledgement nothing was waiting for.
    pub fn acknowledge(&mut self, conn: ConnId) -> bool {
        if !self.slot.is_held_by(conn) {
            return false;
        }
        self.in_flight.take().is_some()
    }

    /// Envelopes not yet acknowledged, including the in-flight one.
    pub fn depth(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(tag: &str) -> BackupEnvelope {
        BackupEnvelope {
            owner_symbol: None,
            owner_address: None,
            ciphertext: tag.to_string(),
            iv: "00".repeat(12),
            tag: "00".repeat(16),
        }
    }

    #[test]
    fn only_one_da_node_may_attach() {
        let mut queue = BackupQueue::new();
        let first = ConnId::new();
        let second = ConnId::new();

        assert!(queue.try_attach(first));
        assert!(!queue.try_attach(second));
        assert!(!queue.try_attach(first));
        assert_eq!(queue.attached(), Some(first));

        assert!(!queue.detach(second));
        assert!(queue.detach(first));
        assert!(queue.try_attach(second));
    }

    #[test]
    fn nothing_drains_without_a_da_node() {
        let mut queue = BackupQueue::new();
        queue.enqueue(envelope("a"));

        assert!(queue.drain_one().is_none());
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn delivery_is_ordered_with_one_in_flight() {
        let mut queue = BackupQueue::new();
        let da = ConnId::new();
        queue.enqueue(envelope("a"));
        queue.enqueue(envelope("b"));
        queue.try_attach(da);

        let (to, first) = queue.drain_one().unwrap();
        assert_eq!(to, da);
        assert_eq!(first.ciphertext, "a");
        assert!(queue.drain_one().is_none(), "second envelope must wait for ack");

        assert!(queue.acknowledge(da));
        let (_, second) = queue.drain_one().unwrap();
        assert_eq!(second.ciphertext, "b");

        assert!(queue.acknowledge(da));
        assert!(queue.is_empty());
        assert!(!queue.acknowledge(da));
    }

    #[test]
    fn detaching_requeues_unacknowledged_envelope_at_front() {
        let mut queue = BackupQueue::new();
        let da = ConnId::new();
        queue.enqueue(envelope("a"));
        queue.enqueue(envelope("b"));
        queue.try_attach(da);
        queue.drain_one().unwrap();

        queue.detach(da);
        assert_eq!(queue.depth(), 2);

        let next_da = ConnId::new();
        queue.try_attach(next_da);
        let (_, redelivered) = queue.drain_one().unwrap();
        assert_eq!(redelivered.ciphertext, "a");
    }

    #[test]
    fn acknowledgement_from_a_stranger_is_ignored() {
        let mut queue = BackupQueue::new();
        let da = ConnId::new();
        queue.enqueue(envelope("a"));
        queue.try_attach(da);
        queue.drain_one().unwrap();

        assert!(!queue.acknowledge(ConnId::new()));
        assert_eq!(queue.depth(), 1);
    }
}
