// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Watcher
//!
//! Background task that follows the game contract and feeds its events into
//! the enclave inbox.
//!
//! ## Strategy
//!
//! Polls `eth_getLogs` from an in-memory checkpoint to the chain head in
//! chunks of at most [`DEFAULT_LOG_CHUNK_SIZE`] blocks. Events of a chunk are
//! delivered in log order, followed by a [`LedgerEvent::NewBlock`] tick for
//! the chunk's last block, which drives rate limiting and claim expiry.
//!
//! The checkpoint is not persisted: after a restart the board is either
//! fresh or rebuilt from the DA node, and only events from then on matter.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::client::LedgerClient;
use super::types::{LedgerError, LedgerEvent, DEFAULT_LOG_CHUNK_SIZE};
use crate::enclave::{EnclaveHandle, Inbound};

/// Split `[from, to]` into consecutive inclusive ranges of at most `chunk` blocks.
pub fn chunk_ranges(from: u64, to: u64, chunk: u64) -> Vec<(u64, u64)> {
    let chunk = chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(chunk - 1).min(to);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

pub struct LedgerWatcher {
    client: Arc<LedgerClient>,
    enclave: EnclaveHandle,
    poll_interval: Duration,
    chunk_size: u64,
    next_block: u64,
}

impl LedgerWatcher {
    /// Watch from `start_block` onwards.
    pub fn new(
        client: Arc<LedgerClient>,
        enclave: EnclaveHandle,
        start_block: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            enclave,
            poll_interval,
            chunk_size: DEFAULT_LOG_CHUNK_SIZE,
            next_block: start_block,
        }
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            contract = %self.client.contract_address(),
            start_block = self.next_block,
            "Ledger watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.poll_step().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("Enclave inbox closed, ledger watcher stopping");
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "Ledger poll failed, will retry"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Ledger watcher shutting down");
    }

    /// Deliver everything from the checkpoint to head.
    ///
    /// Returns `Ok(false)` once the enclave no longer accepts events.
    async fn poll_step(&mut self) -> Result<bool, LedgerError> {
        let head = self.client.block_number().await?;
        if self.next_block > head {
            return Ok(true);
        }

        for (from, to) in chunk_ranges(self.next_block, head, self.chunk_size) {
            let events = self.client.events_in_range(from, to).await?;
            if !events.is_empty() {
                tracing::debug!(
                    from_block = from,
                    to_block = to,
                    events = events.len(),
                    "Delivering ledger events"
                );
            }

            for event in events.into_iter().chain([LedgerEvent::NewBlock { height: to }]) {
                if !self.enclave.send(Inbound::Ledger(event)) {
                    return Ok(false);
                }
            }
            self.next_block = to + 1;
        }

        Ok(true)
    }
}
