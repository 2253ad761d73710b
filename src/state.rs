// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::watch;

use crate::enclave::{EnclaveHandle, EnclaveStatus};
use crate::storage::EncryptedStorage;

/// Shared state of the HTTP and WebSocket handlers.
///
/// Handlers never touch game state directly; they forward frames to the
/// enclave inbox and read the latest published status.
#[derive(Clone)]
pub struct AppState {
    pub enclave: EnclaveHandle,
    pub status: watch::Receiver<EnclaveStatus>,
    pub storage: Arc<EncryptedStorage>,
}

impl AppState {
    pub fn new(
        enclave: EnclaveHandle,
        status: watch::Receiver<EnclaveStatus>,
        storage: Arc<EncryptedStorage>,
    ) -> Self {
        Self {
            enclave,
            status,
            storage,
        }
    }

    pub fn status(&self) -> EnclaveStatus {
        self.status.borrow().clone()
    }
}
