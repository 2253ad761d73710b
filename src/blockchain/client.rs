// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger client for the game contract.

use alloy::{
    eips::BlockNumberOrTag,
    network::Ethereum,
    primitives::{Address, B256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::Filter,
    sol_types::SolEvent,
};
use async_trait::async_trait;

use super::contract::{decode_log, IFogGame};
use super::types::*;
use crate::models::PlayerAddress;

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Ledger reads needed to endorse a spawn.
///
/// Implemented by [`LedgerClient`]; tests substitute an in-memory ledger.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Block height at which `player` committed a spawn secret, if any.
    async fn spawn_commitment(&self, player: PlayerAddress) -> Result<Option<u64>, LedgerError>;

    /// Hash of the spawn secret `player` committed.
    async fn spawn_challenge_hash(&self, player: PlayerAddress) -> Result<B256, LedgerError>;

    async fn block_hash(&self, height: u64) -> Result<B256, LedgerError>;
}

/// Client for the game contract.
pub struct LedgerClient {
    config: LedgerConfig,
    provider: HttpProvider,
    contract: IFogGame::IFogGameInstance<HttpProvider>,
}

impl LedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url);
        let contract = IFogGame::new(config.contract, provider.clone());

        Ok(Self {
            config,
            provider,
            contract,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.config.contract
    }

    /// Get the current block number.
    pub async fn block_number(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::RpcError(e.to_string()))
    }

    /// Game events in `[from_block, to_block]`, in log order.
    pub async fn events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let filter = Filter::new()
            .address(self.config.contract)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| LedgerError::RpcError(e.to_string()))?;

        Ok(logs.iter().filter_map(decode_log).collect())
    }

    /// Every tile hash committed between the deploy block and `head`.
    ///
    /// Used once at startup in recovery mode to bound trust in the DA node.
    pub async fn tile_commit_history(&self, head: u64) -> Result<Vec<B256>, LedgerError> {
        let mut hashes = Vec::new();
        let mut from = self.config.deploy_block;

        while from <= head {
            let to = (from + DEFAULT_LOG_CHUNK_SIZE - 1).min(head);
            let filter = Filter::new()
                .address(self.config.contract)
                .event_signature(IFogGame::TileCommitted::SIGNATURE_HASH)
                .from_block(from)
                .to_block(to);

            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| LedgerError::RpcError(e.to_string()))?;

            hashes.extend(logs.iter().filter_map(|log| match decode_log(log) {
                Some(LedgerEvent::TileCommitted { hash }) => Some(hash),
                _ => None,
            }));

            tracing::debug!(
                from_block = from,
                to_block = to,
                total = hashes.len(),
                "Loaded tile commitment history chunk"
            );
            from = to + 1;
        }

        Ok(hashes)
    }
}

#[async_trait]
impl LedgerReader for LedgerClient {
    async fn spawn_commitment(&self, player: PlayerAddress) -> Result<Option<u64>, LedgerError> {
        let height = self
            .contract
            .getSpawnCommitment(player.as_address())
            .call()
            .await
            .map_err(|e| LedgerError::ContractError(e.to_string()))?;

        if height.is_zero() {
            return Ok(None);
        }
        u64::try_from(height)
            .map(Some)
            .map_err(|_| LedgerError::OutOfRange(format!("spawn commitment height {height}")))
    }

    async fn spawn_challenge_hash(&self, player: PlayerAddress) -> Result<B256, LedgerError> {
        self.contract
            .getSpawnChallengeHash(player.as_address())
            .call()
            .await
            .map_err(|e| LedgerError::ContractError(e.to_string()))
    }

    async fn block_hash(&self, height: u64) -> Result<B256, LedgerError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height))
            .await
            .map_err(|e| LedgerError::RpcError(e.to_string()))?
            .ok_or(LedgerError::MissingBlock(height))?;

        Ok(block.header.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rpc_url: &str) -> LedgerConfig {
        LedgerConfig {
            rpc_url: rpc_url.to_string(),
            contract: Address::repeat_byte(0x10),
            deploy_block: 5,
        }
    }

    #[test]
    fn rejects_invalid_rpc_url() {
        let result = LedgerClient::new(config("not a url"));
        assert!(matches!(result, Err(LedgerError::InvalidRpcUrl(_))));
    }

    #[test]
    fn keeps_contract_configuration() {
        let client = LedgerClient::new(config("http://127.0.0.1:8545")).unwrap();
        assert_eq!(client.contract_address(), Address::repeat_byte(0x10));
    }
}
