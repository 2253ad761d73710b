// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into an [`EnclaveConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for sealed storage | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RPC_URL` | JSON-RPC endpoint of the game ledger | Required |
//! | `GAME_CONTRACT_ADDRESS` | Address of the game contract | Required |
//! | `GAME_DEPLOY_BLOCK` | Block the contract was deployed at | `0` |
//! | `BOARD_SIZE` | Side length of the square board | `32` |
//! | `FOG_RADIUS` | Visibility radius around owned tiles | `1` |
//! | `MAX_MOVE_LIFESPAN` | Blocks a move claim may stay unfinalized | `10` |
//! | `SPAWN_RESOURCES` | Resources on a freshly spawned capital | `9` |
//! | `TERRAIN_SEED` | Seed of the initial terrain | `0` |
//! | `RECOVERY_MODE` | Rebuild the board from the DA node | `false` |
//! | `LEDGER_POLL_INTERVAL_MS` | Ledger polling interval | `2000` |
//! | `TLS_CERT_PATH` | PEM certificate chain | Unset (plain HTTP) |
//! | `TLS_KEY_PATH` | PEM private key | Unset (plain HTTP) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::blockchain::LedgerConfig;
use crate::enclave::EnclaveSettings;

/// Environment variable name for the sealed data directory path.
///
/// The data directory is mounted as Gramine's encrypted filesystem in the
/// manifest. The backup key, the enclave signing key and audit logs are
/// stored here.
///
/// # Default
/// `/data` (set in Gramine manifest as encrypted mount point)
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const CONTRACT_ADDRESS_ENV: &str = "GAME_CONTRACT_ADDRESS";
pub const DEPLOY_BLOCK_ENV: &str = "GAME_DEPLOY_BLOCK";
pub const BOARD_SIZE_ENV: &str = "BOARD_SIZE";
pub const FOG_RADIUS_ENV: &str = "FOG_RADIUS";
pub const MAX_MOVE_LIFESPAN_ENV: &str = "MAX_MOVE_LIFESPAN";
pub const SPAWN_RESOURCES_ENV: &str = "SPAWN_RESOURCES";
pub const TERRAIN_SEED_ENV: &str = "TERRAIN_SEED";

/// Set to `true` after a restart whose board must be rebuilt from backups.
///
/// In recovery mode the backup key is loaded from sealed storage instead of
/// generated, and live sessions are refused until the DA node reports
/// `recoveryFinished`.
pub const RECOVERY_MODE_ENV: &str = "RECOVERY_MODE";

pub const POLL_INTERVAL_ENV: &str = "LEDGER_POLL_INTERVAL_MS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// PEM files for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EnclaveConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub ledger: LedgerConfig,
    pub board_size: u32,
    pub fog_radius: u32,
    pub terrain_seed: u64,
    pub settings: EnclaveSettings,
    pub recovery_mode: bool,
    pub poll_interval: Duration,
    pub tls: Option<TlsPaths>,
}

impl EnclaveConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());

        let host = var(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&var, PORT_ENV, 8080)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: HOST_ENV,
                reason: e.to_string(),
            })?;

        let rpc_url = var(RPC_URL_ENV).ok_or(ConfigError::Missing(RPC_URL_ENV))?;
        url::Url::parse(&rpc_url).map_err(|e| ConfigError::Invalid {
            name: RPC_URL_ENV,
            reason: e.to_string(),
        })?;
        let contract: Address = parse_required(&var, CONTRACT_ADDRESS_ENV)?;

        let board_size: u32 = parse_or(&var, BOARD_SIZE_ENV, 32)?;
        if board_size == 0 {
            return Err(ConfigError::Invalid {
                name: BOARD_SIZE_ENV,
                reason: "board must have at least one tile".to_string(),
            });
        }

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV)),
        };

        Ok(Self {
            data_dir: var(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            bind_addr,
            ledger: LedgerConfig {
                rpc_url,
                contract,
                deploy_block: parse_or(&var, DEPLOY_BLOCK_ENV, 0)?,
            },
            board_size,
            fog_radius: parse_or(&var, FOG_RADIUS_ENV, 1)?,
            terrain_seed: parse_or(&var, TERRAIN_SEED_ENV, 0)?,
            settings: EnclaveSettings {
                max_move_lifespan: parse_or(&var, MAX_MOVE_LIFESPAN_ENV, 10)?,
                spawn_resources: parse_or(&var, SPAWN_RESOURCES_ENV, 9)?,
            },
            recovery_mode: parse_or(&var, RECOVERY_MODE_ENV, false)?,
            poll_interval: Duration::from_millis(parse_or(&var, POLL_INTERVAL_ENV, 2000)?),
            tls,
        })
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&'static str) -> Option<String>,
{
    match var(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_required<T, F>(var: &F, name: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&'static str) -> Option<String>,
{
    let raw = var(name).ok_or(ConfigError::Missing(name))?;
    parse_value(name, &raw)
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
