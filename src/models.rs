use chrono::{DateTime, Utc};
use ethers_core::types::{H160, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::GnError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub url: String,
    pub last_known_healthy: bool,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            last_known_healthy: false,
        }
    }
}

/// One decoded `GNed` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub address: String,
    pub timestamp_seconds: u64,
    pub block_number: u64,
}

impl EventRecord {
    pub fn new(address: &str, timestamp_seconds: u64, block_number: u64) -> Self {
        Self {
            address: normalize_address(address),
            timestamp_seconds,
            block_number,
        }
    }

    pub fn from_h160(address: H160, timestamp_seconds: u64, block_number: u64) -> Self {
        Self {
            address: format!("0x{}", hex::encode(address.as_bytes())),
            timestamp_seconds,
            block_number,
        }
    }
}

/// Canonical form used for every address comparison: trimmed, lower-case,
/// `0x`-prefixed.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub address: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateSnapshot {
    pub total_tx: u64,
    pub all_time_users: BTreeSet<String>,
    pub daily_active_users: BTreeSet<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub from_block: u64,
    pub to_block: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Parallel,
    Sequential,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Parallel => write!(f, "parallel"),
            DispatchMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// State-changing calls the contract exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    Gn,
    TurboGn,
}

impl ContractCall {
    pub fn signature(&self) -> &'static str {
        match self {
            ContractCall::Gn => "gn()",
            ContractCall::TurboGn => "turboGN()",
        }
    }

    /// Both calls are parameterless, so the calldata is just the selector.
    pub fn calldata(&self) -> Vec<u8> {
        ethers_core::utils::id(self.signature()).to_vec()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContractCall::Gn => "GN",
            ContractCall::TurboGn => "Turbo GN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Sent,
    Confirmed,
    Failed(GnError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionJob {
    pub index: usize,
    pub nonce: Option<u64>,
    pub status: JobStatus,
    pub attempts: u32,
    pub hash: Option<H256>,
}

impl TransactionJob {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            nonce: None,
            status: JobStatus::Pending,
            attempts: 0,
            hash: None,
        }
    }

    pub fn fail(&mut self, error: GnError) {
        self.status = JobStatus::Failed(error);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
