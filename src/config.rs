use anyhow::{bail, Context, Result};
use ethers_core::types::H160;
use serde::Deserialize;
use std::time::Duration;

use crate::models::DispatchMode;

const DEFAULT_CONTRACT_ADDRESS: &str = "0xEdF7dE119Fe7c0d2c0252a2e47E0c7FBc3FE1D4a";
pub const MAX_LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    #[serde(default = "default_window_blocks")]
    pub window_blocks: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_dispatch_mode")]
    pub dispatch_mode: DispatchMode,
    #[serde(default = "default_submit_retries")]
    pub submit_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_status_log_capacity")]
    pub status_log_capacity: usize,
    /// Set when the deployed contract exposes `turboGN()`.
    #[serde(default)]
    pub turbo_onchain: bool,
    #[serde(default)]
    pub private_key: Option<String>,
}

fn default_rpc_urls() -> Vec<String> {
    vec!["http://127.0.0.1:8545".to_string()]
}

fn default_contract_address() -> String {
    DEFAULT_CONTRACT_ADDRESS.to_string()
}

fn default_window_blocks() -> u64 {
    50_000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_probe_retries() -> u32 {
    2
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_leaderboard_size() -> usize {
    10
}

fn default_batch_size() -> usize {
    20
}

fn default_dispatch_mode() -> DispatchMode {
    DispatchMode::Sequential
}

fn default_submit_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_confirmations() -> usize {
    1
}

fn default_status_log_capacity() -> usize {
    200
}

impl Config {
    /// Defaults, then an optional `gn-watch.toml`, then `GN_*` environment
    /// variables (`.env` is read first).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name("gn-watch").required(false))
            .add_source(
                ::config::Environment::with_prefix("GN")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("rpc_urls"),
            )
            .build()
            .context("failed to read configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_urls.iter().all(|url| url.trim().is_empty()) {
            bail!("at least one RPC endpoint must be configured");
        }
        self.contract()?;
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.query_timeout_ms == 0 {
            bail!("query_timeout_ms must be greater than zero");
        }
        if !(1..=MAX_LEADERBOARD_SIZE).contains(&self.leaderboard_size) {
            bail!(
                "leaderboard_size must be between 1 and {}, got {}",
                MAX_LEADERBOARD_SIZE,
                self.leaderboard_size
            );
        }
        if self.probe_retries == 0 || self.submit_retries == 0 {
            bail!("retry budgets must allow at least one attempt");
        }
        if self.status_log_capacity == 0 {
            bail!("status_log_capacity must be greater than zero");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        Ok(())
    }

    pub fn contract(&self) -> Result<H160> {
        self.contract_address
            .parse()
            .with_context(|| format!("invalid contract address {}", self.contract_address))
    }

    pub fn endpoint_urls(&self) -> Vec<String> {
        self.rpc_urls
            .iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_urls: default_rpc_urls(),
            contract_address: default_contract_address(),
            window_blocks: default_window_blocks(),
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_retries: default_probe_retries(),
            query_timeout_ms: default_query_timeout_ms(),
            leaderboard_size: default_leaderboard_size(),
            batch_size: default_batch_size(),
            dispatch_mode: default_dispatch_mode(),
            submit_retries: default_submit_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmations: default_confirmations(),
            status_log_capacity: default_status_log_capacity(),
            turbo_onchain: false,
            private_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.window_blocks, 50_000);
    }

    #[test]
    fn test_rejects_bad_contract_address() {
        let config = Config {
            contract_address: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_endpoint_list() {
        let config = Config {
            rpc_urls: vec!["  ".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_leaderboard_size_bounds() {
        for size in [0, 11, 50] {
            let config = Config {
                leaderboard_size: size,
                ..Config::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("leaderboard_size"));
        }
        for size in [1, 10] {
            let config = Config {
                leaderboard_size: size,
                ..Config::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_rejects_zero_query_timeout() {
        let config = Config {
            query_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(Config::default().query_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_endpoint_urls_are_trimmed() {
        let config = Config {
            rpc_urls: vec![" https://a.example ".to_string(), "".to_string()],
            ..Config::default()
        };
        assert_eq!(config.endpoint_urls(), vec!["https://a.example".to_string()]);
    }
}
