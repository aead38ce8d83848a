use async_trait::async_trait;
use ethers_core::types::{BlockNumber, Filter, Log, H160, U256, U64};
use ethers_providers::{Http, Middleware, Provider};
use log::warn;
use std::sync::Arc;

use crate::error::{GnError, GnResult};
use crate::models::EventRecord;

pub const GNED_EVENT_SIGNATURE: &str = "GNed(address,uint256)";

/// Read-side capability every configured endpoint has to offer.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn block_number(&self) -> GnResult<u64>;

    /// `GNed` logs of the watched contract in `[from_block, to_block]`.
    async fn gned_events(&self, from_block: u64, to_block: u64) -> GnResult<Vec<EventRecord>>;
}

/// Builds a [`ChainRpc`] for an endpoint URL.
pub trait RpcConnector: Send + Sync {
    fn connect(&self, url: &str) -> GnResult<Arc<dyn ChainRpc>>;
}

pub struct EthereumClient {
    provider: Arc<Provider<Http>>,
    contract: H160,
    url: String,
}

impl EthereumClient {
    pub fn new(rpc_url: &str, contract: H160) -> GnResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| GnError::EndpointFailure {
            url: rpc_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            provider: Arc::new(provider),
            contract,
            url: rpc_url.to_string(),
        })
    }
}

#[async_trait]
impl ChainRpc for EthereumClient {
    async fn block_number(&self) -> GnResult<u64> {
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| GnError::EndpointFailure {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        Ok(block_number.as_u64())
    }

    async fn gned_events(&self, from_block: u64, to_block: u64) -> GnResult<Vec<EventRecord>> {
        let filter = Filter::new()
            .address(self.contract)
            .event(GNED_EVENT_SIGNATURE)
            .from_block(BlockNumber::Number(U64::from(from_block)))
            .to_block(BlockNumber::Number(U64::from(to_block)));

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| GnError::QueryFailure(e.to_string()))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_gned_log(log) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => warn!("Skipping log with unexpected shape in tx {:?}", log.transaction_hash),
                Err(e) => warn!("Skipping undecodable log: {}", e),
            }
        }

        Ok(events)
    }
}

/// Decodes `GNed(address indexed user, uint256 timestamp)`.
///
/// Returns `Ok(None)` for logs that do not have the event's shape.
pub fn decode_gned_log(log: &Log) -> GnResult<Option<EventRecord>> {
    if log.topics.len() != 2 || log.data.len() < 32 {
        return Ok(None);
    }

    let user = H160::from(log.topics[1]);
    let timestamp = U256::from_big_endian(&log.data[..32]);
    if timestamp > U256::from(u64::MAX) {
        return Err(GnError::QueryFailure(format!(
            "timestamp {} out of range",
            timestamp
        )));
    }

    let block_number = log
        .block_number
        .ok_or_else(|| GnError::QueryFailure("missing block number".to_string()))?
        .as_u64();

    Ok(Some(EventRecord::from_h160(user, timestamp.as_u64(), block_number)))
}

/// Connects over plain HTTP JSON-RPC.
pub struct HttpConnector {
    contract: H160,
}

impl HttpConnector {
    pub fn new(contract: H160) -> Self {
        Self { contract }
    }
}

impl RpcConnector for HttpConnector {
    fn connect(&self, url: &str) -> GnResult<Arc<dyn ChainRpc>> {
        let client = EthereumClient::new(url, self.contract)?;
        Ok(Arc::new(client))
    }
}
