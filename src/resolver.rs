use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{GnError, GnResult};
use crate::ethereum::{ChainRpc, RpcConnector};
use crate::models::Endpoint;

/// An endpoint that answered its liveness probe, with the client that did.
#[derive(Clone)]
pub struct ResolvedEndpoint {
    pub endpoint: Endpoint,
    pub client: Arc<dyn ChainRpc>,
}

/// Failover selection over the configured endpoint list.
///
/// Endpoints are probed in list order; the first one whose chain-height query
/// succeeds within `probe_timeout` wins.
pub struct EndpointResolver {
    endpoints: Mutex<Vec<Endpoint>>,
    connector: Arc<dyn RpcConnector>,
    probe_timeout: Duration,
    max_retries: u32,
}

impl EndpointResolver {
    pub fn new(
        urls: Vec<String>,
        connector: Arc<dyn RpcConnector>,
        probe_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            endpoints: Mutex::new(urls.into_iter().map(Endpoint::new).collect()),
            connector,
            probe_timeout,
            max_retries: max_retries.max(1),
        }
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn resolve(&self) -> GnResult<ResolvedEndpoint> {
        let urls: Vec<String> = self.endpoints().into_iter().map(|e| e.url).collect();

        for (position, url) in urls.iter().enumerate() {
            match self.probe_with_retries(url).await {
                Ok(client) => {
                    let endpoint = self.mark(position, true);
                    debug!("Resolved RPC endpoint {}", url);
                    return Ok(ResolvedEndpoint { endpoint, client });
                }
                Err(e) => {
                    self.mark(position, false);
                    warn!("RPC failed: {}", e);
                }
            }
        }

        Err(GnError::AllEndpointsUnavailable {
            attempted: urls.len(),
        })
    }

    /// Probes every endpoint and returns the refreshed health table.
    pub async fn probe_all(&self) -> Vec<Endpoint> {
        let urls: Vec<String> = self.endpoints().into_iter().map(|e| e.url).collect();
        for (position, url) in urls.iter().enumerate() {
            let healthy = self.probe_with_retries(url).await.is_ok();
            self.mark(position, healthy);
        }
        self.endpoints()
    }

    async fn probe_with_retries(&self, url: &str) -> GnResult<Arc<dyn ChainRpc>> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            let client = match self.connector.connect(url) {
                Ok(client) => client,
                Err(e) => {
                    debug!("Connect {} attempt {} failed: {}", url, attempt, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            match timeout(self.probe_timeout, client.block_number()).await {
                Ok(Ok(height)) => {
                    debug!("Probe {} attempt {} ok at block {}", url, attempt, height);
                    return Ok(client);
                }
                Ok(Err(e)) => {
                    debug!("Probe {} attempt {} failed: {}", url, attempt, e);
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    debug!("Probe {} attempt {} timed out", url, attempt);
                    last_error = Some(format!("timed out after {:?}", self.probe_timeout));
                }
            }
        }

        Err(GnError::EndpointFailure {
            url: url.to_string(),
            reason: last_error.unwrap_or_else(|| "no probe attempted".to_string()),
        })
    }

    fn mark(&self, position: usize, healthy: bool) -> Endpoint {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        let endpoint = &mut endpoints[position];
        endpoint.last_known_healthy = healthy;
        endpoint.clone()
    }
}
