//! In-memory stand-ins for the RPC and signer capabilities.

use async_trait::async_trait;
use ethers_core::types::{H160, H256, U256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{GnError, GnResult};
use crate::ethereum::{ChainRpc, RpcConnector};
use crate::models::{ContractCall, EventRecord};
use crate::signer::{ChainSigner, InclusionReceipt};

#[derive(Default)]
struct RpcState {
    height: AtomicU64,
    events: Mutex<Vec<EventRecord>>,
    unreachable: AtomicBool,
    query_failing: AtomicBool,
    failing_probes: AtomicU32,
    probe_calls: AtomicU32,
    probe_delay: Mutex<Duration>,
    query_delay: Mutex<Duration>,
    queries_in_flight: AtomicU32,
    max_queries_in_flight: AtomicU32,
    last_range: Mutex<Option<(u64, u64)>>,
}

#[derive(Clone, Default)]
pub struct MockRpc {
    state: Arc<RpcState>,
}

impl MockRpc {
    pub fn new(height: u64) -> Self {
        let rpc = Self::default();
        rpc.state.height.store(height, Ordering::SeqCst);
        rpc
    }

    pub fn unreachable() -> Self {
        let rpc = Self::default();
        rpc.set_unreachable(true);
        rpc
    }

    pub fn with_events(self, events: Vec<EventRecord>) -> Self {
        *self.state.events.lock().unwrap() = events;
        self
    }

    pub fn with_probe_delay(self, delay: Duration) -> Self {
        *self.state.probe_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_query_delay(self, delay: Duration) -> Self {
        *self.state.query_delay.lock().unwrap() = delay;
        self
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.state.query_delay.lock().unwrap() = delay;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_query_failing(&self, failing: bool) {
        self.state.query_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_height(&self, height: u64) {
        self.state.height.store(height, Ordering::SeqCst);
    }

    pub fn fail_next_probes(&self, count: u32) {
        self.state.failing_probes.store(count, Ordering::SeqCst);
    }

    pub fn probe_calls(&self) -> u32 {
        self.state.probe_calls.load(Ordering::SeqCst)
    }

    pub fn max_queries_in_flight(&self) -> u32 {
        self.state.max_queries_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_range(&self) -> Option<(u64, u64)> {
        *self.state.last_range.lock().unwrap()
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn block_number(&self) -> GnResult<u64> {
        self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.probe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(GnError::EndpointFailure {
                url: "mock".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let pending = self.state.failing_probes.load(Ordering::SeqCst);
        if pending > 0 {
            self.state.failing_probes.store(pending - 1, Ordering::SeqCst);
            return Err(GnError::EndpointFailure {
                url: "mock".to_string(),
                reason: "flaky".to_string(),
            });
        }

        Ok(self.state.height.load(Ordering::SeqCst))
    }

    async fn gned_events(&self, from_block: u64, to_block: u64) -> GnResult<Vec<EventRecord>> {
        let in_flight = self.state.queries_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_queries_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        *self.state.last_range.lock().unwrap() = Some((from_block, to_block));

        let delay = *self.state.query_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.queries_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.state.query_failing.load(Ordering::SeqCst) {
            return Err(GnError::QueryFailure("mock query failed".to_string()));
        }

        let events = self.state.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockConnector {
    endpoints: HashMap<String, MockRpc>,
    connect_calls: AtomicU32,
    failing_connects: AtomicU32,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, rpc: MockRpc) -> Self {
        self.endpoints.insert(url.to_string(), rpc);
        self
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

impl RpcConnector for MockConnector {
    fn connect(&self, url: &str) -> GnResult<Arc<dyn ChainRpc>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_connects.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_connects.store(pending - 1, Ordering::SeqCst);
            return Err(GnError::EndpointFailure {
                url: url.to_string(),
                reason: "dns lookup failed".to_string(),
            });
        }
        match self.endpoints.get(url) {
            Some(rpc) => Ok(Arc::new(rpc.clone())),
            None => Err(GnError::EndpointFailure {
                url: url.to_string(),
                reason: "unknown host".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct SignerState {
    chain_nonce: u64,
    broadcast_calls: u32,
    pending_nonce_calls: u32,
    nonce_query_failing: bool,
    scripted_nonces: VecDeque<u64>,
    failing_calls: HashSet<u32>,
    drift_on_call: HashMap<u32, u64>,
    accepted: Vec<u64>,
    calls: Vec<ContractCall>,
    hash_nonces: HashMap<H256, u64>,
    failing_inclusion: HashSet<u64>,
}

/// Behaves like a node's view of one account: explicit nonces must equal the
/// current pending nonce and every accepted broadcast advances it.
pub struct MockSigner {
    address: H160,
    state: Mutex<SignerState>,
    inclusion_delay: Duration,
}

impl MockSigner {
    pub fn new(chain_nonce: u64) -> Self {
        Self {
            address: H160::repeat_byte(0xab),
            state: Mutex::new(SignerState {
                chain_nonce,
                ..Default::default()
            }),
            inclusion_delay: Duration::ZERO,
        }
    }

    pub fn with_inclusion_delay(mut self, delay: Duration) -> Self {
        self.inclusion_delay = delay;
        self
    }

    /// 1-based broadcast call numbers that get rejected.
    pub fn fail_calls(&self, calls: &[u32]) {
        self.state.lock().unwrap().failing_calls.extend(calls);
    }

    /// Another client spends `amount` nonces of this account during `call`.
    pub fn drift_on_call(&self, call: u32, amount: u64) {
        self.state.lock().unwrap().drift_on_call.insert(call, amount);
    }

    pub fn fail_inclusion_for_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().failing_inclusion.insert(nonce);
    }

    /// Replies for the next pending-nonce queries, in order. A reply above
    /// the account's nonce means another client spent nonces; a lower one is
    /// a lagging node and leaves the account untouched.
    pub fn script_pending_nonces(&self, replies: &[u64]) {
        self.state.lock().unwrap().scripted_nonces.extend(replies);
    }

    pub fn set_nonce_query_failing(&self, failing: bool) {
        self.state.lock().unwrap().nonce_query_failing = failing;
    }

    pub fn accepted_nonces(&self) -> Vec<u64> {
        self.state.lock().unwrap().accepted.clone()
    }

    pub fn pending_nonce_calls(&self) -> u32 {
        self.state.lock().unwrap().pending_nonce_calls
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ChainSigner for MockSigner {
    async fn address(&self) -> GnResult<H160> {
        Ok(self.address)
    }

    async fn pending_nonce(&self, address: H160) -> GnResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.pending_nonce_calls += 1;
        if state.nonce_query_failing || address != self.address {
            return Err(GnError::EndpointFailure {
                url: "mock".to_string(),
                reason: "nonce unavailable".to_string(),
            });
        }
        match state.scripted_nonces.pop_front() {
            Some(reply) => {
                state.chain_nonce = state.chain_nonce.max(reply);
                Ok(reply)
            }
            None => Ok(state.chain_nonce),
        }
    }

    async fn estimate_fee(&self) -> GnResult<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn broadcast(
        &self,
        call: ContractCall,
        nonce: Option<u64>,
        _fee: Option<U256>,
    ) -> GnResult<H256> {
        let mut state = self.state.lock().unwrap();
        state.broadcast_calls += 1;
        let call_number = state.broadcast_calls;

        if let Some(amount) = state.drift_on_call.remove(&call_number) {
            state.chain_nonce += amount;
        }
        if state.failing_calls.contains(&call_number) {
            return Err(GnError::SubmissionRejected("replacement underpriced".to_string()));
        }

        let nonce = nonce.unwrap_or(state.chain_nonce);
        if nonce != state.chain_nonce {
            return Err(GnError::SubmissionRejected(format!(
                "invalid nonce {}, expected {}",
                nonce, state.chain_nonce
            )));
        }

        state.chain_nonce += 1;
        state.accepted.push(nonce);
        state.calls.push(call);

        let hash = H256::from_low_u64_be(call_number as u64);
        state.hash_nonces.insert(hash, nonce);
        Ok(hash)
    }

    async fn await_inclusion(&self, hash: H256) -> GnResult<InclusionReceipt> {
        if !self.inclusion_delay.is_zero() {
            tokio::time::sleep(self.inclusion_delay).await;
        }

        let state = self.state.lock().unwrap();
        let nonce = state.hash_nonces.get(&hash).copied();
        match nonce {
            Some(nonce) if !state.failing_inclusion.contains(&nonce) => Ok(InclusionReceipt {
                hash,
                block_number: Some(nonce + 1),
            }),
            _ => Err(GnError::ConfirmationFailure {
                hash: format!("{:?}", hash),
                reason: "transaction reverted".to_string(),
            }),
        }
    }
}
