use ethers_core::types::{H160, H256, U256};
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::config::Config;
use crate::error::GnError;
use crate::models::{ContractCall, DispatchMode, JobStatus, TransactionJob};
use crate::signer::ChainSigner;
use crate::status_log::StatusLog;

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub confirmation_timeout: Duration,
    pub batch_size: usize,
    pub turbo_onchain: bool,
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.submit_retries.max(1),
            retry_delay: config.retry_delay(),
            confirmation_timeout: config.confirmation_timeout(),
            batch_size: config.batch_size,
            turbo_onchain: config.turbo_onchain,
        }
    }
}

/// Submits `gn` calls and records every job's lifecycle in the status log.
///
/// Nothing here returns an error: each job carries its own terminal status.
pub struct TransactionDispatcher {
    policy: DispatchPolicy,
    status_log: Arc<StatusLog>,
}

impl TransactionDispatcher {
    pub fn new(policy: DispatchPolicy, status_log: Arc<StatusLog>) -> Self {
        Self { policy, status_log }
    }

    pub async fn submit_one(&self, signer: Option<&dyn ChainSigner>) -> TransactionJob {
        self.submit_single(signer, ContractCall::Gn).await
    }

    /// Uses the contract's own `turboGN()` when it has one, otherwise sends a
    /// batch of `batch_size` plain `gn` calls.
    pub async fn submit_turbo(
        &self,
        signer: Option<&dyn ChainSigner>,
        mode: DispatchMode,
    ) -> Vec<TransactionJob> {
        if self.policy.turbo_onchain {
            vec![self.submit_single(signer, ContractCall::TurboGn).await]
        } else {
            self.submit_batch(signer, self.policy.batch_size, mode).await
        }
    }

    pub async fn submit_batch(
        &self,
        signer: Option<&dyn ChainSigner>,
        count: usize,
        mode: DispatchMode,
    ) -> Vec<TransactionJob> {
        let call = ContractCall::Gn;
        if count == 0 {
            return Vec::new();
        }

        let batch_id = Uuid::new_v4();
        info!("Starting {} batch {} of {} calls", mode, batch_id, count);

        let Some(signer) = signer else {
            let error = GnError::WalletUnavailable("no signer configured".to_string());
            return self.fail_all(call, count, error);
        };

        let jobs = match mode {
            DispatchMode::Parallel => self.run_parallel(signer, call, count).await,
            DispatchMode::Sequential => self.run_sequential(signer, call, count).await,
        };

        let confirmed = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Confirmed)
            .count();
        info!(
            "Batch {} finished: {}/{} confirmed",
            batch_id, confirmed, count
        );

        jobs
    }

    async fn submit_single(
        &self,
        signer: Option<&dyn ChainSigner>,
        call: ContractCall,
    ) -> TransactionJob {
        let mut job = TransactionJob::new(0);
        let label = format!("{} TX", call.label());

        let Some(signer) = signer else {
            self.fail(&mut job, &label, GnError::WalletUnavailable("no signer configured".to_string()));
            return job;
        };
        if let Err(e) = signer.address().await {
            self.fail(&mut job, &label, e);
            return job;
        }

        let fee = self.estimate_fee(signer).await;
        self.broadcast_once(signer, call, fee, &mut job, &label).await;
        self.confirm(signer, &mut job, &label).await;
        job
    }

    /// No client-side nonce coordination: the signer assigns nonces and
    /// rapid concurrent submissions may collide on the node.
    async fn run_parallel(
        &self,
        signer: &dyn ChainSigner,
        call: ContractCall,
        count: usize,
    ) -> Vec<TransactionJob> {
        let fee = self.estimate_fee(signer).await;

        let jobs = (0..count).map(|index| async move {
            let mut job = TransactionJob::new(index);
            let label = batch_label(call, index);
            self.broadcast_once(signer, call, fee, &mut job, &label).await;
            self.confirm(signer, &mut job, &label).await;
            job
        });

        join_all(jobs).await
    }

    async fn run_sequential(
        &self,
        signer: &dyn ChainSigner,
        call: ContractCall,
        count: usize,
    ) -> Vec<TransactionJob> {
        let address = match signer.address().await {
            Ok(address) => address,
            Err(e) => return self.fail_all(call, count, e),
        };
        let first_nonce = match signer.pending_nonce(address).await {
            Ok(nonce) => nonce,
            Err(e) => return self.fail_all(call, count, e),
        };
        let fee = self.estimate_fee(signer).await;

        let mut next_nonce = first_nonce;
        let mut jobs = Vec::with_capacity(count);

        for index in 0..count {
            let mut job = TransactionJob::new(index);
            let label = batch_label(call, index);
            job.nonce = Some(next_nonce);

            match self.broadcast_with_retry(signer, call, next_nonce, fee, &mut job).await {
                Ok(hash) => {
                    job.hash = Some(hash);
                    job.status = JobStatus::Sent;
                    self.status_log
                        .append(format!("{} Sent (nonce {}): {:?}", label, next_nonce, hash));
                    next_nonce += 1;
                }
                Err(e) => {
                    // The nonce was never consumed; the next job takes it.
                    job.nonce = None;
                    self.fail(&mut job, &label, e);
                    next_nonce = self.resync_nonce(signer, address, next_nonce).await;
                }
            }

            jobs.push(job);
        }

        for job in jobs.iter_mut().filter(|job| job.status == JobStatus::Sent) {
            let label = batch_label(call, job.index);
            self.confirm(signer, job, &label).await;
        }

        jobs
    }

    async fn broadcast_once(
        &self,
        signer: &dyn ChainSigner,
        call: ContractCall,
        fee: Option<U256>,
        job: &mut TransactionJob,
        label: &str,
    ) {
        job.attempts = 1;
        match signer.broadcast(call, None, fee).await {
            Ok(hash) => {
                job.hash = Some(hash);
                job.status = JobStatus::Sent;
                self.status_log.append(format!("{} Sent: {:?}", label, hash));
            }
            Err(e) => self.fail(job, label, e),
        }
    }

    async fn broadcast_with_retry(
        &self,
        signer: &dyn ChainSigner,
        call: ContractCall,
        nonce: u64,
        fee: Option<U256>,
        job: &mut TransactionJob,
    ) -> Result<H256, GnError> {
        let max_retries = self.policy.max_retries;
        let mut last_error = String::new();

        for attempt in 1..=max_retries {
            job.attempts = attempt;
            match signer.broadcast(call, Some(nonce), fee).await {
                Ok(hash) => return Ok(hash),
                Err(e) => {
                    warn!(
                        "Job {} (nonce {}) attempt {}/{} failed: {}",
                        job.index + 1,
                        nonce,
                        attempt,
                        max_retries,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < max_retries {
                        sleep(self.policy.retry_delay * attempt).await;
                    }
                }
            }
        }

        Err(GnError::RetriesExhausted {
            attempts: max_retries,
            last_error,
        })
    }

    /// Re-reads the pending nonce after a job gave up. Never moves below
    /// `floor`, the next nonce not yet taken by a broadcast job.
    async fn resync_nonce(&self, signer: &dyn ChainSigner, address: H160, floor: u64) -> u64 {
        match signer.pending_nonce(address).await {
            Ok(nonce) => {
                if nonce != floor {
                    warn!("Nonce drift: expected {}, node reports {}", floor, nonce);
                }
                nonce.max(floor)
            }
            Err(e) => {
                warn!("Nonce resync failed, continuing from {}: {}", floor, e);
                floor
            }
        }
    }

    async fn confirm(&self, signer: &dyn ChainSigner, job: &mut TransactionJob, label: &str) {
        let Some(hash) = job.hash else {
            return;
        };
        if job.status != JobStatus::Sent {
            return;
        }

        match timeout(self.policy.confirmation_timeout, signer.await_inclusion(hash)).await {
            Ok(Ok(receipt)) => {
                debug!("{:?} included in block {:?}", hash, receipt.block_number);
                job.status = JobStatus::Confirmed;
                self.status_log.append(format!("{} Confirmed: {:?}", label, hash));
            }
            Ok(Err(e)) => {
                let error = match e {
                    GnError::ConfirmationFailure { .. } => e,
                    other => GnError::ConfirmationFailure {
                        hash: format!("{:?}", hash),
                        reason: other.to_string(),
                    },
                };
                self.fail(job, label, error);
            }
            Err(_) => {
                let error = GnError::ConfirmationFailure {
                    hash: format!("{:?}", hash),
                    reason: format!("not included within {:?}", self.policy.confirmation_timeout),
                };
                self.fail(job, label, error);
            }
        }
    }

    async fn estimate_fee(&self, signer: &dyn ChainSigner) -> Option<U256> {
        match signer.estimate_fee().await {
            Ok(fee) => Some(fee),
            Err(e) => {
                warn!("Fee estimate unavailable, leaving it to the signer: {}", e);
                None
            }
        }
    }

    fn fail(&self, job: &mut TransactionJob, label: &str, error: GnError) {
        self.status_log.append(format!("{} Error: {}", label, error));
        job.fail(error);
    }

    fn fail_all(&self, call: ContractCall, count: usize, error: GnError) -> Vec<TransactionJob> {
        (0..count)
            .map(|index| {
                let mut job = TransactionJob::new(index);
                self.fail(&mut job, &batch_label(call, index), error.clone());
                job
            })
            .collect()
    }
}

fn batch_label(call: ContractCall, index: usize) -> String {
    format!("{} TX #{}", call.label(), index + 1)
}
