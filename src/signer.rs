use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::{BlockNumber, TransactionRequest, H160, H256, U256, U64};
use ethers_providers::{Http, Middleware, PendingTransaction, Provider};

use crate::error::{GnError, GnResult};
use crate::models::ContractCall;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionReceipt {
    pub hash: H256,
    pub block_number: Option<u64>,
}

/// Signing and broadcasting capability used by the dispatcher.
///
/// Implementations own the key material; the dispatcher only ever sees
/// addresses, nonces and hashes.
#[async_trait]
pub trait ChainSigner: Send + Sync {
    async fn address(&self) -> GnResult<H160>;

    async fn pending_nonce(&self, address: H160) -> GnResult<u64>;

    async fn estimate_fee(&self) -> GnResult<U256>;

    /// Signs `call` and hands it to the node. With `nonce == None` the
    /// signer picks the nonce itself.
    async fn broadcast(
        &self,
        call: ContractCall,
        nonce: Option<u64>,
        fee: Option<U256>,
    ) -> GnResult<H256>;

    async fn await_inclusion(&self, hash: H256) -> GnResult<InclusionReceipt>;
}

/// Signer backed by a raw private key over a plain HTTP endpoint.
pub struct LocalSigner {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    contract: H160,
    confirmations: usize,
    url: String,
}

impl LocalSigner {
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        contract: H160,
        confirmations: usize,
    ) -> GnResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| GnError::EndpointFailure {
            url: rpc_url.to_string(),
            reason: e.to_string(),
        })?;

        let key = private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let wallet: LocalWallet = key
            .parse()
            .map_err(|_| GnError::WalletUnavailable("private key is not valid hex".to_string()))?;

        let client = SignerMiddleware::new_with_provider_chain(provider, wallet)
            .await
            .map_err(|e| GnError::EndpointFailure {
                url: rpc_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            contract,
            confirmations: confirmations.max(1),
            url: rpc_url.to_string(),
        })
    }

    fn endpoint_failure(&self, reason: impl ToString) -> GnError {
        GnError::EndpointFailure {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ChainSigner for LocalSigner {
    async fn address(&self) -> GnResult<H160> {
        Ok(self.client.signer().address())
    }

    async fn pending_nonce(&self, address: H160) -> GnResult<u64> {
        let nonce = self
            .client
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.endpoint_failure(e))?;
        Ok(nonce.as_u64())
    }

    async fn estimate_fee(&self) -> GnResult<U256> {
        self.client
            .get_gas_price()
            .await
            .map_err(|e| self.endpoint_failure(e))
    }

    async fn broadcast(
        &self,
        call: ContractCall,
        nonce: Option<u64>,
        fee: Option<U256>,
    ) -> GnResult<H256> {
        let mut tx = TransactionRequest::new()
            .from(self.client.address())
            .to(self.contract)
            .data(call.calldata());
        if let Some(nonce) = nonce {
            tx = tx.nonce(nonce);
        }
        if let Some(fee) = fee {
            tx = tx.gas_price(fee);
        }

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| GnError::SubmissionRejected(e.to_string()))?;

        Ok(pending.tx_hash())
    }

    async fn await_inclusion(&self, hash: H256) -> GnResult<InclusionReceipt> {
        let failure = |reason: String| GnError::ConfirmationFailure {
            hash: format!("{:?}", hash),
            reason,
        };

        let receipt = PendingTransaction::new(hash, self.client.provider())
            .confirmations(self.confirmations)
            .await
            .map_err(|e| failure(e.to_string()))?
            .ok_or_else(|| failure("transaction dropped from mempool".to_string()))?;

        if receipt.status == Some(U64::zero()) {
            return Err(failure("transaction reverted".to_string()));
        }

        Ok(InclusionReceipt {
            hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
        })
    }
}
