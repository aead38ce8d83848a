use thiserror::Error;

/// Failures surfaced by the watcher core.
///
/// Poll-cycle errors (`EndpointFailure`, `AllEndpointsUnavailable`,
/// `QueryFailure`) stay inside the cycle that produced them. Dispatch errors
/// end up on the failing job and in the status log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GnError {
    #[error("endpoint {url} failed: {reason}")]
    EndpointFailure { url: String, reason: String },

    #[error("all {attempted} RPC endpoints are unavailable")]
    AllEndpointsUnavailable { attempted: usize },

    #[error("log query failed: {0}")]
    QueryFailure(String),

    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("confirmation failed for {hash}: {reason}")]
    ConfirmationFailure { hash: String, reason: String },

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

pub type GnResult<T> = std::result::Result<T, GnError>;
