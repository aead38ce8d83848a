pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ethereum;
pub mod models;
pub mod resolver;
pub mod scheduler;
pub mod signer;
pub mod status_log;

#[cfg(test)]
mod testing;

pub use aggregator::EventAggregator;
pub use config::Config;
pub use dispatcher::{DispatchPolicy, TransactionDispatcher};
pub use error::{GnError, GnResult};
pub use resolver::{EndpointResolver, ResolvedEndpoint};
pub use scheduler::{PollHandle, PollScheduler};
pub use status_log::StatusLog;
