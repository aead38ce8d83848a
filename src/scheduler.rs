use log::{debug, error, info};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::aggregator::EventAggregator;
use crate::error::GnResult;
use crate::models::AggregateSnapshot;
use crate::resolver::EndpointResolver;
use crate::status_log::StatusLog;

pub type SnapshotReceiver = watch::Receiver<Option<Arc<AggregateSnapshot>>>;

/// One ingestion cycle: pick an endpoint, then rebuild the snapshot from it.
pub async fn ingest_once(
    resolver: &EndpointResolver,
    aggregator: &EventAggregator,
) -> GnResult<AggregateSnapshot> {
    let resolved = resolver.resolve().await?;
    debug!("Ingesting through {}", resolved.endpoint.url);
    aggregator.ingest(resolved.client.as_ref()).await
}

pub struct PollScheduler;

impl PollScheduler {
    /// Runs a cycle immediately, then every `period`. Cycles run back to
    /// back on a single task, so a slow cycle delays the next tick instead of
    /// overlapping it.
    pub fn start(
        resolver: Arc<EndpointResolver>,
        aggregator: Arc<EventAggregator>,
        period: Duration,
        status_log: Arc<StatusLog>,
    ) -> PollHandle {
        let (sender, receiver) = watch::channel(None);
        let stopped = Arc::new(Mutex::new(false));
        let task_stopped = stopped.clone();

        info!("Starting poll scheduler (interval: {:?})", period);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let outcome = ingest_once(&resolver, &aggregator).await;

                // Publication happens under the same lock `stop` takes, so a
                // result that finishes after `stop` is dropped here.
                {
                    let stopped = task_stopped.lock().unwrap_or_else(PoisonError::into_inner);
                    if *stopped {
                        break;
                    }
                    match outcome {
                        Ok(snapshot) => {
                            debug!(
                                "Publishing snapshot: {} tx, {} users, {} today",
                                snapshot.total_tx,
                                snapshot.all_time_users.len(),
                                snapshot.daily_active_users.len()
                            );
                            sender.send_replace(Some(Arc::new(snapshot)));
                        }
                        Err(e) => {
                            error!("Poll cycle failed: {}", e);
                            status_log.append(format!("Poll cycle failed: {}", e));
                        }
                    }
                }
            }
        });

        PollHandle {
            receiver,
            stopped,
            task: Mutex::new(Some(task)),
        }
    }
}

pub struct PollHandle {
    receiver: SnapshotReceiver,
    stopped: Arc<Mutex<bool>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollHandle {
    /// `None` until the first cycle succeeds.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.receiver.clone()
    }

    pub fn latest(&self) -> Option<Arc<AggregateSnapshot>> {
        self.receiver.borrow().clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idempotent. Once this returns no further snapshot is published, even
    /// by a cycle that is still in flight.
    pub fn stop(&self) {
        {
            let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
            if *stopped {
                return;
            }
            *stopped = true;
        }

        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        info!("Poll scheduler stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
