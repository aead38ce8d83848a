use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use log::info;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{GnError, GnResult};
use crate::ethereum::ChainRpc;
use crate::models::{AggregateSnapshot, EventRecord, LeaderboardEntry};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EventAggregator {
    window_blocks: u64,
    leaderboard_size: usize,
    query_timeout: Duration,
}

impl EventAggregator {
    pub fn new(window_blocks: u64, leaderboard_size: usize) -> Self {
        Self {
            window_blocks,
            leaderboard_size,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Upper bound for each RPC call of a cycle.
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Fetches the recent window of `GNed` events and recomputes every
    /// statistic from scratch. Anything older than the window is ignored.
    pub async fn ingest(&self, rpc: &dyn ChainRpc) -> GnResult<AggregateSnapshot> {
        let latest_block = timeout(self.query_timeout, rpc.block_number())
            .await
            .map_err(|_| self.timed_out("block number query"))?
            .map_err(into_query_failure)?;
        let from_block = latest_block.saturating_sub(self.window_blocks);

        let events = timeout(self.query_timeout, rpc.gned_events(from_block, latest_block))
            .await
            .map_err(|_| self.timed_out("log query"))?
            .map_err(into_query_failure)?;

        info!(
            "Found {} GNed events in blocks {} to {}",
            events.len(),
            from_block,
            latest_block
        );

        Ok(self.aggregate(&events, from_block, latest_block, Local::now()))
    }

    fn timed_out(&self, what: &str) -> GnError {
        GnError::QueryFailure(format!("{} timed out after {:?}", what, self.query_timeout))
    }

    /// "Today" is the local calendar date of `now`; an event counts as daily
    /// activity when its timestamp falls on that same local date.
    pub fn aggregate(
        &self,
        events: &[EventRecord],
        from_block: u64,
        to_block: u64,
        now: DateTime<Local>,
    ) -> AggregateSnapshot {
        let today = now.date_naive();

        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<(&str, u64)> = Vec::new();
        let mut all_time_users = BTreeSet::new();
        let mut daily_active_users = BTreeSet::new();

        for event in events {
            let address = event.address.as_str();
            let position = *positions.entry(address).or_insert_with(|| {
                counts.push((address, 0));
                counts.len() - 1
            });
            counts[position].1 += 1;

            all_time_users.insert(event.address.clone());
            if local_date(event.timestamp_seconds) == Some(today) {
                daily_active_users.insert(event.address.clone());
            }
        }

        // Stable sort keeps first-seen order among equal counts.
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let leaderboard = counts
            .into_iter()
            .take(self.leaderboard_size)
            .enumerate()
            .map(|(i, (address, count))| LeaderboardEntry {
                rank: i + 1,
                address: address.to_string(),
                count,
            })
            .collect();

        AggregateSnapshot {
            total_tx: events.len() as u64,
            all_time_users,
            daily_active_users,
            leaderboard,
            from_block,
            to_block,
            generated_at: now.with_timezone(&Utc),
        }
    }
}

fn local_date(timestamp_seconds: u64) -> Option<NaiveDate> {
    let seconds = i64::try_from(timestamp_seconds).ok()?;
    Local
        .timestamp_opt(seconds, 0)
        .single()
        .map(|datetime| datetime.date_naive())
}

fn into_query_failure(error: GnError) -> GnError {
    match error {
        GnError::QueryFailure(_) => error,
        other => GnError::QueryFailure(other.to_string()),
    }
}
