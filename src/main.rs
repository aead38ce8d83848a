mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use gn_watch::{
    ethereum::HttpConnector,
    models::{AggregateSnapshot, JobStatus},
    scheduler::ingest_once,
    signer::{ChainSigner, LocalSigner},
    Config, DispatchPolicy, EndpointResolver, EventAggregator, PollScheduler, StatusLog,
    TransactionDispatcher,
};
use ethers_core::types::H160;
use log::warn;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let contract = config.contract()?;

    let status_log = Arc::new(StatusLog::new(config.status_log_capacity));
    let resolver = Arc::new(EndpointResolver::new(
        config.endpoint_urls(),
        Arc::new(HttpConnector::new(contract)),
        config.probe_timeout(),
        config.probe_retries,
    ));
    let aggregator = Arc::new(
        EventAggregator::new(config.window_blocks, config.leaderboard_size)
            .with_query_timeout(config.query_timeout()),
    );

    match cli.command {
        Commands::Watch => {
            let handle = PollScheduler::start(
                resolver,
                aggregator,
                config.poll_interval(),
                status_log.clone(),
            );
            let mut updates = handle.subscribe();

            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        if let Some(snapshot) = snapshot {
                            println!("{}", serde_json::to_string_pretty(&*snapshot)?);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!("Stopping watcher");
                        break;
                    }
                }
            }

            handle.stop();
            print_status_log(&status_log);
        }
        Commands::Stats => {
            let snapshot = ingest_once(&resolver, &aggregator).await?;
            print_snapshot(&snapshot);
        }
        Commands::Endpoints => {
            for endpoint in resolver.probe_all().await {
                let health = if endpoint.last_known_healthy { "up" } else { "down" };
                println!("{:<5} {}", health, endpoint.url);
            }
        }
        Commands::Gn => {
            let signer = connect_signer(&config, contract, &resolver, &status_log).await;
            let dispatcher =
                TransactionDispatcher::new(DispatchPolicy::from_config(&config), status_log.clone());

            dispatcher
                .submit_one(signer.as_ref().map(|s| s as &dyn ChainSigner))
                .await;
            print_status_log(&status_log);
        }
        Commands::Turbo { count, mode } => {
            let signer = connect_signer(&config, contract, &resolver, &status_log).await;
            let dispatcher =
                TransactionDispatcher::new(DispatchPolicy::from_config(&config), status_log.clone());
            let signer = signer.as_ref().map(|s| s as &dyn ChainSigner);
            let mode = mode.unwrap_or(config.dispatch_mode);

            let jobs = match count {
                Some(count) => dispatcher.submit_batch(signer, count, mode).await,
                None => dispatcher.submit_turbo(signer, mode).await,
            };
            print_status_log(&status_log);

            let confirmed = jobs
                .iter()
                .filter(|job| job.status == JobStatus::Confirmed)
                .count();
            println!("{} of {} transactions confirmed", confirmed, jobs.len());
        }
    }

    Ok(())
}

/// No key configured means no signer; the dispatcher then reports
/// `WalletUnavailable` for every job.
async fn connect_signer(
    config: &Config,
    contract: H160,
    resolver: &EndpointResolver,
    status_log: &StatusLog,
) -> Option<LocalSigner> {
    let private_key = config.private_key.as_deref()?;

    let resolved = match resolver.resolve().await {
        Ok(resolved) => resolved,
        Err(e) => {
            status_log.append(format!("Error: {}", e));
            return None;
        }
    };

    match LocalSigner::connect(
        &resolved.endpoint.url,
        private_key,
        contract,
        config.confirmations,
    )
    .await
    {
        Ok(signer) => Some(signer),
        Err(e) => {
            warn!("Could not build signer: {}", e);
            status_log.append(format!("Error: {}", e));
            None
        }
    }
}

fn print_snapshot(snapshot: &AggregateSnapshot) {
    println!("GN Statistics (blocks {} to {}):", snapshot.from_block, snapshot.to_block);
    println!("Total transactions: {}", snapshot.total_tx);
    println!("Daily users: {}", snapshot.daily_active_users.len());
    println!("Total users: {}", snapshot.all_time_users.len());
    println!("Leaderboard:");
    for entry in &snapshot.leaderboard {
        println!("  #{:<2} {} {}", entry.rank, entry.address, entry.count);
    }
}

fn print_status_log(status_log: &StatusLog) {
    println!("Status Messages:");
    for entry in status_log.snapshot() {
        println!("[{}] {}", entry.timestamp.format("%H:%M:%S"), entry.message);
    }
}
