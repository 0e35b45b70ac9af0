//! Drains AMQP 1.0 queues.
//!
//! ```sh
//! amqp10-tool --broker amqp://localhost:5672 purge --queue test.q --timeout 2
//! ```
//!
//! Every message currently available on the queue is received and accepted,
//! then the number of messages read is logged. The command stops once a
//! receive window of `--timeout` seconds passes without a delivery.

use std::future::Future;

use tracing::{debug, info};

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod purge;
pub mod receiver;
pub mod tls;

pub use error::Error;

use cli::{Cli, Command, PurgeArgs};
use config::ConnectionConfig;
use purge::{PurgeReport, StopReason};

/// Runs the parsed command line until completion or `shutdown`
pub async fn run<F>(cli: Cli, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()>,
{
    let config = ConnectionConfig::from(&cli.global);
    match cli.command {
        Command::Purge(args) => run_purge(&config, &args, shutdown).await.map(|_| ()),
    }
}

/// The `purge` subcommand.
///
/// The queue name is validated before the broker is dialed. Once the link is
/// attached the number of messages read is logged on every exit path.
pub async fn run_purge<F>(
    config: &ConnectionConfig,
    args: &PurgeArgs,
    shutdown: F,
) -> Result<PurgeReport, Error>
where
    F: Future<Output = ()>,
{
    let queue = args.validate()?;
    let options = args.options();

    let result = receiver::purge_queue(config, &options, queue, shutdown).await;
    log_summary(queue, &result);
    result
}

/// Number of messages read by a purge run, if it got far enough to read any
pub fn messages_read(result: &Result<PurgeReport, Error>) -> Option<u64> {
    match result {
        Ok(report) => Some(report.count),
        Err(err) => err.partial_count(),
    }
}

fn log_summary(queue: &str, result: &Result<PurgeReport, Error>) {
    if let Ok(PurgeReport {
        stop: StopReason::Interrupted,
        ..
    }) = result
    {
        debug!("interrupted before the queue was drained");
    }
    if let Some(count) = messages_read(result) {
        info!("Number of messages read from {} : {}", queue, count);
    }
}
