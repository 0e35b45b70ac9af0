//! Command line surface

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::{config::DEFAULT_BROKER, purge::DEFAULT_TIMEOUT};

/// Tool to interact with AMQP 1.0 broker
#[derive(Debug, Parser)]
#[command(name = "amqp10-tool", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// amqp connection string
    #[arg(short, long, global = true, env = "AMQP10_BROKER", default_value = DEFAULT_BROKER)]
    pub broker: Url,

    /// verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// skip certificate validation
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// anonymous connection. mandatory for unsecured ActiveMQ
    #[arg(short, long, global = true)]
    pub anonymous: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read all the messages that are in a queue
    Purge(PurgeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct PurgeArgs {
    /// Queue name
    #[arg(short, long, default_value = "")]
    pub queue: String,

    /// time to wait in seconds for new messages
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// consecutive receive errors to tolerate before giving up
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=1000))]
    pub retries: u32,
}
