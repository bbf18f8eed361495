use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use portwatch_core::proximity::{SearchRadius, DEFAULT_RADIUS};
use portwatch_core::summary::DEFAULT_MAX_LIMIT;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the proximity server
    Serve(ServeArgs),
    /// Subscribe to a running server and log every update
    Watch(WatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port for the REST API and the stream endpoint
    #[arg(short, long, default_value_t = 6520)]
    pub port: u16,

    /// JSON file with `{ "vessels": [...], "ports": [...] }`
    #[arg(long)]
    pub fleet: Option<PathBuf>,

    /// Seconds between periodic proximity passes
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_interval: u64,

    /// Seconds a new connection may stay silent before it is dropped
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub idle_grace: u64,

    /// Seconds a socket write may stall before the connection is closed
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub write_timeout: u64,

    /// Radius in km used when a request does not name one
    #[arg(long, default_value = "20", value_parser = parse_radius)]
    pub default_radius: SearchRadius,

    /// Largest accepted page size for the summary endpoint
    #[arg(long, default_value_t = DEFAULT_MAX_LIMIT, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_page_limit: u32,

    /// Seed for position synthesis; random when absent
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Stream endpoint, e.g. ws://localhost:6520/api/v1/stream
    #[arg(long, default_value = "ws://localhost:6520/api/v1/stream")]
    pub url: String,

    /// Radius in km to subscribe with
    #[arg(long, default_value = "20", value_parser = parse_radius)]
    pub radius: SearchRadius,

    /// Seconds to wait before reconnecting, at most one day
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(0..=86_400))]
    pub reconnect_delay: u64,
}

fn parse_radius(s: &str) -> Result<SearchRadius, String> {
    SearchRadius::parse(s).map_err(|e| e.to_string())
}

/// Runtime settings shared by the web handlers and the broadcaster
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub tick_interval: Duration,
    pub idle_grace: Duration,
    pub write_timeout: Duration,
    pub default_radius: SearchRadius,
    pub max_page_limit: u32,
}

impl From<&ServeArgs> for Settings {
    fn from(args: &ServeArgs) -> Self {
        Settings {
            tick_interval: Duration::from_secs(args.tick_interval),
            idle_grace: Duration::from_secs(args.idle_grace),
            write_timeout: Duration::from_secs(args.write_timeout),
            default_radius: args.default_radius,
            max_page_limit: args.max_page_limit,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tick_interval: Duration::from_secs(10),
            idle_grace: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
            default_radius: DEFAULT_RADIUS,
            max_page_limit: DEFAULT_MAX_LIMIT,
        }
    }
}
