//! Command-line arguments for the market client.
use clap::Parser;
use market_common::Request;
use market_common::net::COMMAND_PORT;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server IP address (IPv4 or IPv6) where the market server is running.
    #[clap(long, default_value = "127.0.0.1")]
    pub server_ip: String,

    /// Server TCP port.
    #[clap(long, default_value_t = COMMAND_PORT)]
    pub port: u16,

    /// What to ask the server for.
    #[clap(long, value_enum, default_value_t = Request::Subscribe)]
    pub request: Request,
}
