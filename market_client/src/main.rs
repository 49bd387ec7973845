//! Market Client: a TCP client for the market feed server. It sends one request and
//! prints every reply line. With `subscribe` (the default) it keeps streaming price
//! updates and news markers until the server closes the connection or Ctrl+C.
//!
//! Usage example (CLI):
//! ```bash
//! market_client --server-ip 192.168.0.10 --request subscribe
//! market_client --request random-news
//! ```
#![warn(missing_docs)]
mod args;
mod render;
mod sender;

use crate::args::Args;
use crate::sender::CommandSender;
use clap::Parser;
use log::{error, info};
use market_common::net::addr;
use market_common::{Command, MarketError, Request, Result};
use std::io::{BufRead, BufReader, ErrorKind};
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

/// Read timeout that lets the receive loop notice Ctrl+C.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Prints reply lines from `stream` until the server closes it, the one-shot reply has
/// arrived, or `shutdown` is set.
fn start_receiver_loop(stream: TcpStream, request: Request, shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !shutdown.load(Ordering::Relaxed) {
        match reader.read_line(&mut line) {
            Ok(0) => {
                info!("Server closed the connection");
                break;
            }
            Ok(_) => {
                info!("{}", render::render_line(request, &line));
                line.clear();
                if request != Request::Subscribe {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                error!("Receive data error: {}", e);
                return Err(MarketError::Io(e));
            }
        }
    }
    info!("Receiver loop stopping...");
    Ok(())
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| MarketError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;
    }

    let server_address = addr(args.server_ip.trim().trim_matches('"'), args.port);
    info!("Connecting to TCP server at {}", server_address);
    let mut stream = TcpStream::connect(&server_address)
        .map_err(|e| MarketError::Format(format!("Failed to connect to server: {}", e)))?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    CommandSender::send_command(&mut stream, &Command::new(args.request))?;
    if args.request == Request::Subscribe {
        info!("Client is running. Press Ctrl+C to exit.");
    }
    start_receiver_loop(stream, args.request, shutdown)
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
