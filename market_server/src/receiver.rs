use crate::engine::MarketEngine;
use crate::error::Result;
use crate::store::MarketStore;
use crossbeam_channel::Receiver;
use log::{debug, error, info};
use market_common::command::{Command, Request};
use market_common::{MarketError, MarketEvent};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// TCP request receiver.
///
/// Every connection carries exactly one `Command` line. `SUBSCRIBE` turns the
/// connection into an event stream; `STOCK` and `RANDOM_NEWS` get one JSON line back
/// and the connection is closed. Each connection is served on its own thread, so a
/// misbehaving client never stops the accept loop.
pub struct CommandReceiver {
    socket: TcpListener,
}

impl CommandReceiver {
    /// Bind a new receiver to `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn bind(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Address the receiver is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop serving requests against `engine`.
    pub fn receive_loop<S: MarketStore + 'static>(self, engine: Arc<MarketEngine<S>>) -> Result<()> {
        info!("Command TCP server is started on {}", self.socket.local_addr()?);

        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        let peer = stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|_| "unknown peer".into());
                        if let Err(e) = handle_client(stream, &peer, &engine) {
                            error!("Request from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}

fn handle_client<S: MarketStore + 'static>(
    stream: TcpStream,
    peer: &str,
    engine: &MarketEngine<S>,
) -> market_common::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        debug!("{peer} closed the connection without a command");
        return Ok(());
    }
    let command = Command::from_json_line(&line)
        .map_err(|_| MarketError::UnknownRequest(line.trim().to_string()))?;
    info!("Received {} from {}", command.header, peer);

    let mut writer = stream;
    match command.header {
        Request::Subscribe => {
            stream_events(&mut writer, engine.subscribe())?;
            info!("Subscriber {peer} disconnected");
        }
        Request::Stock => {
            let mut reply = serde_json::to_vec(&engine.snapshot())?;
            reply.push(b'\n');
            writer.write_all(&reply)?;
        }
        Request::RandomNews => {
            let mut reply = match engine.random_news() {
                Some(news) => serde_json::to_vec(&news)?,
                None => b"{}".to_vec(),
            };
            reply.push(b'\n');
            writer.write_all(&reply)?;
        }
    }
    Ok(())
}

/// Write every event from `events` as a JSON line until the feed closes or the client
/// goes away.
pub fn stream_events<W: Write>(writer: &mut W, events: Receiver<MarketEvent>) -> market_common::Result<()> {
    for event in events.iter() {
        let line = event.to_json_line()?;
        if let Err(e) = writer.write_all(&line).and_then(|_| writer.flush()) {
            debug!("Stopped streaming {}: {}", event.name(), e);
            break;
        }
    }
    Ok(())
}
