//! Sending commands to the market server over TCP.
use log::info;
use market_common::Result;
use market_common::command::Command;
use std::io::Write;

/// Helper type for sending commands to the server.
pub struct CommandSender;

impl CommandSender {
    /// Write `command` as one JSON line.
    pub fn send_command<W: Write>(stream: &mut W, command: &Command) -> Result<()> {
        let line = command.to_json_line()?;
        info!("Sending command: {}", command.header);
        stream.write_all(&line)?;
        stream.flush()?;
        Ok(())
    }
}
