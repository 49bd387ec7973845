//! Shared protocol command type used by client and server.
//!
//! A client opens a TCP connection and sends exactly one `Command` as a JSON line.
//! `SUBSCRIBE` keeps the connection open as an event stream; `STOCK` and
//! `RANDOM_NEWS` receive a single JSON line and the server closes the connection.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::Result;

/// Request kind carried in the command header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Request {
    /// Stream the current snapshot followed by every broadcast event.
    Subscribe,
    /// One-shot snapshot of all stocks as a JSON array.
    Stock,
    /// One-shot random news item as a JSON object, or `{}` when there is none.
    RandomNews,
}

/// Command payload sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// What the client asks for.
    pub header: Request,
}

impl Command {
    /// Creates a new command for `request`.
    pub fn new(request: Request) -> Self {
        Command { header: request }
    }

    /// Encode the command as a single newline-terminated JSON line.
    pub fn to_json_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decode a command from one received line.
    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_screaming_snake_case() {
        let line = Command::new(Request::RandomNews).to_json_line().unwrap();
        assert_eq!(line, b"{\"header\":\"RANDOM_NEWS\"}\n".to_vec());
    }

    #[test]
    fn decodes_trimmed_line() {
        let cmd = Command::from_json_line("{\"header\":\"SUBSCRIBE\"}\r\n").unwrap();
        assert_eq!(cmd.header, Request::Subscribe);
    }

    #[test]
    fn rejects_unknown_header() {
        assert!(Command::from_json_line("{\"header\":\"PING\"}").is_err());
    }

    #[test]
    fn request_parses_case_insensitively() {
        assert_eq!("stock".parse::<Request>().unwrap(), Request::Stock);
        assert_eq!(Request::RandomNews.to_string(), "RANDOM_NEWS");
        assert_eq!(
            "PING".parse::<Request>(),
            Err(strum::ParseError::VariantNotFound)
        );
    }
}
