//!
//! Common types and utilities shared by the market server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `MarketError` used across the workspace.
//! - `result`: handy `Result<T, MarketError>` alias.
//! - `records`: typed stock, trading-day, tick and news records.
//! - `event`: events broadcast to subscribed clients.
//! - `command`: request commands sent by clients.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod event;
pub mod net;
pub mod records;
pub mod result;

pub use command::{Command, Request};
pub use error::MarketError;
pub use event::MarketEvent;
pub use result::Result;
