//! Error types used across the market server crate.
//!
//! Two layers exist:
//! - `StoreError` is raised inside the SQLite store and the connection pool. It never
//!   leaves the store boundary during simulation: the collaborator traits log it and fall
//!   back to an empty value. Only startup code (opening the store, seeding) sees it.
//! - `ServerError` is the top-level error returned by `main`.

use market_common::MarketError;
use thiserror::Error;

/// Failures of the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure reported by SQLite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection pool could not be built.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// No pooled connection became free in time.
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(std::time::Duration),

    /// Pool size outside the accepted bounds.
    #[error("Invalid pool size {0}: expected 1..=10")]
    InvalidPoolSize(usize),

    /// Seed file could not be read.
    #[error("Seed file error: {0}")]
    SeedIo(#[from] std::io::Error),

    /// Seed file is not valid JSON for a market seed.
    #[error("Seed file format error: {0}")]
    SeedFormat(#[from] serde_json::Error),

    /// Seed refers to a stock that is not part of it.
    #[error("Seed news refers to unknown stock code {0}")]
    UnknownSeedStock(String),

    /// The store refused a seed record; the underlying failure has been logged.
    #[error("Seed record rejected: {0}")]
    SeedRejected(String),
}

/// Top-level error of the server binary.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid combination of configuration values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage failure during startup.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Shared market error (I/O, JSON, channels).
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Socket or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The Ctrl+C handler could not be installed.
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Crate-level result alias defaulting to `ServerError`.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;
