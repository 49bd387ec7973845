//! Bounded pool of SQLite connections on top of `r2d2`.
//!
//! Every connection is set up with a busy timeout and foreign keys enabled. A borrowed
//! `PooledConnection` goes back to the pool when dropped, so every exit path
//! (including `?` early returns) releases it.

use crate::error::StoreError;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

/// Smallest accepted pool.
pub const MIN_POOL_SIZE: usize = 1;
/// Largest accepted pool.
pub const MAX_POOL_SIZE: usize = 10;

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection on loan from a `ConnectionPool`.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Fixed-size pool of connections to one SQLite database file.
pub struct ConnectionPool {
    pool: Pool<SqliteConnectionManager>,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Open `size` connections to the database at `path`.
    pub fn open(path: &Path, size: usize) -> Result<Self, StoreError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size) {
            return Err(StoreError::InvalidPoolSize(size));
        }
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        // size is at most MAX_POOL_SIZE
        let size = size as u32;
        let pool = Pool::builder()
            .max_size(size)
            .min_idle(Some(size))
            .connection_timeout(DEFAULT_ACQUIRE_TIMEOUT)
            .build(manager)?;
        Ok(Self {
            pool,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        })
    }

    /// Override how long `get` waits for a free connection.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Borrow a connection, waiting up to the acquire timeout.
    pub fn get(&self) -> Result<PooledConnection, StoreError> {
        self.pool
            .get_timeout(self.acquire_timeout)
            .map_err(|_| StoreError::PoolTimeout(self.acquire_timeout))
    }

    /// Total number of connections the pool may hold.
    pub fn size(&self) -> usize {
        self.pool.max_size() as usize
    }

    /// Connections currently not borrowed.
    pub fn idle(&self) -> usize {
        self.pool.state().idle_connections as usize
    }
}
