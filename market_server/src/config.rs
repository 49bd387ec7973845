//! Server configuration.
//!
//! Every flag can also be set through a `MARKET_*` environment variable; `main` loads a
//! `.env` file first, so a checked-in `.env` works as a config file.
use crate::engine::EngineSettings;
use crate::error::{Result, ServerError};
use crate::model::scheduler::JobPolicy;
use clap::{ArgAction, Parser};
use market_common::net::default_bind;
use std::path::PathBuf;
use std::time::Duration;

/// Parsed server configuration.
#[derive(Debug, Parser)]
#[command(version, about = "Stock market feed simulator", long_about = None)]
pub struct Config {
    /// SQLite database file.
    #[arg(long, env = "MARKET_DATABASE_PATH", default_value = "market.db")]
    pub database_path: PathBuf,

    /// Number of pooled database connections.
    #[arg(long, env = "MARKET_POOL_SIZE", default_value_t = 5,
          value_parser = clap::value_parser!(u16).range(1..=10))]
    pub pool_size: u16,

    /// TCP address for client requests.
    #[arg(long, env = "MARKET_BIND", default_value_t = default_bind())]
    pub bind: String,

    /// Seconds between two news draws.
    #[arg(long, env = "MARKET_NEWS_INTERVAL_SECS", default_value_t = 15)]
    pub news_interval_secs: u64,

    /// Seconds between two convergence ticks.
    #[arg(long, env = "MARKET_TICK_INTERVAL_SECS", default_value_t = 2)]
    pub tick_interval_secs: u64,

    /// Seconds a news item takes to reach its target price.
    #[arg(long, env = "MARKET_CONVERGENCE_WINDOW_SECS", default_value_t = 10)]
    pub convergence_window_secs: u64,

    /// Append every tick to the price history.
    #[arg(long, env = "MARKET_PERSIST_TICKS", default_value_t = true, action = ArgAction::Set)]
    pub persist_ticks: bool,

    /// News for a stock that is already converging: `replace` or `drop`.
    #[arg(long, env = "MARKET_JOB_POLICY", value_enum, default_value_t = JobPolicy::Replace)]
    pub job_policy: JobPolicy,

    /// JSON seed applied when the database has no stocks.
    #[arg(long, env = "MARKET_SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Open a fresh trading day for every stock at startup.
    #[arg(long, env = "MARKET_OPEN_NEW_DAY")]
    pub open_new_day: bool,
}

impl Config {
    /// Pool size as accepted by the store.
    pub fn pool_size(&self) -> usize {
        usize::from(self.pool_size)
    }

    /// Derive engine settings, rejecting zero intervals and windows shorter than a tick.
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        if self.news_interval_secs == 0 || self.tick_interval_secs == 0 {
            return Err(ServerError::Config(
                "news and tick intervals must be at least one second".into(),
            ));
        }
        let ticks_total = self.convergence_window_secs / self.tick_interval_secs;
        if ticks_total == 0 {
            return Err(ServerError::Config(format!(
                "convergence window of {}s is shorter than one {}s tick",
                self.convergence_window_secs, self.tick_interval_secs
            )));
        }
        let ticks_total = u32::try_from(ticks_total)
            .map_err(|_| ServerError::Config(format!("{ticks_total} ticks per job is too many")))?;

        Ok(EngineSettings {
            news_interval: Duration::from_secs(self.news_interval_secs),
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            ticks_total,
            persist_ticks: self.persist_ticks,
            job_policy: self.job_policy,
        })
    }
}
