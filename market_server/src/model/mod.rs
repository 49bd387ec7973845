//! Simulation building blocks wired together by `MarketEngine`.
//!
//! - `news_selector`: uniform random pick from the news pool.
//! - `planner`: turns a news item into a `ConvergenceJob`.
//! - `scheduler`: advances jobs tick by tick and owns the live price board.
//! - `aggregator`: per-day open/high/low/close bookkeeping.
//! - `broadcaster`: fan-out of market events to subscribers.

pub mod aggregator;
pub mod broadcaster;
pub mod news_selector;
pub mod planner;
pub mod scheduler;
