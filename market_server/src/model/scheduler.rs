//! Tick-driven convergence of stock prices.
//!
//! The `ConvergenceScheduler` owns every in-flight `ConvergenceJob` (at most one per
//! stock) and the live price board. A stock is either `Idle` or `Running`:
//!
//! - `submit` moves a stock to `Running`. When the stock already has a job, the
//!   configured `JobPolicy` decides between replacing it and dropping the newcomer.
//! - Each tick advances every job by its delta, publishes the new prices on the board
//!   and reports them to the `TickObserver` (persistence, OHLC, broadcast).
//! - A job whose window is used up is removed right after its final tick.
//!
//! The tick timer is a background thread driven by `crossbeam_channel::tick`. It is
//! started by the first submission and retires once no job is left. Ticks are
//! single-flight: a tick that fires while the previous one is still running is skipped,
//! never queued.

use super::planner::ConvergenceJob;
use clap::ValueEnum;
use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, info, warn};
use market_common::records::Price;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use strum_macros::Display;

/// What to do with news for a stock that is already converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum JobPolicy {
    /// Last news wins: the in-flight job is replaced.
    Replace,
    /// The in-flight job keeps running and the new one is discarded.
    Drop,
}

/// Convergence state of a single stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No job in flight.
    Idle,
    /// A job is advancing the price.
    Running,
}

/// Result of `ConvergenceScheduler::submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The stock was idle; the job is now running.
    Started,
    /// An in-flight job of the same stock was replaced.
    Replaced,
    /// An in-flight job of the same stock was kept; the new one was discarded.
    Dropped,
}

/// Price change produced by one tick for one stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    /// Stock that moved.
    pub stock_id: i64,
    /// Price after the tick.
    pub price: Price,
    /// Ticks applied so far, including this one.
    pub ticks_elapsed: u32,
    /// `true` when this was the job's final tick.
    pub finished: bool,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// The previous tick had not finished; nothing happened.
    Skipped,
    /// No job was in flight.
    Idle,
    /// Jobs advanced.
    Advanced(Vec<PriceUpdate>),
}

/// Side effects of a tick.
///
/// Called after the scheduler has released its job table, while the tick still holds
/// the single-flight slot.
pub trait TickObserver: Send + Sync {
    /// One stock moved.
    fn price_changed(&self, update: &PriceUpdate);
    /// Every update of the tick has been reported.
    fn tick_finished(&self, updates: &[PriceUpdate]);
}

/// Live in-memory prices of animated stocks. Written only by the tick routine.
#[derive(Debug, Clone, Default)]
pub struct LivePrices(Arc<RwLock<HashMap<i64, Price>>>);

impl LivePrices {
    /// Last price the scheduler produced for `stock_id`.
    pub fn get(&self, stock_id: i64) -> Option<Price> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stock_id)
            .copied()
    }

    fn set(&self, stock_id: i64, price: Price) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stock_id, price);
    }
}

struct Ticker {
    generation: u64,
    // dropping the sender disconnects the timer thread's stop channel
    _stop_tx: Sender<()>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<i64, ConvergenceJob>,
    ticker: Option<Ticker>,
}

struct Shared {
    tick_interval: Duration,
    policy: JobPolicy,
    state: Mutex<SchedulerState>,
    tick_in_flight: AtomicBool,
    next_generation: AtomicU64,
    prices: LivePrices,
    observer: Arc<dyn TickObserver>,
}

/// Releases the single-flight slot when the tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| TickGuard(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs convergence jobs. Cheap to clone; clones share the same jobs and timer.
#[derive(Clone)]
pub struct ConvergenceScheduler {
    shared: Arc<Shared>,
}

impl ConvergenceScheduler {
    /// Create an idle scheduler ticking every `tick_interval` while jobs are running.
    pub fn new(
        tick_interval: Duration,
        policy: JobPolicy,
        prices: LivePrices,
        observer: Arc<dyn TickObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                tick_interval,
                policy,
                state: Mutex::new(SchedulerState::default()),
                tick_in_flight: AtomicBool::new(false),
                next_generation: AtomicU64::new(0),
                prices,
                observer,
            }),
        }
    }

    /// Hand a job to the scheduler, starting the tick timer if it is not running.
    pub fn submit(&self, job: ConvergenceJob) -> Submission {
        let mut state = self.shared.lock_state();
        let submission = match state.jobs.get(&job.stock_id) {
            None => Submission::Started,
            Some(_) if self.shared.policy == JobPolicy::Drop => {
                warn!(
                    "Stock {} is already converging; dropping new target {}",
                    job.stock_id, job.target_price
                );
                return Submission::Dropped;
            }
            Some(running) => {
                info!(
                    "Stock {}: replacing job toward {} with job toward {}",
                    job.stock_id, running.target_price, job.target_price
                );
                Submission::Replaced
            }
        };

        info!(
            "Stock {}: converging {} -> {} by {} per tick over {} ticks",
            job.stock_id,
            job.start_price,
            job.target_price,
            job.price_delta_per_tick,
            job.ticks_total
        );
        state.jobs.insert(job.stock_id, job);
        if state.ticker.is_none() {
            state.ticker = Some(Shared::spawn_ticker(&self.shared));
        }
        submission
    }

    /// Run one tick now. Used by the timer thread and callable directly.
    pub fn advance_tick(&self) -> TickReport {
        self.shared.advance(None)
    }

    /// Convergence state of `stock_id`.
    pub fn state(&self, stock_id: i64) -> JobState {
        if self.shared.lock_state().jobs.contains_key(&stock_id) {
            JobState::Running
        } else {
            JobState::Idle
        }
    }

    /// Copy of the in-flight job of `stock_id`.
    pub fn job(&self, stock_id: i64) -> Option<ConvergenceJob> {
        self.shared.lock_state().jobs.get(&stock_id).cloned()
    }

    /// Number of in-flight jobs.
    pub fn active_jobs(&self) -> usize {
        self.shared.lock_state().jobs.len()
    }

    /// `true` while the tick timer is alive.
    pub fn is_running(&self) -> bool {
        self.shared.lock_state().ticker.is_some()
    }

    /// Live price board shared with readers.
    pub fn prices(&self) -> &LivePrices {
        &self.shared.prices
    }

    /// Abort every job and retire the timer.
    ///
    /// Does not wait for a tick that is currently running. Stopping an idle scheduler
    /// is a no-op.
    pub fn stop(&self) {
        let mut state = self.shared.lock_state();
        let ticker = state.ticker.take();
        let aborted = state.jobs.len();
        state.jobs.clear();
        drop(state);

        match ticker {
            Some(_) => info!("Convergence scheduler stopped ({aborted} job(s) aborted)"),
            None => debug!("Convergence scheduler has already been stopped"),
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_ticker(shared: &Arc<Shared>) -> Ticker {
        let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticks = tick(shared.tick_interval);
        let shared = Arc::clone(shared);

        thread::spawn(move || {
            debug!("Tick timer {generation} started");
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticks) -> _ => {
                        if shared.advance(Some(generation)) == TickReport::Idle {
                            break;
                        }
                    }
                }
            }
            debug!("Tick timer {generation} retired");
        });

        Ticker {
            generation,
            _stop_tx: stop_tx,
        }
    }

    /// One tick. `generation` is set when called from a timer thread, which must stop
    /// acting once it has been superseded.
    fn advance(&self, generation: Option<u64>) -> TickReport {
        let Some(_flight) = TickGuard::try_acquire(&self.tick_in_flight) else {
            debug!("Previous tick is still running; skipping this one");
            return TickReport::Skipped;
        };

        let updates = {
            let mut state = self.lock_state();
            if let Some(generation) = generation {
                if state.ticker.as_ref().map(|t| t.generation) != Some(generation) {
                    return TickReport::Idle;
                }
            }
            if state.jobs.is_empty() {
                return TickReport::Idle;
            }

            let mut updates = Vec::with_capacity(state.jobs.len());
            state.jobs.retain(|_, job| {
                let price = job.advance();
                updates.push(PriceUpdate {
                    stock_id: job.stock_id,
                    price,
                    ticks_elapsed: job.ticks_elapsed,
                    finished: job.is_finished(),
                });
                !job.is_finished()
            });
            for update in &updates {
                self.prices.set(update.stock_id, update.price);
            }
            if state.jobs.is_empty() {
                state.ticker = None;
            }
            updates
        };

        for update in &updates {
            debug!(
                "Stock {} price updated to {} after {} tick(s)",
                update.stock_id, update.price, update.ticks_elapsed
            );
            self.observer.price_changed(update);
            if update.finished {
                info!(
                    "Stock {}: price change completed with final price {}",
                    update.stock_id, update.price
                );
            }
        }
        self.observer.tick_finished(&updates);
        TickReport::Advanced(updates)
    }
}
