//! The market engine: one explicitly constructed context that owns the store handle,
//! the news selector, the convergence scheduler, the OHLC aggregator and the broadcaster.
//!
//! Flow of a news cycle:
//! 1. Every `news_interval` the news loop calls `poll_news`.
//! 2. A random news item is planned into a `ConvergenceJob` from the stock's current
//!    price and handed to the scheduler; its description is announced to subscribers.
//! 3. Each scheduler tick reports price changes back to the engine, which persists the
//!    tick (when enabled), folds it into the day's OHLC and publishes a full snapshot.

use crate::model::aggregator::OhlcAggregator;
use crate::model::broadcaster::Broadcaster;
use crate::model::news_selector::NewsSelector;
use crate::model::planner::{ConvergenceJob, plan};
use crate::model::scheduler::{
    ConvergenceScheduler, JobPolicy, LivePrices, PriceUpdate, Submission, TickObserver,
};
use crate::store::MarketStore;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use log::{debug, error, info, warn};
use market_common::records::{NewsEvent, Price, StockView};
use market_common::{MarketEvent, Result};
use rand::Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Timing and policy knobs of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Period of the news loop.
    pub news_interval: Duration,
    /// Period of a convergence tick.
    pub tick_interval: Duration,
    /// Ticks a convergence job lives for.
    pub ticks_total: u32,
    /// Whether every tick is appended to the price history.
    pub persist_ticks: bool,
    /// What to do with news for a stock that is already converging.
    pub job_policy: JobPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            news_interval: Duration::from_secs(15),
            tick_interval: Duration::from_secs(2),
            ticks_total: 5,
            persist_ticks: true,
            job_policy: JobPolicy::Replace,
        }
    }
}

/// Result of one `poll_news` round.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The news pool is empty; nothing happened.
    NoNews,
    /// A job was planned for the drawn news item.
    Planned {
        /// Drawn news item.
        news: NewsEvent,
        /// Planned job.
        job: ConvergenceJob,
        /// What the scheduler did with it.
        submission: Submission,
    },
}

/// Read side shared by the engine and its tick observer.
struct Board<S> {
    store: Arc<S>,
    aggregator: OhlcAggregator<S>,
    prices: LivePrices,
}

impl<S: MarketStore> Board<S> {
    fn current_price(&self, stock_id: i64) -> Price {
        self.prices
            .get(stock_id)
            .unwrap_or_else(|| self.aggregator.last_price_for_latest_day(stock_id))
    }

    fn snapshot(&self) -> Vec<StockView> {
        self.store
            .list_stocks()
            .into_iter()
            .map(|stock| StockView {
                price: self.current_price(stock.stock_id),
                name: stock.code_name,
            })
            .collect()
    }
}

/// Tick side effects: persistence, OHLC and broadcast.
struct EngineObserver<S> {
    board: Arc<Board<S>>,
    broadcaster: Broadcaster,
    persist_ticks: bool,
}

impl<S: MarketStore> TickObserver for EngineObserver<S> {
    fn price_changed(&self, update: &PriceUpdate) {
        let store = &self.board.store;
        let Some(day) = self.board.aggregator.current_day(update.stock_id) else {
            warn!(
                "Stock {} has no trading day; tick at {} not recorded",
                update.stock_id, update.price
            );
            return;
        };

        if self.persist_ticks
            && !store.append_tick(day.stock_detail_id, update.price, Utc::now())
        {
            warn!("Tick of stock {} was not persisted", update.stock_id);
        }
        self.board
            .aggregator
            .update(update.stock_id, day.stock_date, update.price);
    }

    fn tick_finished(&self, _updates: &[PriceUpdate]) {
        self.broadcaster.publish(self.board.snapshot());
    }
}

/// Stock market feed simulator.
pub struct MarketEngine<S: MarketStore + 'static> {
    board: Arc<Board<S>>,
    selector: NewsSelector<S>,
    scheduler: ConvergenceScheduler,
    broadcaster: Broadcaster,
    settings: EngineSettings,
    news_loop: Mutex<Option<Sender<()>>>,
}

impl<S: MarketStore + 'static> MarketEngine<S> {
    /// Assemble an engine. Nothing runs until `start`.
    pub fn new(store: Arc<S>, broadcaster: Broadcaster, settings: EngineSettings) -> Self {
        let prices = LivePrices::default();
        let board = Arc::new(Board {
            aggregator: OhlcAggregator::new(Arc::clone(&store)),
            store: Arc::clone(&store),
            prices: prices.clone(),
        });
        let observer = Arc::new(EngineObserver {
            board: Arc::clone(&board),
            broadcaster: broadcaster.clone(),
            persist_ticks: settings.persist_ticks,
        });
        let scheduler = ConvergenceScheduler::new(
            settings.tick_interval,
            settings.job_policy,
            prices,
            observer,
        );

        Self {
            board,
            selector: NewsSelector::new(store),
            scheduler,
            broadcaster,
            settings,
            news_loop: Mutex::new(None),
        }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.board.store
    }

    /// OHLC aggregator writing through the store.
    pub fn aggregator(&self) -> &OhlcAggregator<S> {
        &self.board.aggregator
    }

    /// Convergence scheduler.
    pub fn scheduler(&self) -> &ConvergenceScheduler {
        &self.scheduler
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start the news loop. Calling it on a running engine is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut news_loop = self.news_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if news_loop.is_some() {
            debug!("Market engine is already running");
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticks = tick(self.settings.news_interval);
        let engine = Arc::clone(self);
        thread::spawn(move || {
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticks) -> _ => {
                        if let Err(e) = engine.poll_news() {
                            error!("News poll failed: {}", e);
                        }
                    }
                }
            }
            info!("News loop stopped");
        });
        *news_loop = Some(stop_tx);

        info!(
            "Market engine started: news every {:?}, tick every {:?}, {} tick(s) per job, policy {}",
            self.settings.news_interval,
            self.settings.tick_interval,
            self.settings.ticks_total,
            self.settings.job_policy
        );
    }

    /// `true` while the news loop runs.
    pub fn is_started(&self) -> bool {
        self.news_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop the news loop and abort running jobs without waiting for an in-flight
    /// tick. Idempotent.
    pub fn stop(&self) {
        let stopped = self
            .news_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.scheduler.stop();
        if stopped.is_some() {
            info!("Market engine stopped");
        }
    }

    /// One news round with the thread-local random source.
    pub fn poll_news(&self) -> Result<PollOutcome> {
        self.poll_news_with(&mut rand::rng())
    }

    /// One news round: draw news, plan a job from the current price, submit it and
    /// announce the news unless the job was dropped.
    pub fn poll_news_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PollOutcome> {
        let Some(news) = self.selector.select_with(rng) else {
            return Ok(PollOutcome::NoNews);
        };

        let current_price = self.board.current_price(news.stock_id);
        let job = plan(
            news.stock_id,
            current_price,
            news.value_fluctuation,
            self.settings.ticks_total,
        )?;
        info!(
            "News {} for stock {}: \"{}\" ({:+}%)",
            news.news_id, news.stock_id, news.description, news.value_fluctuation
        );

        let submission = self.scheduler.submit(job.clone());
        if submission != Submission::Dropped {
            self.broadcaster.announce(news.description.clone());
        }
        Ok(PollOutcome::Planned {
            news,
            job,
            submission,
        })
    }

    /// Live price of a stock, falling back to the last recorded price of its latest
    /// trading day.
    pub fn current_price(&self, stock_id: i64) -> Price {
        self.board.current_price(stock_id)
    }

    /// Every stock with its current price, ordered by stock id.
    pub fn snapshot(&self) -> Vec<StockView> {
        self.board.snapshot()
    }

    /// A random news item, `None` when there is none.
    pub fn random_news(&self) -> Option<NewsEvent> {
        self.selector.select_random_news()
    }

    /// Subscribe to the event feed. The first event is the current snapshot.
    pub fn subscribe(&self) -> Receiver<MarketEvent> {
        self.broadcaster.subscribe(self.snapshot())
    }

    /// Open trading days at startup and return how many were opened.
    ///
    /// Stocks without any trading day always get their first one. With `new_day` every
    /// other stock also moves on to a fresh day opening at its last price; when ticks
    /// are persisted, the closing day's aggregates are first rebuilt from its ticks.
    pub fn open_trading_days(&self, new_day: bool) -> usize {
        let store = &self.board.store;
        let aggregator = &self.board.aggregator;
        let mut opened = 0;
        for stock in store.list_stocks() {
            match store.latest_stock_date(stock.stock_id) {
                Some(_) if !new_day => continue,
                Some(stock_date) if self.settings.persist_ticks => {
                    aggregator.recompute(stock.stock_id, stock_date);
                }
                _ => {}
            }
            if aggregator.create_new_day(stock.stock_id, None).is_some() {
                opened += 1;
            }
        }
        if opened > 0 {
            info!("Opened {opened} trading day(s)");
        }
        opened
    }
}
