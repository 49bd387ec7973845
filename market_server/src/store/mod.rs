//! Storage collaborators of the simulation.
//!
//! The engine only talks to the three traits below. Implementations own their own
//! failure handling: a connection or query error is logged at the boundary and turned
//! into an empty value (`Vec::new()`, `None`, `0` or `false`), so the simulation never
//! has to deal with a storage error mid-tick.
//!
//! - `pool`: bounded SQLite connection pool with RAII release.
//! - `sqlite`: `SqliteStore`, the SQLite-backed implementation of all three traits.
//! - `seed`: market setup from a JSON seed file.

pub mod pool;
pub mod seed;
pub mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use market_common::records::{NewStock, NewsEvent, Price, Stock, StockDetail, StockPriceDetail};

/// Stocks and their per-day aggregates.
pub trait StockStore: Send + Sync {
    /// All stocks ordered by id.
    fn list_stocks(&self) -> Vec<Stock>;
    /// Look up one stock.
    fn get_stock(&self, stock_id: i64) -> Option<Stock>;
    /// Insert a stock and return its id.
    fn create_stock(&self, stock: &NewStock) -> Option<i64>;
    /// Resolve a unique code name to a stock id.
    fn stock_id_by_code_name(&self, code_name: &str) -> Option<i64>;
    /// Highest `stock_date` of the stock, `None` if it has no trading day yet.
    fn latest_stock_date(&self, stock_id: i64) -> Option<i64>;
    /// One trading day of a stock.
    fn stock_detail(&self, stock_id: i64, stock_date: i64) -> Option<StockDetail>;
    /// All trading days of a stock, oldest first.
    fn stock_details(&self, stock_id: i64) -> Vec<StockDetail>;
    /// Create a trading day with unset high/low/close.
    fn insert_stock_detail(
        &self,
        stock_id: i64,
        stock_date: i64,
        open_price: Price,
    ) -> Option<StockDetail>;
    /// Overwrite high/low/close of an existing trading day.
    fn upsert_aggregate(
        &self,
        stock_id: i64,
        stock_date: i64,
        highest: Option<Price>,
        lowest: Option<Price>,
        close: Option<Price>,
    ) -> bool;
    /// Remove a trading day together with its ticks.
    fn delete_stock_detail(&self, stock_id: i64, stock_date: i64) -> bool;
}

/// News items that drive price movements.
pub trait NewsStore: Send + Sync {
    /// Every stored news item.
    fn list_news(&self) -> Vec<NewsEvent>;
    /// Insert a news item and return its id.
    fn create_news(&self, stock_id: i64, description: &str, value_fluctuation: f64)
    -> Option<i64>;
    /// Rewrite a news item.
    fn update_news(
        &self,
        news_id: i64,
        stock_id: i64,
        description: &str,
        value_fluctuation: f64,
    ) -> bool;
    /// Remove a news item.
    fn delete_news(&self, news_id: i64) -> bool;
}

/// Tick-level price records.
pub trait PriceStore: Send + Sync {
    /// Latest tick price of the day by `price_time`, `0` when the day has no ticks.
    fn last_price(&self, stock_id: i64, stock_date: i64) -> Price;
    /// Highest tick price of the day, `0` when the day has no ticks.
    fn highest(&self, stock_id: i64, stock_date: i64) -> Price;
    /// Lowest tick price of the day, `0` when the day has no ticks.
    fn lowest(&self, stock_id: i64, stock_date: i64) -> Price;
    /// Latest tick of the day by `price_time`, `None` when the day has no ticks.
    fn latest_tick(&self, stock_id: i64, stock_date: i64) -> Option<StockPriceDetail>;
    /// Append a tick to a trading day.
    fn append_tick(&self, stock_detail_id: i64, price: Price, time: DateTime<Utc>) -> bool;
    /// Correct the price of the tick recorded at `time` on a trading day.
    fn update_tick(&self, stock_detail_id: i64, time: DateTime<Utc>, price: Price) -> bool;
    /// Remove the tick recorded at `time` on a trading day.
    fn delete_tick(&self, stock_detail_id: i64, time: DateTime<Utc>) -> bool;
    /// All ticks of the day in `price_time` order.
    fn prices_for_day(&self, stock_id: i64, stock_date: i64) -> Vec<StockPriceDetail>;
}

/// Everything the engine needs from storage.
pub trait MarketStore: StockStore + NewsStore + PriceStore {}

impl<T: StockStore + NewsStore + PriceStore> MarketStore for T {}
