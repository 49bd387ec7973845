//! Per-day OHLC bookkeeping.
//!
//! `OhlcAggregator` owns every write to the highest/lowest/close columns of a trading
//! day. Writes are serialized through one lock, so two updates for the same
//! (stock, day) can never interleave their read-modify-write cycles.

use crate::store::{PriceStore, StockStore};
use log::{debug, info, warn};
use market_common::records::{Price, StockDetail};
use std::sync::{Arc, Mutex, MutexGuard};

/// `stock_date` a stock without any trading day counts up from.
pub const BASE_STOCK_DATE: i64 = 0;

/// Maintains open/high/low/close aggregates of trading days.
pub struct OhlcAggregator<S> {
    store: Arc<S>,
    write_lock: Mutex<()>,
}

impl<S: StockStore + PriceStore> OhlcAggregator<S> {
    /// Create an aggregator writing through `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Store the aggregator writes through.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // the guarded value is `()`, a poisoned lock carries no broken state
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fold `new_price` into the aggregates of (`stock_id`, `stock_date`).
    ///
    /// Returns the updated day, or `None` when the day does not exist or the write
    /// failed.
    pub fn update(&self, stock_id: i64, stock_date: i64, new_price: Price) -> Option<StockDetail> {
        let _guard = self.lock();
        let Some(mut day) = self.store.stock_detail(stock_id, stock_date) else {
            warn!("No stock detail for stock_id {stock_id} on day {stock_date}");
            return None;
        };
        day.apply_price(new_price);
        if !self.store.upsert_aggregate(
            stock_id,
            stock_date,
            day.highest_price,
            day.lowest_price,
            day.close_price,
        ) {
            return None;
        }
        debug!(
            "Stock {} day {}: high={:?} low={:?} close={:?}",
            stock_id, stock_date, day.highest_price, day.lowest_price, day.close_price
        );
        Some(day)
    }

    /// Open the next trading day of a stock.
    ///
    /// The new `stock_date` is the latest one plus one (`BASE_STOCK_DATE + 1` for the
    /// first day). The open price is `open_override` if given, otherwise the last price
    /// of the latest day, or `0` for a stock that never traded.
    pub fn create_new_day(&self, stock_id: i64, open_override: Option<Price>) -> Option<StockDetail> {
        let _guard = self.lock();
        self.open_day(stock_id, open_override)
    }

    /// Latest trading day of a stock, opening the first one if it has none.
    ///
    /// The lookup and the insert happen under the write lock, so concurrent callers
    /// never open two days.
    pub fn current_day(&self, stock_id: i64) -> Option<StockDetail> {
        let _guard = self.lock();
        match self.store.latest_stock_date(stock_id) {
            Some(stock_date) => self.store.stock_detail(stock_id, stock_date),
            None => self.open_day(stock_id, None),
        }
    }

    // caller holds the write lock
    fn open_day(&self, stock_id: i64, open_override: Option<Price>) -> Option<StockDetail> {
        if self.store.get_stock(stock_id).is_none() {
            warn!("Cannot open a trading day: no stock with stock_id {stock_id}");
            return None;
        }
        let open_price = open_override.unwrap_or_else(|| self.last_price_for_latest_day(stock_id));
        let stock_date = self
            .store
            .latest_stock_date(stock_id)
            .unwrap_or(BASE_STOCK_DATE)
            + 1;

        let day = self
            .store
            .insert_stock_detail(stock_id, stock_date, open_price)?;
        info!("Opened day {stock_date} for stock_id {stock_id} at {open_price}");
        Some(day)
    }

    /// Last known price of the stock's latest trading day.
    ///
    /// Prefers the latest persisted tick, then the day's close aggregate, then its open
    /// price. `0` when the stock has no trading day.
    pub fn last_price_for_latest_day(&self, stock_id: i64) -> Price {
        let Some(stock_date) = self.store.latest_stock_date(stock_id) else {
            debug!("No stock day found for stock_id {stock_id}");
            return 0;
        };
        if let Some(tick) = self.store.latest_tick(stock_id, stock_date) {
            return tick.price;
        }
        self.store
            .stock_detail(stock_id, stock_date)
            .map(|day| day.close_price.unwrap_or(day.open_price))
            .unwrap_or(0)
    }

    /// Rebuild highest/lowest/close of a day from its persisted ticks.
    ///
    /// A day without ticks is written back as unset.
    pub fn recompute(&self, stock_id: i64, stock_date: i64) -> Option<StockDetail> {
        let _guard = self.lock();
        let mut day = self.store.stock_detail(stock_id, stock_date)?;
        let (high, low, close) = match self.store.latest_tick(stock_id, stock_date) {
            None => (None, None, None),
            Some(last) => (
                Some(self.store.highest(stock_id, stock_date)),
                Some(self.store.lowest(stock_id, stock_date)),
                Some(last.price),
            ),
        };
        if !self.store.upsert_aggregate(stock_id, stock_date, high, low, close) {
            return None;
        }
        day.highest_price = high;
        day.lowest_price = low;
        day.close_price = close;
        Some(day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::tests::{new_stock, temp_store};
    use crate::store::{SqliteStore, StockStore};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn aggregator() -> (TempDir, OhlcAggregator<SqliteStore>, i64) {
        let (dir, store) = temp_store();
        let stock_id = store.create_stock(&new_stock("BMRI")).unwrap();
        (dir, OhlcAggregator::new(Arc::new(store)), stock_id)
    }

    #[test]
    fn first_day_defaults_open_to_zero() {
        let (_dir, agg, stock_id) = aggregator();
        let day = agg.create_new_day(stock_id, None).unwrap();
        assert_eq!(day.stock_date, BASE_STOCK_DATE + 1);
        assert_eq!(day.open_price, 0);
    }

    #[test]
    fn unknown_stock_has_no_new_day() {
        let (_dir, agg, _) = aggregator();
        assert_eq!(agg.create_new_day(404, Some(10)), None);
    }

    #[test]
    fn next_day_opens_at_previous_last_tick() {
        let (_dir, agg, stock_id) = aggregator();
        let first = agg.create_new_day(stock_id, Some(100)).unwrap();
        let store = agg.store();
        store.append_tick(first.stock_detail_id, 104, Utc.timestamp_millis_opt(1).unwrap());
        store.append_tick(first.stock_detail_id, 98, Utc.timestamp_millis_opt(2).unwrap());

        let second = agg.create_new_day(stock_id, None).unwrap();
        assert_eq!(second.stock_date, 2);
        assert_eq!(second.open_price, 98);
        let third = agg.create_new_day(stock_id, None).unwrap();
        assert_eq!(third.stock_date, 3);
        assert_eq!(third.open_price, 98);
    }

    #[test]
    fn update_tracks_range_and_close() {
        let (_dir, agg, stock_id) = aggregator();
        agg.create_new_day(stock_id, Some(100)).unwrap();
        for price in [102, 97, 105, 99] {
            agg.update(stock_id, 1, price).unwrap();
        }
        let day = agg.store().stock_detail(stock_id, 1).unwrap();
        assert_eq!(day.open_price, 100);
        assert_eq!(day.highest_price, Some(105));
        assert_eq!(day.lowest_price, Some(97));
        assert_eq!(day.close_price, Some(99));
    }

    #[test]
    fn update_of_missing_day_is_none() {
        let (_dir, agg, stock_id) = aggregator();
        assert_eq!(agg.update(stock_id, 7, 100), None);
    }

    #[test]
    fn recompute_rebuilds_from_ticks() {
        let (_dir, agg, stock_id) = aggregator();
        let day = agg.create_new_day(stock_id, Some(50)).unwrap();
        let empty = agg.recompute(stock_id, 1).unwrap();
        assert_eq!(empty.highest_price, None);

        let store = agg.store();
        for (ms, price) in [(1, 52), (2, 49), (3, 51)] {
            store.append_tick(day.stock_detail_id, price, Utc.timestamp_millis_opt(ms).unwrap());
        }
        let rebuilt = agg.recompute(stock_id, 1).unwrap();
        assert_eq!(rebuilt.highest_price, Some(52));
        assert_eq!(rebuilt.lowest_price, Some(49));
        assert_eq!(rebuilt.close_price, Some(51));
        assert_eq!(store.stock_detail(stock_id, 1), Some(rebuilt));
    }

    #[test]
    fn zero_price_day_keeps_its_aggregates() {
        let (_dir, agg, stock_id) = aggregator();
        let day = agg.create_new_day(stock_id, Some(0)).unwrap();
        agg.store().append_tick(day.stock_detail_id, 0, Utc.timestamp_millis_opt(1).unwrap());
        let updated = agg.update(stock_id, 1, 0).unwrap();
        assert_eq!(updated.highest_price, Some(0));

        let rebuilt = agg.recompute(stock_id, 1).unwrap();
        assert_eq!(rebuilt.highest_price, Some(0));
        assert_eq!(rebuilt.lowest_price, Some(0));
        assert_eq!(rebuilt.close_price, Some(0));
        assert_eq!(agg.store().stock_detail(stock_id, 1), Some(rebuilt));
    }

    #[test]
    fn last_tick_at_zero_wins_over_open_price() {
        let (_dir, agg, stock_id) = aggregator();
        let day = agg.create_new_day(stock_id, Some(40)).unwrap();
        agg.store().append_tick(day.stock_detail_id, 0, Utc.timestamp_millis_opt(1).unwrap());
        assert_eq!(agg.last_price_for_latest_day(stock_id), 0);
        assert_eq!(agg.create_new_day(stock_id, None).unwrap().open_price, 0);
    }

    #[test]
    fn current_day_opens_once_under_contention() {
        let (_dir, agg, stock_id) = aggregator();
        let agg = Arc::new(agg);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || agg.current_day(stock_id).map(|d| d.stock_date))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(1));
        }
        assert_eq!(agg.store().latest_stock_date(stock_id), Some(1));
        assert_eq!(agg.current_day(404), None);
    }
}
