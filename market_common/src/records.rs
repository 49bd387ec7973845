//! Typed market records shared between client and server.
//!
//! Prices live in an integer domain: every price is a whole number of currency units.
//! Highest/lowest/close aggregates of a trading day start out unset (`None`) and are only
//! filled in once the first tick of the day arrives.

use serde::{Deserialize, Serialize};

/// Integer price domain used throughout the simulation.
pub type Price = i64;

/// A listed stock. Identity fields never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    /// Primary key.
    pub stock_id: i64,
    /// Unique short code, also used as the public name in snapshots.
    pub code_name: String,
    /// Full company name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Number of issued shares.
    pub total_shares: i64,
}

/// Attributes of a stock that is about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStock {
    /// Unique short code.
    pub code_name: String,
    /// Full company name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Number of issued shares.
    pub total_shares: i64,
}

/// Per-day price range of a stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDetail {
    /// Primary key.
    pub stock_detail_id: i64,
    /// Owning stock.
    pub stock_id: i64,
    /// Trading day counter, strictly increasing per stock.
    pub stock_date: i64,
    /// Price the day opened with. Set once when the day is created.
    pub open_price: Price,
    /// Highest price seen during the day.
    pub highest_price: Option<Price>,
    /// Lowest price seen during the day.
    pub lowest_price: Option<Price>,
    /// Most recent price of the day.
    pub close_price: Option<Price>,
}

impl StockDetail {
    /// Fold a new tick price into the day's aggregates.
    ///
    /// `open_price` is never touched; `close_price` always becomes `price`.
    pub fn apply_price(&mut self, price: Price) {
        self.highest_price = Some(self.highest_price.map_or(price, |high| high.max(price)));
        self.lowest_price = Some(self.lowest_price.map_or(price, |low| low.min(price)));
        self.close_price = Some(price);
    }
}

/// A single persisted price tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPriceDetail {
    /// Primary key.
    pub stock_price_detail_id: i64,
    /// Trading day the tick belongs to.
    pub stock_detail_id: i64,
    /// Price at `price_time`.
    pub price: Price,
    /// UTC timestamp in milliseconds since Unix epoch.
    pub price_time: i64,
}

/// A news item that moves a single stock by a signed percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvent {
    /// Primary key.
    pub news_id: i64,
    /// Affected stock.
    pub stock_id: i64,
    /// Headline shown to clients.
    pub description: String,
    /// Signed percentage, e.g. `5.0` or `-3.2`.
    pub value_fluctuation: f64,
}

/// Public projection of a stock sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    /// Stock code name.
    pub name: String,
    /// Current price.
    pub price: Price,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_day() -> StockDetail {
        StockDetail {
            stock_detail_id: 1,
            stock_id: 1,
            stock_date: 1,
            open_price: 100,
            highest_price: None,
            lowest_price: None,
            close_price: None,
        }
    }

    #[test]
    fn first_tick_fills_every_aggregate() {
        let mut day = fresh_day();
        day.apply_price(42);
        assert_eq!(day.highest_price, Some(42));
        assert_eq!(day.lowest_price, Some(42));
        assert_eq!(day.close_price, Some(42));
        assert_eq!(day.open_price, 100);
    }

    #[test]
    fn low_positive_price_is_not_hidden_by_unset_low() {
        let mut day = fresh_day();
        day.apply_price(5);
        day.apply_price(3);
        day.apply_price(8);
        assert_eq!(day.lowest_price, Some(3));
        assert_eq!(day.highest_price, Some(8));
        assert_eq!(day.close_price, Some(8));
    }

    #[test]
    fn close_stays_within_range() {
        let mut day = fresh_day();
        for price in [110, 95, 120, 101, 99] {
            day.apply_price(price);
            let (low, close, high) = (
                day.lowest_price.unwrap(),
                day.close_price.unwrap(),
                day.highest_price.unwrap(),
            );
            assert!(low <= close && close <= high);
        }
    }

    #[test]
    fn stock_view_serializes_name_and_price_only() {
        let view = StockView {
            name: "BBCA".into(),
            price: 9100,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(json, r#"{"name":"BBCA","price":9100}"#);
    }
}
