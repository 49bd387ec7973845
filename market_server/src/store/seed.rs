//! Market setup from a JSON seed file.
//!
//! ```json
//! {
//!   "stocks": [
//!     { "code_name": "BBCA", "name": "Bank Central Asia", "total_shares": 1000000, "open_price": 9100 }
//!   ],
//!   "news": [
//!     { "code_name": "BBCA", "description": "Record quarterly profit", "value_fluctuation": 5.0 }
//!   ]
//! }
//! ```
//!
//! Every stock is created and its first trading day opened at `open_price`. News items
//! point at stocks by code name.

use super::MarketStore;
use crate::error::StoreError;
use crate::model::aggregator::OhlcAggregator;
use log::info;
use market_common::records::{NewStock, Price};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Stock entry of a seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedStock {
    /// Stock attributes.
    #[serde(flatten)]
    pub stock: NewStock,
    /// Opening price of the first trading day.
    pub open_price: Price,
}

/// News entry of a seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedNews {
    /// Code name of the affected stock.
    pub code_name: String,
    /// Headline.
    pub description: String,
    /// Signed percentage.
    pub value_fluctuation: f64,
}

/// Parsed seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSeed {
    /// Stocks to list.
    pub stocks: Vec<SeedStock>,
    /// News pool.
    #[serde(default)]
    pub news: Vec<SeedNews>,
}

/// Counts of what a seed created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    /// Stocks created.
    pub stocks: usize,
    /// News items created.
    pub news: usize,
}

impl MarketSeed {
    /// Read and parse a seed file.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a seed document.
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Write the seed through `aggregator`'s store.
    ///
    /// News referring to a code name that is neither in the seed nor already stored
    /// aborts the seed with `UnknownSeedStock`.
    pub fn apply<S: MarketStore>(
        &self,
        aggregator: &OhlcAggregator<S>,
    ) -> Result<SeedReport, StoreError> {
        let store = aggregator.store();
        let mut ids: HashMap<&str, i64> = HashMap::new();

        for seed in &self.stocks {
            let stock_id = store
                .create_stock(&seed.stock)
                .ok_or_else(|| StoreError::SeedRejected(seed.stock.code_name.clone()))?;
            aggregator
                .create_new_day(stock_id, Some(seed.open_price))
                .ok_or_else(|| StoreError::SeedRejected(seed.stock.code_name.clone()))?;
            ids.insert(seed.stock.code_name.as_str(), stock_id);
        }

        for news in &self.news {
            let stock_id = match ids.get(news.code_name.as_str()) {
                Some(id) => *id,
                None => store
                    .stock_id_by_code_name(&news.code_name)
                    .ok_or_else(|| StoreError::UnknownSeedStock(news.code_name.clone()))?,
            };
            store
                .create_news(stock_id, &news.description, news.value_fluctuation)
                .ok_or_else(|| StoreError::SeedRejected(news.description.clone()))?;
        }

        let report = SeedReport {
            stocks: self.stocks.len(),
            news: self.news.len(),
        };
        info!(
            "Seeded {} stocks and {} news items",
            report.stocks, report.news
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::tests::temp_store;
    use crate::store::{NewsStore, StockStore};
    use std::sync::Arc;

    const SEED: &str = r#"{
        "stocks": [
            { "code_name": "BBCA", "name": "Bank Central Asia", "total_shares": 1000, "open_price": 9100 },
            { "code_name": "TLKM", "name": "Telkom", "description": "Telco", "total_shares": 500, "open_price": 3200 }
        ],
        "news": [
            { "code_name": "TLKM", "description": "Network outage", "value_fluctuation": -4.0 }
        ]
    }"#;

    #[test]
    fn seeds_stocks_days_and_news() {
        let (_dir, store) = temp_store();
        let aggregator = OhlcAggregator::new(Arc::new(store));
        let report = MarketSeed::from_json(SEED).unwrap().apply(&aggregator).unwrap();
        assert_eq!(report, SeedReport { stocks: 2, news: 1 });

        let store = aggregator.store();
        let tlkm = store.stock_id_by_code_name("TLKM").unwrap();
        let day = store.stock_detail(tlkm, 1).unwrap();
        assert_eq!(day.open_price, 3200);
        assert_eq!(store.list_news()[0].stock_id, tlkm);
    }

    #[test]
    fn news_for_unknown_stock_is_rejected() {
        let (_dir, store) = temp_store();
        let aggregator = OhlcAggregator::new(Arc::new(store));
        let seed = MarketSeed::from_json(
            r#"{ "stocks": [], "news": [{ "code_name": "NOPE", "description": "x", "value_fluctuation": 1.0 }] }"#,
        )
        .unwrap();
        assert!(matches!(
            seed.apply(&aggregator),
            Err(StoreError::UnknownSeedStock(code)) if code == "NOPE"
        ));
    }
}
