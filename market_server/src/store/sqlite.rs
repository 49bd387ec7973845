//! SQLite-backed implementation of the storage traits using `rusqlite`.
//!
//! Every trait method borrows a connection from the pool for the duration of a single
//! statement (or a short sequence of them) and maps rows into typed records. Errors are
//! logged here and replaced by the trait's empty value.

use super::pool::ConnectionPool;
use super::{NewsStore, PriceStore, StockStore};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use log::error;
use market_common::records::{NewStock, NewsEvent, Price, Stock, StockDetail, StockPriceDetail};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    CREATE TABLE IF NOT EXISTS stock (
        stock_id            INTEGER PRIMARY KEY AUTOINCREMENT,
        stock_code_name     TEXT NOT NULL UNIQUE,
        stock_name          TEXT NOT NULL,
        stock_description   TEXT NOT NULL DEFAULT '',
        stock_total_shares  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS stock_detail (
        stock_detail_id     INTEGER PRIMARY KEY AUTOINCREMENT,
        stock_id            INTEGER NOT NULL REFERENCES stock(stock_id) ON DELETE CASCADE,
        stock_date          INTEGER NOT NULL,
        stock_open_price    INTEGER NOT NULL,
        stock_highest_price INTEGER,
        stock_lowest_price  INTEGER,
        stock_close_price   INTEGER,
        UNIQUE (stock_id, stock_date)
    );
    CREATE TABLE IF NOT EXISTS stock_price_detail (
        stock_price_detail_id INTEGER PRIMARY KEY AUTOINCREMENT,
        stock_detail_id       INTEGER NOT NULL
                              REFERENCES stock_detail(stock_detail_id) ON DELETE CASCADE,
        stock_price           INTEGER NOT NULL,
        stock_price_time      INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_price_detail_time
        ON stock_price_detail (stock_detail_id, stock_price_time);
    CREATE TABLE IF NOT EXISTS news (
        news_id                INTEGER PRIMARY KEY AUTOINCREMENT,
        stock_id               INTEGER NOT NULL REFERENCES stock(stock_id) ON DELETE CASCADE,
        news_description       TEXT NOT NULL,
        news_value_fluctuation REAL NOT NULL
    );
";

const STOCK_COLUMNS: &str =
    "stock_id, stock_code_name, stock_name, stock_description, stock_total_shares";
const DETAIL_COLUMNS: &str = "stock_detail_id, stock_id, stock_date, stock_open_price, \
     stock_highest_price, stock_lowest_price, stock_close_price";

/// Stock, news and price store on top of a single SQLite database file.
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` with `pool_size` connections and make
    /// sure the schema exists.
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StoreError> {
        let pool = ConnectionPool::open(path.as_ref(), pool_size)?;
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// `true` when no stock has been created yet.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stock", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Run `op` on a pooled connection, logging any failure and returning `fallback`.
    fn run<T>(
        &self,
        what: &str,
        fallback: T,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> T {
        let result = self
            .pool
            .get()
            .and_then(|conn| op(&conn).map_err(StoreError::from));
        match result {
            Ok(value) => value,
            Err(e) => {
                error!("Error {}: {}", what, e);
                fallback
            }
        }
    }

    fn price_aggregate(&self, what: &str, sql: &str, stock_id: i64, stock_date: i64) -> Price {
        self.run(what, 0, |conn| {
            conn.query_row(sql, params![stock_id, stock_date], |row| {
                row.get::<_, Option<Price>>(0)
            })
            .optional()
            .map(|price| price.flatten().unwrap_or(0))
        })
    }
}

fn stock_from_row(row: &Row<'_>) -> rusqlite::Result<Stock> {
    Ok(Stock {
        stock_id: row.get(0)?,
        code_name: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        total_shares: row.get(4)?,
    })
}

fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<StockDetail> {
    Ok(StockDetail {
        stock_detail_id: row.get(0)?,
        stock_id: row.get(1)?,
        stock_date: row.get(2)?,
        open_price: row.get(3)?,
        highest_price: row.get(4)?,
        lowest_price: row.get(5)?,
        close_price: row.get(6)?,
    })
}

fn news_from_row(row: &Row<'_>) -> rusqlite::Result<NewsEvent> {
    Ok(NewsEvent {
        news_id: row.get(0)?,
        stock_id: row.get(1)?,
        description: row.get(2)?,
        value_fluctuation: row.get(3)?,
    })
}

fn tick_from_row(row: &Row<'_>) -> rusqlite::Result<StockPriceDetail> {
    Ok(StockPriceDetail {
        stock_price_detail_id: row.get(0)?,
        stock_detail_id: row.get(1)?,
        price: row.get(2)?,
        price_time: row.get(3)?,
    })
}

impl StockStore for SqliteStore {
    fn list_stocks(&self) -> Vec<Stock> {
        self.run("fetching stocks", Vec::new(), |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {STOCK_COLUMNS} FROM stock ORDER BY stock_id"))?;
            let rows = stmt.query_map([], stock_from_row)?;
            rows.collect()
        })
    }

    fn get_stock(&self, stock_id: i64) -> Option<Stock> {
        self.run(&format!("fetching stock {stock_id}"), None, |conn| {
            conn.query_row(
                &format!("SELECT {STOCK_COLUMNS} FROM stock WHERE stock_id = ?1"),
                params![stock_id],
                stock_from_row,
            )
            .optional()
        })
    }

    fn create_stock(&self, stock: &NewStock) -> Option<i64> {
        self.run(&format!("creating stock {}", stock.code_name), None, |conn| {
            conn.execute(
                "INSERT INTO stock (stock_code_name, stock_name, stock_description, stock_total_shares)
                 VALUES (?1, ?2, ?3, ?4)",
                params![stock.code_name, stock.name, stock.description, stock.total_shares],
            )?;
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    fn stock_id_by_code_name(&self, code_name: &str) -> Option<i64> {
        self.run(&format!("fetching stock id of {code_name}"), None, |conn| {
            conn.query_row(
                "SELECT stock_id FROM stock WHERE stock_code_name = ?1",
                params![code_name],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn latest_stock_date(&self, stock_id: i64) -> Option<i64> {
        self.run(
            &format!("fetching latest stock date for stock {stock_id}"),
            None,
            |conn| {
                conn.query_row(
                    "SELECT MAX(stock_date) FROM stock_detail WHERE stock_id = ?1",
                    params![stock_id],
                    |row| row.get(0),
                )
            },
        )
    }

    fn stock_detail(&self, stock_id: i64, stock_date: i64) -> Option<StockDetail> {
        self.run(
            &format!("fetching stock detail {stock_id}/{stock_date}"),
            None,
            |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {DETAIL_COLUMNS} FROM stock_detail
                         WHERE stock_id = ?1 AND stock_date = ?2"
                    ),
                    params![stock_id, stock_date],
                    detail_from_row,
                )
                .optional()
            },
        )
    }

    fn stock_details(&self, stock_id: i64) -> Vec<StockDetail> {
        self.run(
            &format!("fetching stock details for stock {stock_id}"),
            Vec::new(),
            |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DETAIL_COLUMNS} FROM stock_detail
                     WHERE stock_id = ?1 ORDER BY stock_date"
                ))?;
                let rows = stmt.query_map(params![stock_id], detail_from_row)?;
                rows.collect()
            },
        )
    }

    fn insert_stock_detail(
        &self,
        stock_id: i64,
        stock_date: i64,
        open_price: Price,
    ) -> Option<StockDetail> {
        self.run(
            &format!("creating stock detail {stock_id}/{stock_date}"),
            None,
            |conn| {
                conn.execute(
                    "INSERT INTO stock_detail (stock_id, stock_date, stock_open_price)
                     VALUES (?1, ?2, ?3)",
                    params![stock_id, stock_date, open_price],
                )?;
                Ok(Some(StockDetail {
                    stock_detail_id: conn.last_insert_rowid(),
                    stock_id,
                    stock_date,
                    open_price,
                    highest_price: None,
                    lowest_price: None,
                    close_price: None,
                }))
            },
        )
    }

    fn upsert_aggregate(
        &self,
        stock_id: i64,
        stock_date: i64,
        highest: Option<Price>,
        lowest: Option<Price>,
        close: Option<Price>,
    ) -> bool {
        self.run(
            &format!("updating stock detail {stock_id}/{stock_date}"),
            false,
            |conn| {
                let updated = conn.execute(
                    "UPDATE stock_detail
                     SET stock_highest_price = ?1, stock_lowest_price = ?2, stock_close_price = ?3
                     WHERE stock_id = ?4 AND stock_date = ?5",
                    params![highest, lowest, close, stock_id, stock_date],
                )?;
                Ok(updated == 1)
            },
        )
    }

    fn delete_stock_detail(&self, stock_id: i64, stock_date: i64) -> bool {
        self.run(
            &format!("deleting stock detail {stock_id}/{stock_date}"),
            false,
            |conn| {
                let deleted = conn.execute(
                    "DELETE FROM stock_detail WHERE stock_id = ?1 AND stock_date = ?2",
                    params![stock_id, stock_date],
                )?;
                Ok(deleted == 1)
            },
        )
    }
}

impl NewsStore for SqliteStore {
    fn list_news(&self) -> Vec<NewsEvent> {
        self.run("fetching news", Vec::new(), |conn| {
            let mut stmt = conn.prepare(
                "SELECT news_id, stock_id, news_description, news_value_fluctuation
                 FROM news ORDER BY news_id",
            )?;
            let rows = stmt.query_map([], news_from_row)?;
            rows.collect()
        })
    }

    fn create_news(
        &self,
        stock_id: i64,
        description: &str,
        value_fluctuation: f64,
    ) -> Option<i64> {
        self.run(&format!("creating news for stock {stock_id}"), None, |conn| {
            conn.execute(
                "INSERT INTO news (stock_id, news_description, news_value_fluctuation)
                 VALUES (?1, ?2, ?3)",
                params![stock_id, description, value_fluctuation],
            )?;
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    fn update_news(
        &self,
        news_id: i64,
        stock_id: i64,
        description: &str,
        value_fluctuation: f64,
    ) -> bool {
        self.run(&format!("updating news {news_id}"), false, |conn| {
            let updated = conn.execute(
                "UPDATE news
                 SET stock_id = ?1, news_description = ?2, news_value_fluctuation = ?3
                 WHERE news_id = ?4",
                params![stock_id, description, value_fluctuation, news_id],
            )?;
            Ok(updated == 1)
        })
    }

    fn delete_news(&self, news_id: i64) -> bool {
        self.run(&format!("deleting news {news_id}"), false, |conn| {
            let deleted = conn.execute("DELETE FROM news WHERE news_id = ?1", params![news_id])?;
            Ok(deleted == 1)
        })
    }
}

impl PriceStore for SqliteStore {
    fn last_price(&self, stock_id: i64, stock_date: i64) -> Price {
        self.latest_tick(stock_id, stock_date)
            .map_or(0, |tick| tick.price)
    }

    fn highest(&self, stock_id: i64, stock_date: i64) -> Price {
        self.price_aggregate(
            &format!("fetching highest price for {stock_id}/{stock_date}"),
            "SELECT MAX(spd.stock_price)
             FROM stock_price_detail spd
             JOIN stock_detail sd ON spd.stock_detail_id = sd.stock_detail_id
             WHERE sd.stock_id = ?1 AND sd.stock_date = ?2",
            stock_id,
            stock_date,
        )
    }

    fn lowest(&self, stock_id: i64, stock_date: i64) -> Price {
        self.price_aggregate(
            &format!("fetching lowest price for {stock_id}/{stock_date}"),
            "SELECT MIN(spd.stock_price)
             FROM stock_price_detail spd
             JOIN stock_detail sd ON spd.stock_detail_id = sd.stock_detail_id
             WHERE sd.stock_id = ?1 AND sd.stock_date = ?2",
            stock_id,
            stock_date,
        )
    }

    fn latest_tick(&self, stock_id: i64, stock_date: i64) -> Option<StockPriceDetail> {
        self.run(
            &format!("fetching latest tick for {stock_id}/{stock_date}"),
            None,
            |conn| {
                conn.query_row(
                    "SELECT spd.stock_price_detail_id, spd.stock_detail_id,
                            spd.stock_price, spd.stock_price_time
                     FROM stock_price_detail spd
                     JOIN stock_detail sd ON spd.stock_detail_id = sd.stock_detail_id
                     WHERE sd.stock_id = ?1 AND sd.stock_date = ?2
                     ORDER BY spd.stock_price_time DESC, spd.stock_price_detail_id DESC
                     LIMIT 1",
                    params![stock_id, stock_date],
                    tick_from_row,
                )
                .optional()
            },
        )
    }

    fn update_tick(&self, stock_detail_id: i64, time: DateTime<Utc>, price: Price) -> bool {
        self.run(
            &format!("updating price tick for stock detail {stock_detail_id}"),
            false,
            |conn| {
                let updated = conn.execute(
                    "UPDATE stock_price_detail SET stock_price = ?1
                     WHERE stock_detail_id = ?2 AND stock_price_time = ?3",
                    params![price, stock_detail_id, time.timestamp_millis()],
                )?;
                Ok(updated > 0)
            },
        )
    }

    fn delete_tick(&self, stock_detail_id: i64, time: DateTime<Utc>) -> bool {
        self.run(
            &format!("deleting price tick for stock detail {stock_detail_id}"),
            false,
            |conn| {
                let deleted = conn.execute(
                    "DELETE FROM stock_price_detail
                     WHERE stock_detail_id = ?1 AND stock_price_time = ?2",
                    params![stock_detail_id, time.timestamp_millis()],
                )?;
                Ok(deleted > 0)
            },
        )
    }

    fn append_tick(&self, stock_detail_id: i64, price: Price, time: DateTime<Utc>) -> bool {
        self.run(
            &format!("inserting price tick for stock detail {stock_detail_id}"),
            false,
            |conn| {
                conn.execute(
                    "INSERT INTO stock_price_detail (stock_detail_id, stock_price, stock_price_time)
                     VALUES (?1, ?2, ?3)",
                    params![stock_detail_id, price, time.timestamp_millis()],
                )?;
                Ok(true)
            },
        )
    }

    fn prices_for_day(&self, stock_id: i64, stock_date: i64) -> Vec<StockPriceDetail> {
        self.run(
            &format!("fetching prices for {stock_id}/{stock_date}"),
            Vec::new(),
            |conn| {
                let mut stmt = conn.prepare(
                    "SELECT spd.stock_price_detail_id, spd.stock_detail_id,
                            spd.stock_price, spd.stock_price_time
                     FROM stock_price_detail spd
                     JOIN stock_detail sd ON spd.stock_detail_id = sd.stock_detail_id
                     WHERE sd.stock_id = ?1 AND sd.stock_date = ?2
                     ORDER BY spd.stock_price_time, spd.stock_price_detail_id",
                )?;
                let rows = stmt.query_map(params![stock_id, stock_date], tick_from_row)?;
                rows.collect()
            },
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    pub(crate) fn temp_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("market.db"), 2).unwrap();
        (dir, store)
    }

    pub(crate) fn new_stock(code: &str) -> NewStock {
        NewStock {
            code_name: code.into(),
            name: format!("{code} Tbk"),
            description: String::new(),
            total_shares: 1_000_000,
        }
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn creates_and_reads_stocks() {
        let (_dir, store) = temp_store();
        assert!(store.is_empty().unwrap());
        let id = store.create_stock(&new_stock("BBCA")).unwrap();
        let stock = store.get_stock(id).unwrap();
        assert_eq!(stock.code_name, "BBCA");
        assert_eq!(store.stock_id_by_code_name("BBCA"), Some(id));
        assert_eq!(store.list_stocks().len(), 1);
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn duplicate_code_name_degrades_to_none() {
        let (_dir, store) = temp_store();
        assert!(store.create_stock(&new_stock("BBRI")).is_some());
        assert_eq!(store.create_stock(&new_stock("BBRI")), None);
    }

    #[test]
    fn missing_rows_are_empty_values() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_stock(99), None);
        assert_eq!(store.latest_stock_date(99), None);
        assert_eq!(store.stock_detail(99, 1), None);
        assert_eq!(store.last_price(99, 1), 0);
        assert_eq!(store.highest(99, 1), 0);
        assert_eq!(store.lowest(99, 1), 0);
        assert!(store.list_news().is_empty());
        assert!(!store.upsert_aggregate(99, 1, Some(1), Some(1), Some(1)));
    }

    #[test]
    fn trading_days_start_unset() {
        let (_dir, store) = temp_store();
        let id = store.create_stock(&new_stock("TLKM")).unwrap();
        let day = store.insert_stock_detail(id, 1, 3200).unwrap();
        assert_eq!(day.highest_price, None);
        assert_eq!(store.stock_detail(id, 1), Some(day));
        assert_eq!(store.latest_stock_date(id), Some(1));
        assert_eq!(store.insert_stock_detail(id, 1, 3300), None);
    }

    #[test]
    fn last_price_follows_price_time() {
        let (_dir, store) = temp_store();
        let id = store.create_stock(&new_stock("ASII")).unwrap();
        let day = store.insert_stock_detail(id, 1, 100).unwrap();
        assert!(store.append_tick(day.stock_detail_id, 104, at(3_000)));
        assert!(store.append_tick(day.stock_detail_id, 97, at(1_000)));
        assert!(store.append_tick(day.stock_detail_id, 101, at(2_000)));

        assert_eq!(store.last_price(id, 1), 104);
        assert_eq!(store.highest(id, 1), 104);
        assert_eq!(store.lowest(id, 1), 97);
        let prices: Vec<Price> = store.prices_for_day(id, 1).iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![97, 101, 104]);
    }

    #[test]
    fn aggregates_round_trip_and_delete_cascades() {
        let (_dir, store) = temp_store();
        let id = store.create_stock(&new_stock("UNVR")).unwrap();
        let day = store.insert_stock_detail(id, 1, 100).unwrap();
        store.append_tick(day.stock_detail_id, 100, at(1));
        assert!(store.upsert_aggregate(id, 1, Some(110), Some(90), Some(100)));
        let stored = store.stock_detail(id, 1).unwrap();
        assert_eq!(stored.highest_price, Some(110));
        assert_eq!(stored.lowest_price, Some(90));
        assert_eq!(stored.close_price, Some(100));

        assert!(store.delete_stock_detail(id, 1));
        assert!(store.prices_for_day(id, 1).is_empty());
        assert!(store.stock_details(id).is_empty());
    }

    #[test]
    fn news_crud() {
        let (_dir, store) = temp_store();
        let id = store.create_stock(&new_stock("GOTO")).unwrap();
        let news_id = store.create_news(id, "Quarterly loss narrows", 4.5).unwrap();
        let news = store.list_news();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].value_fluctuation, 4.5);
        assert!(store.update_news(news_id, id, "Quarterly profit", -2.0));
        let news = store.list_news();
        assert_eq!(news[0].description, "Quarterly profit");
        assert_eq!(news[0].value_fluctuation, -2.0);
        assert!(!store.update_news(404, id, "missing", 1.0));

        assert!(store.delete_news(news_id));
        assert!(store.list_news().is_empty());
        assert_eq!(store.create_news(404, "orphan", 1.0), None);
    }

    #[test]
    fn ticks_can_be_corrected_and_removed() {
        let (_dir, store) = temp_store();
        let id = store.create_stock(&new_stock("ICBP")).unwrap();
        let day = store.insert_stock_detail(id, 1, 100).unwrap();
        store.append_tick(day.stock_detail_id, 101, at(1_000));
        store.append_tick(day.stock_detail_id, 103, at(2_000));

        assert!(store.update_tick(day.stock_detail_id, at(2_000), 99));
        assert_eq!(store.last_price(id, 1), 99);
        assert!(!store.update_tick(day.stock_detail_id, at(9_000), 1));

        assert!(store.delete_tick(day.stock_detail_id, at(2_000)));
        assert_eq!(store.latest_tick(id, 1).map(|t| t.price), Some(101));
        assert!(!store.delete_tick(day.stock_detail_id, at(2_000)));
        assert!(store.delete_tick(day.stock_detail_id, at(1_000)));
        assert_eq!(store.latest_tick(id, 1), None);
    }

    #[test]
    fn zero_price_tick_is_a_real_tick() {
        let (_dir, store) = temp_store();
        let id = store.create_stock(&new_stock("ZERO")).unwrap();
        let day = store.insert_stock_detail(id, 1, 0).unwrap();
        assert_eq!(store.latest_tick(id, 1), None);
        store.append_tick(day.stock_detail_id, 0, at(1));
        assert_eq!(store.latest_tick(id, 1).map(|t| t.price), Some(0));
    }
}
