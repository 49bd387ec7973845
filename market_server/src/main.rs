//! Stock market feed simulator server.
//!
//! Every few seconds a random news item is drawn from the database. Its signed
//! percentage becomes a target price for the referenced stock, and the price converges
//! toward it in fixed integer steps over a short window of ticks. Each tick is persisted
//! into the stock's price history, folded into the day's OHLC aggregate and pushed to
//! all subscribed clients as a full `update_stock` snapshot.
//!
//! Building blocks:
//! - `engine::MarketEngine`: the context object owning selector, scheduler, aggregator
//!   and broadcaster; runs the news loop.
//! - `store`: SQLite storage behind the `StockStore`/`NewsStore`/`PriceStore` traits.
//! - `receiver::CommandReceiver`: TCP requests (`SUBSCRIBE`, `STOCK`, `RANDOM_NEWS`).
//! - `config::Config`: CLI flags and `MARKET_*` environment variables.
//!
//! Startup: load `.env`, parse the config, open the database, seed it when empty, open
//! the trading days, then serve until Ctrl+C.
#![warn(missing_docs)]
use crate::config::Config;
use crate::engine::MarketEngine;
use crate::error::Result;
use crate::model::broadcaster::Broadcaster;
use crate::receiver::CommandReceiver;
use crate::store::SqliteStore;
use crate::store::seed::MarketSeed;
use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::sync::Arc;
use std::thread;

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
mod receiver;
pub mod store;

fn main() -> Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();
    init_logger();
    if env_loaded {
        info!("Loaded environment from .env");
    }

    let config = Config::parse();
    let settings = config.engine_settings()?;
    let store = Arc::new(SqliteStore::open(&config.database_path, config.pool_size())?);
    info!(
        "Database {} opened with {} pooled connection(s)",
        config.database_path.display(),
        store.pool().size()
    );

    let broadcaster = Broadcaster::start();
    let engine = Arc::new(MarketEngine::new(
        Arc::clone(&store),
        broadcaster.clone(),
        settings,
    ));

    if let Some(seed_file) = &config.seed_file {
        if store.is_empty()? {
            MarketSeed::from_path(seed_file)?.apply(engine.aggregator())?;
        } else {
            info!("Database already has stocks; skipping seed {}", seed_file.display());
        }
    }
    engine.open_trading_days(config.open_new_day);

    let receiver = CommandReceiver::bind(&config.bind)?;
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    engine.start();
    let loop_engine = Arc::clone(&engine);
    thread::spawn(move || {
        if let Err(e) = receiver.receive_loop(loop_engine) {
            error!("Receiver loop failed: {}", e);
        }
    });

    info!("Server is running. Press Ctrl+C to exit.");
    let _ = shutdown_rx.recv();
    info!("Ctrl+C received. Shutting down server...");
    engine.stop();
    broadcaster.shutdown();
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
