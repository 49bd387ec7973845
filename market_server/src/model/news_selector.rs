//! Uniform random pick from the news pool.

use crate::store::NewsStore;
use log::debug;
use market_common::records::NewsEvent;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;

/// Draws news items from a `NewsStore`.
pub struct NewsSelector<N> {
    store: Arc<N>,
}

impl<N: NewsStore> NewsSelector<N> {
    /// Create a selector reading from `store`.
    pub fn new(store: Arc<N>) -> Self {
        Self { store }
    }

    /// One news item chosen uniformly at random, or `None` when the pool is empty.
    ///
    /// A store failure has already been logged by the store and shows up here as an
    /// empty pool.
    pub fn select_random_news(&self) -> Option<NewsEvent> {
        self.select_with(&mut rand::rng())
    }

    /// Same as [`Self::select_random_news`] with an explicit random source.
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NewsEvent> {
        let news = self.store.list_news();
        let picked = news.choose(rng).cloned();
        if picked.is_none() {
            debug!("No news data available");
        }
        picked
    }
}
