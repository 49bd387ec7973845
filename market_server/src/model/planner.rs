//! News-to-price mapping.
//!
//! A news item moves a stock by a signed percentage. The planner turns that percentage
//! into a `ConvergenceJob`: a target price and a fixed per-tick step. Prices are
//! integers, so both values are truncated and the last tick is allowed to miss the
//! target by the accumulated remainder.

use market_common::records::Price;
use market_common::{MarketError, Result};

/// In-flight convergence of one stock toward a target price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceJob {
    /// Stock being animated.
    pub stock_id: i64,
    /// Price when the job was planned.
    pub start_price: Price,
    /// Price after the ticks applied so far.
    pub current_price: Price,
    /// Price the job steers toward.
    pub target_price: Price,
    /// Signed step applied on every tick.
    pub price_delta_per_tick: Price,
    /// Ticks applied so far.
    pub ticks_elapsed: u32,
    /// Ticks the job lives for.
    pub ticks_total: u32,
}

impl ConvergenceJob {
    /// Apply one tick and return the new current price.
    pub fn advance(&mut self) -> Price {
        self.current_price += self.price_delta_per_tick;
        self.ticks_elapsed += 1;
        self.current_price
    }

    /// `true` once every tick of the window has been applied.
    pub fn is_finished(&self) -> bool {
        self.ticks_elapsed >= self.ticks_total
    }
}

/// Target price after moving `current_price` by `percentage_change` percent, truncated
/// toward zero.
pub fn target_price(current_price: Price, percentage_change: f64) -> Price {
    let current = current_price as f64;
    (current + current * percentage_change / 100.0).trunc() as Price
}

/// Plan a convergence of `stock_id` from `current_price` over `window_ticks` ticks.
///
/// The per-tick delta is the floor of `(target - current) / window_ticks`.
pub fn plan(
    stock_id: i64,
    current_price: Price,
    percentage_change: f64,
    window_ticks: u32,
) -> Result<ConvergenceJob> {
    if window_ticks == 0 {
        return Err(MarketError::InvalidWindow(window_ticks));
    }
    let target_price = target_price(current_price, percentage_change);
    let price_delta_per_tick = (target_price - current_price).div_euclid(Price::from(window_ticks));

    Ok(ConvergenceJob {
        stock_id,
        start_price: current_price,
        current_price,
        target_price,
        price_delta_per_tick,
        ticks_elapsed: 0,
        ticks_total: window_ticks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_end(mut job: ConvergenceJob) -> ConvergenceJob {
        while !job.is_finished() {
            job.advance();
        }
        job
    }

    #[test]
    fn ten_percent_over_five_ticks_lands_on_target() {
        let job = plan(1, 100, 10.0, 5).unwrap();
        assert_eq!(job.target_price, 110);
        assert_eq!(job.price_delta_per_tick, 2);
        let done = run_to_end(job);
        assert_eq!(done.current_price, 110);
        assert_eq!(done.ticks_elapsed, 5);
    }

    #[test]
    fn negative_change_floors_delta_and_keeps_drift() {
        let job = plan(1, 100, -7.0, 3).unwrap();
        assert_eq!(job.target_price, 93);
        assert_eq!(job.price_delta_per_tick, -3);
        assert_eq!(run_to_end(job).current_price, 91);
    }

    #[test]
    fn target_is_truncated() {
        assert_eq!(target_price(101, 5.0), 106); // 106.05
        assert_eq!(target_price(99, -3.3), 95); // 95.733
        assert_eq!(target_price(3, 10.0), 3); // 3.3
    }

    #[test]
    fn target_matches_multiplicative_form_for_positive_prices() {
        for current in [1, 7, 100, 2_500, 99_999] {
            for pct in [-50.0, -7.0, -0.5, 0.0, 1.5, 10.0, 33.3] {
                let expected = (current as f64 * (1.0 + pct / 100.0)).trunc() as Price;
                let got = target_price(current, pct);
                assert!((got - expected).abs() <= 1, "{current} {pct}: {got} vs {expected}");
            }
        }
    }

    #[test]
    fn zero_price_never_moves() {
        let job = plan(1, 0, 25.0, 4).unwrap();
        assert_eq!(job.target_price, 0);
        assert_eq!(job.price_delta_per_tick, 0);
    }

    #[test]
    fn empty_window_is_rejected() {
        assert!(matches!(plan(1, 100, 5.0, 0), Err(MarketError::InvalidWindow(0))));
    }

    #[test]
    fn job_finishes_after_exactly_window_ticks() {
        let mut job = plan(3, 200, 4.0, 4).unwrap();
        for _ in 0..3 {
            job.advance();
            assert!(!job.is_finished());
        }
        job.advance();
        assert!(job.is_finished());
    }
}
