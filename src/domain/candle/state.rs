//! Candle window state container — bounded, keyed by bar timestamp.

use super::{
    CandleBar, ChangeDirection, PriceChange, PriceSummary, DEFAULT_WINDOW_CAPACITY,
    MAX_WINDOW_CAPACITY,
};
use crate::shared::decimal::to_f64;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};

/// Sliding window of the most recent bars, oldest first.
///
/// Holds at most `capacity` bars with unique timestamps. A bar whose timestamp
/// is already present replaces that bar in place; a new timestamp is appended
/// and the oldest bar is evicted once the window is over capacity.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    bars: VecDeque<CandleBar>,
    capacity: usize,
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl CandleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity.min(MAX_WINDOW_CAPACITY) + 1),
            capacity,
        }
    }

    /// Replace the whole window from a history response ordered most recent first.
    ///
    /// Keeps the `capacity` most recent bars, stored oldest first. Duplicate
    /// timestamps keep their first (most recent) occurrence.
    pub fn replace_most_recent_first(&mut self, bars: Vec<CandleBar>) {
        let mut seen = HashSet::with_capacity(self.capacity.min(MAX_WINDOW_CAPACITY));
        let mut kept: Vec<CandleBar> = bars
            .into_iter()
            .filter(|bar| seen.insert(bar.timestamp))
            .take(self.capacity)
            .collect();
        kept.reverse();

        self.bars.clear();
        self.bars.extend(kept);
    }

    /// Apply a live bar: replace by timestamp, or append and evict the oldest.
    pub fn apply(&mut self, bar: CandleBar) {
        if let Some(existing) = self
            .bars
            .iter_mut()
            .find(|existing| existing.timestamp == bar.timestamp)
        {
            *existing = bar;
            return;
        }

        self.bars.push_back(bar);
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
    }

    pub fn bars(&self) -> &VecDeque<CandleBar> {
        &self.bars
    }

    /// Bars as an owned, oldest-first vector (what a chart consumes).
    pub fn to_vec(&self) -> Vec<CandleBar> {
        self.bars.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&CandleBar> {
        self.bars.back()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    /// Last price and the move from the previous close.
    ///
    /// Everything is zero until at least two bars are present.
    pub fn summary(&self) -> PriceSummary {
        let len = self.bars.len();
        if len < 2 {
            return PriceSummary::default();
        }

        let last = self.bars[len - 1].close;
        let previous = self.bars[len - 2].close;
        let delta = last - previous;

        let direction = if delta > Decimal::ZERO {
            ChangeDirection::Positive
        } else if delta < Decimal::ZERO {
            ChangeDirection::Negative
        } else {
            ChangeDirection::Equal
        };
        let amount = delta.abs();
        let percentage = if previous.is_zero() {
            0.0
        } else {
            to_f64(amount / previous.abs() * Decimal::ONE_HUNDRED)
        };

        PriceSummary {
            last_price: last,
            change: PriceChange {
                direction,
                amount,
                percentage,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(timestamp: i64, close: i64) -> CandleBar {
        CandleBar {
            timestamp,
            open: Decimal::from(close),
            close: Decimal::from(close),
            high: Decimal::from(close),
            low: Decimal::from(close),
        }
    }

    fn timestamps(window: &CandleWindow) -> Vec<i64> {
        window.bars().iter().map(|b| b.timestamp).collect()
    }

    fn window_with_closes(closes: &[i64]) -> CandleWindow {
        let mut window = CandleWindow::new(40);
        for (i, close) in closes.iter().enumerate() {
            window.apply(bar(i as i64 * 100, *close));
        }
        window
    }

    #[test]
    fn test_backfill_reverses_to_ascending() {
        let mut window = CandleWindow::new(40);
        window.replace_most_recent_first(vec![bar(300, 3), bar(200, 2), bar(100, 1)]);
        assert_eq!(timestamps(&window), vec![100, 200, 300]);
    }

    #[test]
    fn test_huge_capacity_does_not_preallocate() {
        let mut window = CandleWindow::new(usize::MAX);
        window.replace_most_recent_first(vec![bar(200, 2), bar(100, 1)]);
        window.apply(bar(300, 3));
        assert_eq!(timestamps(&window), vec![100, 200, 300]);
    }

    #[test]
    fn test_backfill_keeps_most_recent_capacity() {
        let mut window = CandleWindow::new(2);
        window.replace_most_recent_first(vec![bar(300, 3), bar(200, 2), bar(100, 1)]);
        assert_eq!(timestamps(&window), vec![200, 300]);
    }

    #[test]
    fn test_backfill_replaces_prior_contents() {
        let mut window = CandleWindow::new(40);
        window.apply(bar(999, 9));
        window.apply(bar(1000, 9));
        window.replace_most_recent_first(vec![bar(20, 2), bar(10, 1)]);
        assert_eq!(timestamps(&window), vec![10, 20]);
    }

    #[test]
    fn test_backfill_drops_duplicate_timestamps() {
        let mut window = CandleWindow::new(40);
        window.replace_most_recent_first(vec![bar(200, 5), bar(200, 4), bar(100, 1)]);
        assert_eq!(timestamps(&window), vec![100, 200]);
        assert_eq!(window.latest().unwrap().close, Decimal::from(5));
    }

    #[test]
    fn test_tick_with_existing_timestamp_replaces_in_place() {
        let mut window = CandleWindow::new(3);
        window.replace_most_recent_first(vec![bar(300, 3), bar(200, 2), bar(100, 1)]);
        window.apply(bar(200, 42));
        assert_eq!(timestamps(&window), vec![100, 200, 300]);
        assert_eq!(window.bars()[1].close, Decimal::from(42));
    }

    #[test]
    fn test_new_tick_beyond_capacity_evicts_oldest() {
        let mut window = CandleWindow::new(3);
        window.replace_most_recent_first(vec![bar(300, 3), bar(200, 2), bar(100, 1)]);
        window.apply(bar(400, 4));
        assert_eq!(timestamps(&window), vec![200, 300, 400]);
    }

    #[test]
    fn test_window_never_exceeds_capacity_with_unique_timestamps() {
        let mut window = CandleWindow::new(5);
        for i in 0..200i64 {
            // Every third tick re-sends a recent bar.
            let ts = if i % 3 == 0 { (i - 1).max(0) } else { i };
            window.apply(bar(ts, i));
            assert!(window.len() <= 5);
            let unique: HashSet<i64> = timestamps(&window).into_iter().collect();
            assert_eq!(unique.len(), window.len());
        }
    }

    #[test]
    fn test_summary_positive() {
        let summary = window_with_closes(&[100, 105]).summary();
        assert_eq!(summary.last_price, Decimal::from(105));
        assert_eq!(summary.change.direction, ChangeDirection::Positive);
        assert_eq!(summary.change.amount, Decimal::from(5));
        assert!((summary.change.percentage - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_negative_uses_previous_close() {
        let summary = window_with_closes(&[100, 95]).summary();
        assert_eq!(summary.change.direction, ChangeDirection::Negative);
        assert_eq!(summary.change.amount, Decimal::from(5));
        assert!((summary.change.percentage - 5.0).abs() < 1e-9);

        let summary = window_with_closes(&[95, 100]).summary();
        assert!((summary.change.percentage - 5.263157894736842).abs() < 1e-6);
    }

    #[test]
    fn test_summary_equal() {
        let summary = window_with_closes(&[100, 100]).summary();
        assert_eq!(summary.change.direction, ChangeDirection::Equal);
        assert_eq!(summary.change.amount, Decimal::ZERO);
        assert_eq!(summary.change.percentage, 0.0);
    }

    #[test]
    fn test_summary_defaults_below_two_bars() {
        assert_eq!(CandleWindow::new(40).summary(), PriceSummary::default());
        let single = window_with_closes(&[100]).summary();
        assert_eq!(single.last_price, Decimal::ZERO);
        assert_eq!(single.change.percentage, 0.0);
    }

    #[test]
    fn test_summary_zero_previous_close() {
        let summary = window_with_closes(&[0, 10]).summary();
        assert_eq!(summary.change.direction, ChangeDirection::Positive);
        assert_eq!(summary.change.percentage, 0.0);
    }
}
