//! Order book state container — two price-keyed sides.

use super::{depth_rows, BookLevel, DepthView};
use crate::shared::Side;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Live two-sided book. A price lives on at most one side.
#[derive(Debug, Clone, Default)]
pub struct OrderBookState {
    bids: BTreeMap<Decimal, BookLevel>,
    asks: BTreeMap<Decimal, BookLevel>,
}

impl OrderBookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both sides. Levels are partitioned by the sign of their amount;
    /// zero-count levels are dropped.
    pub fn apply_snapshot(&mut self, levels: Vec<BookLevel>) {
        self.clear();
        for level in levels {
            if level.is_removal() {
                continue;
            }
            self.side_mut(level.side()).insert(level.price, level);
        }
    }

    /// Apply one level change.
    ///
    /// The price is removed from both sides first, so a level that changes
    /// sign moves sides instead of being duplicated.
    pub fn apply_delta(&mut self, level: BookLevel) {
        self.bids.remove(&level.price);
        self.asks.remove(&level.price);
        if level.is_removal() {
            return;
        }
        self.side_mut(level.side()).insert(level.price, level);
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, BookLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Bids keyed by price (iterate in reverse for best first).
    pub fn bids(&self) -> &BTreeMap<Decimal, BookLevel> {
        &self.bids
    }

    /// Asks keyed by price ascending.
    pub fn asks(&self) -> &BTreeMap<Decimal, BookLevel> {
        &self.asks
    }

    /// Highest bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Mid price (average of best bid and best ask).
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Top `limit` levels per side with depth bar widths.
    pub fn depth(&self, limit: usize) -> DepthView {
        DepthView {
            bids: depth_rows(self.bids.values().rev().take(limit)),
            asks: depth_rows(self.asks.values().take(limit)),
        }
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::ToPrimitive;

    fn level(price: i64, count: u32, amount: i64) -> BookLevel {
        BookLevel {
            price: Decimal::from(price),
            count,
            amount: Decimal::from(amount),
        }
    }

    fn prices(side: &BTreeMap<Decimal, BookLevel>) -> Vec<i64> {
        side.keys().map(|p| p.to_i64().unwrap()).collect()
    }

    #[test]
    fn test_snapshot_partitions_by_sign() {
        let mut book = OrderBookState::new();
        book.apply_snapshot(vec![level(99, 1, 5), level(101, 2, -3), level(98, 1, 1)]);
        assert_eq!(prices(book.bids()), vec![98, 99]);
        assert_eq!(prices(book.asks()), vec![101]);
        assert_eq!(book.best_bid(), Some(Decimal::from(99)));
        assert_eq!(book.best_ask(), Some(Decimal::from(101)));
    }

    #[test]
    fn test_snapshot_replaces_and_drops_zero_count() {
        let mut book = OrderBookState::new();
        book.apply_snapshot(vec![level(99, 1, 5)]);
        book.apply_snapshot(vec![level(10, 0, 5), level(11, 1, -5)]);
        assert!(book.bids().is_empty());
        assert_eq!(prices(book.asks()), vec![11]);
    }

    #[test]
    fn test_delta_with_zero_count_deletes_price() {
        let mut book = OrderBookState::new();
        book.apply_snapshot(vec![level(100, 1, 2), level(101, 1, -2)]);
        book.apply_delta(level(100, 0, 1));
        assert!(book.bids().is_empty());
        assert_eq!(prices(book.asks()), vec![101]);

        // Removal of a price on the ask side, whatever the sign says.
        book.apply_delta(level(101, 0, 1));
        assert!(book.is_empty());
    }

    #[test]
    fn test_delta_side_flip_moves_level() {
        let mut book = OrderBookState::new();
        book.apply_snapshot(vec![level(50, 2, -4)]);
        book.apply_delta(level(50, 1, 3));
        assert!(book.asks().is_empty());
        let bid = &book.bids()[&Decimal::from(50)];
        assert_eq!(bid.count, 1);
        assert_eq!(bid.amount, Decimal::from(3));
    }

    #[test]
    fn test_price_never_on_both_sides() {
        let mut book = OrderBookState::new();
        for (i, amount) in [5i64, -5, 3, -1, 2].iter().enumerate() {
            book.apply_delta(level(70, i as u32 + 1, *amount));
            let on_bid = book.bids().contains_key(&Decimal::from(70));
            let on_ask = book.asks().contains_key(&Decimal::from(70));
            assert!(on_bid ^ on_ask);
        }
    }

    #[test]
    fn test_depth_orders_and_truncates() {
        let mut book = OrderBookState::new();
        let mut levels = Vec::new();
        for i in 1..=20 {
            levels.push(level(100 - i, i as u32, 1));
            levels.push(level(100 + i, 1, -1));
        }
        book.apply_snapshot(levels);

        let view = book.depth(15);
        assert_eq!(view.bids.len(), 15);
        assert_eq!(view.asks.len(), 15);
        assert_eq!(view.bids[0].price, Decimal::from(99));
        assert_eq!(view.bids[14].price, Decimal::from(85));
        assert_eq!(view.asks[0].price, Decimal::from(101));
        assert_eq!(view.asks[14].price, Decimal::from(115));

        // Widths scale to the largest count among the shown bids (15).
        assert_eq!(view.bids[14].bar_width_pct, 100.0);
        assert!(view.asks.iter().all(|row| row.bar_width_pct == 100.0));
    }

    #[test]
    fn test_mid_price_and_spread() {
        let mut book = OrderBookState::new();
        book.apply_snapshot(vec![level(50, 1, 10), level(52, 1, -5)]);
        assert_eq!(book.mid_price(), Some(Decimal::from(51)));
        assert_eq!(book.spread(), Some(Decimal::from(2)));
    }

    #[test]
    fn test_clear() {
        let mut book = OrderBookState::new();
        book.apply_snapshot(vec![level(50, 1, 10), level(51, 1, -5)]);
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.depth(15), DepthView::default());
    }
}
