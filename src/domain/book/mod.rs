//! Order book domain — price levels, the two-sided book, depth views.

pub mod reconciler;
pub mod state;
pub mod wire;

pub use reconciler::{OrderBookReconciler, Refresh, RefreshThrottle};
pub use state::OrderBookState;

use crate::shared::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rows shown per side unless configured otherwise.
pub const DEFAULT_BOOK_DEPTH: usize = 15;

/// One aggregated price level: `[PRICE, COUNT, AMOUNT]` on the wire.
///
/// The sign of `amount` encodes the side (positive = bid). A `count` of zero
/// means the level is gone; such levels are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

impl BookLevel {
    pub fn side(&self) -> Side {
        if self.amount > Decimal::ZERO {
            Side::Bid
        } else {
            Side::Ask
        }
    }

    pub fn is_removal(&self) -> bool {
        self.count == 0
    }
}

/// A level prepared for display, with its depth bar width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthRow {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
    /// `count / max count on the shown side * 100`, in `[0, 100]`.
    pub bar_width_pct: f64,
}

/// Top of book for display: bids high to low, asks low to high.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthView {
    pub bids: Vec<DepthRow>,
    pub asks: Vec<DepthRow>,
}

impl DepthView {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Attach bar widths to levels already in display order.
pub(crate) fn depth_rows<'a>(levels: impl Iterator<Item = &'a BookLevel>) -> Vec<DepthRow> {
    let levels: Vec<&BookLevel> = levels.collect();
    let max_count = levels.iter().map(|level| level.count).max().unwrap_or(0);

    levels
        .into_iter()
        .map(|level| DepthRow {
            price: level.price,
            count: level.count,
            amount: level.amount,
            bar_width_pct: if max_count == 0 {
                0.0
            } else {
                f64::from(level.count) / f64::from(max_count) * 100.0
            },
        })
        .collect()
}
