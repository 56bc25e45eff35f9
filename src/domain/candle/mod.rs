//! Candle domain — OHLC bars, the bounded chart window, derived price change.

#[cfg(feature = "http")]
pub mod client;
pub mod reconciler;
pub mod state;
pub mod wire;

pub use reconciler::{BackfillRequest, CandlePhase, CandleReconciler, SwitchPlan};
pub use state::CandleWindow;

use crate::shared::{Interval, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of bars kept in the chart window unless configured otherwise.
pub const DEFAULT_WINDOW_CAPACITY: usize = 40;

/// Largest `limit` the history endpoint accepts.
pub const MAX_WINDOW_CAPACITY: usize = 10_000;

/// Candle stream key, `trade:<interval>:t<SYMBOL>`. Used by the WS channel
/// and the REST history path alike.
pub fn candle_key(interval: Interval, symbol: &Symbol) -> String {
    format!("trade:{}:{}", interval, symbol.trading())
}

/// One OHLC bar. `timestamp` is the unique key (epoch milliseconds on Bitfinex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleBar {
    pub timestamp: i64,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl CandleBar {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
    }
}

/// Sign of the last close-to-close move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Positive,
    Negative,
    #[default]
    Equal,
}

/// Move between the two most recent closes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub direction: ChangeDirection,
    /// Absolute close-to-close difference.
    pub amount: Decimal,
    /// `amount / previous close * 100`.
    pub percentage: f64,
}

/// Read-only values derived from the window for the chart header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub last_price: Decimal,
    pub change: PriceChange,
}
