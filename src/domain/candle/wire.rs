//! Wire shapes for candle data (REST history rows + WS channel payloads).
//!
//! Bitfinex candles are positional arrays: `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]`.
//! Note the order — close comes before high/low.

use super::CandleBar;
use crate::shared::decimal_from_value;
use serde_json::Value;

/// Number of fields in a candle row.
pub const CANDLE_ROW_LEN: usize = 6;

/// Payload of a candle channel data frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CandlePayload {
    /// Initial array of bars sent right after subscribing (most recent first).
    Snapshot(Vec<CandleBar>),
    /// A single new or in-progress bar.
    Update(CandleBar),
}

impl CandlePayload {
    /// Classifies a channel payload. Heartbeats and malformed shapes yield `None`.
    pub fn from_value(payload: &Value) -> Option<Self> {
        let items = payload.as_array()?;
        match items.first() {
            Some(Value::Array(_)) => Some(CandlePayload::Snapshot(
                items.iter().filter_map(parse_candle_row).collect(),
            )),
            Some(_) => parse_candle_row(payload).map(CandlePayload::Update),
            // An empty snapshot is still a snapshot.
            None => Some(CandlePayload::Snapshot(Vec::new())),
        }
    }
}

/// Parses one `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]` row.
pub fn parse_candle_row(row: &Value) -> Option<CandleBar> {
    let fields = row.as_array()?;
    if fields.len() != CANDLE_ROW_LEN {
        return None;
    }
    let timestamp = fields[0].as_i64()?;
    Some(CandleBar {
        timestamp,
        open: decimal_from_value(&fields[1])?,
        close: decimal_from_value(&fields[2])?,
        high: decimal_from_value(&fields[3])?,
        low: decimal_from_value(&fields[4])?,
    })
}

/// Parses a REST `/candles/.../hist` body. Rows that fail to parse are skipped;
/// order is preserved (most recent first).
pub fn parse_history(body: &Value) -> Vec<CandleBar> {
    body.as_array()
        .map(|rows| rows.iter().filter_map(parse_candle_row).collect())
        .unwrap_or_default()
}
