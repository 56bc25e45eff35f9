//! Wire shapes for the `book` channel: `[PRICE, COUNT, AMOUNT]` rows.

use super::BookLevel;
use crate::shared::decimal_from_value;
use serde_json::Value;

/// Payload of a book channel data frame.
#[derive(Debug, Clone, PartialEq)]
pub enum BookPayload {
    /// Full book sent right after subscribing.
    Snapshot(Vec<BookLevel>),
    /// One level change.
    Delta(BookLevel),
}

impl BookPayload {
    /// Classifies a channel payload. Heartbeats and malformed shapes yield `None`.
    pub fn from_value(payload: &Value) -> Option<Self> {
        let items = payload.as_array()?;
        match items.first() {
            Some(Value::Array(_)) => Some(BookPayload::Snapshot(
                items.iter().filter_map(parse_level).collect(),
            )),
            Some(_) => parse_level(payload).map(BookPayload::Delta),
            None => Some(BookPayload::Snapshot(Vec::new())),
        }
    }
}

/// Parses one `[PRICE, COUNT, AMOUNT]` row.
pub fn parse_level(row: &Value) -> Option<BookLevel> {
    let fields = row.as_array()?;
    if fields.len() != 3 {
        return None;
    }
    let count = u32::try_from(fields[1].as_u64()?).ok()?;
    Some(BookLevel {
        price: decimal_from_value(&fields[0])?,
        count,
        amount: decimal_from_value(&fields[2])?,
    })
}
