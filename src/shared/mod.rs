//! Shared newtypes and utilities used across all domain modules.
//!
//! These types are serialization-transparent: they serialize/deserialize identically
//! to the raw format the feed sends, so they can be used directly in wire types
//! without conversion overhead.

pub mod decimal;

pub use decimal::decimal_from_value;

use crate::error::SdkError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

// ─── Symbol ──────────────────────────────────────────────────────────────────

/// Trading pair symbol without the `t` prefix (e.g. `"BTCUSD"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    /// Normalizes to uppercase; a leading `t` prefix (wire form) is stripped.
    pub fn new(s: impl Into<String>) -> Self {
        let raw: String = s.into();
        let trimmed = raw.trim();
        let bare = match trimmed.strip_prefix('t') {
            Some(rest)
                if !rest.is_empty()
                    && rest
                        .chars()
                        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()) =>
            {
                rest
            }
            _ => trimmed,
        };
        Self(bare.to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trading symbol as it appears on the wire: `tBTCUSD`.
    pub fn trading(&self) -> String {
        format!("t{}", self.0)
    }

    /// Valid symbols are non-empty ASCII alphanumerics.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|ch| ch.is_ascii_alphanumeric())
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self("BTCUSD".to_string())
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Serialize for Symbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Symbol::new(s))
    }
}

// ─── ChannelId ───────────────────────────────────────────────────────────────

/// Server-assigned channel identifier (`chanId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Side ────────────────────────────────────────────────────────────────────

/// Order book side. Bitfinex encodes it in the sign of `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Bid => write!(f, "Bid"),
            Side::Ask => write!(f, "Ask"),
        }
    }
}

// ─── Interval ────────────────────────────────────────────────────────────────

/// Candle interval. Only the keys the chart offers are representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1D")]
    Day1,
    #[serde(rename = "1W")]
    Week1,
}

impl Interval {
    /// All intervals in display order.
    pub const ALL: [Interval; 6] = [
        Interval::Minute5,
        Interval::Minute30,
        Interval::Hour1,
        Interval::Hour12,
        Interval::Day1,
        Interval::Week1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute5 => "5m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour12 => "12h",
            Self::Day1 => "1D",
            Self::Week1 => "1W",
        }
    }

    /// Duration of one candle in seconds.
    pub fn duration_secs(&self) -> u64 {
        match self {
            Self::Minute5 => 300,
            Self::Minute30 => 1_800,
            Self::Hour1 => 3_600,
            Self::Hour12 => 43_200,
            Self::Day1 => 86_400,
            Self::Week1 => 604_800,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| {
                SdkError::Validation(format!(
                    "unknown interval '{s}', expected one of 5m/30m/1h/12h/1D/1W"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalizes_wire_prefix() {
        assert_eq!(Symbol::new("tBTCUSD").as_str(), "BTCUSD");
        assert_eq!(Symbol::new("btcusd").as_str(), "BTCUSD");
        assert_eq!(Symbol::new("BTCUSD").trading(), "tBTCUSD");
    }

    #[test]
    fn test_symbol_validity() {
        assert!(Symbol::new("ETHUSD").is_valid());
        assert!(!Symbol::new("").is_valid());
        assert!(!Symbol::new("BTC/USD").is_valid());
    }

    #[test]
    fn test_interval_round_trips_through_str() {
        for interval in Interval::ALL {
            assert_eq!(interval.as_str().parse::<Interval>().unwrap(), interval);
        }
    }

    #[test]
    fn test_interval_is_case_sensitive() {
        assert!("1d".parse::<Interval>().is_err());
        assert!("15m".parse::<Interval>().is_err());
        assert_eq!("1D".parse::<Interval>().unwrap(), Interval::Day1);
    }

    #[test]
    fn test_interval_serde() {
        let r: Interval = serde_json::from_str("\"12h\"").unwrap();
        assert_eq!(r, Interval::Hour12);
        assert_eq!(r.duration_secs(), 43_200);
        assert_eq!(serde_json::to_string(&Interval::Week1).unwrap(), "\"1W\"");
    }

    #[test]
    fn test_channel_id_is_transparent() {
        let id: ChannelId = serde_json::from_str("17470").unwrap();
        assert_eq!(id, ChannelId(17470));
    }
}
