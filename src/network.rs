//! Network URL constants for the Bitfinex public feed.

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api-pub.bitfinex.com";

/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://api-pub.bitfinex.com/ws/2";
