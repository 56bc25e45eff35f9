//! # bfx-market
//!
//! Live candle and order book reconciliation for the Bitfinex public
//! market-data feed.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core** — Shared newtypes, candle and book domain state, reconcilers (always available)
//! 2. **Protocol** — Sans-IO connection manager: readiness gating, subscriptions, routing
//! 3. **Session** — `MarketSession`, a synchronous coordinator returning explicit effects
//! 4. **HTTP API** — `MarketHttp` with per-request retry policies, candle history
//! 5. **Runtime** — `tokio-tungstenite` transport plus an actor that drives a session
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bfx_market::prelude::*;
//! use futures_util::StreamExt;
//!
//! let client = MarketClient::builder().symbol("BTCUSD").build()?;
//! let stream = client.stream()?;
//! stream.select_interval(Interval::Hour1).await?;
//!
//! let mut events = stream.events();
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes used across all domains.
pub mod shared;

/// Domain modules (vertical slices): types, wire parsing, state, reconcilers.
pub mod domain;

/// Unified SDK error types.
pub mod error;

/// Network URL constants.
pub mod network;

/// Session configuration.
pub mod config;

// ── Layer 2: Protocol ────────────────────────────────────────────────────────

/// WebSocket protocol: messages, frames, connection state, transport.
pub mod ws;

// ── Layer 3: Session ─────────────────────────────────────────────────────────

/// `MarketSession` — mount, foreground/background and interval coordination.
pub mod session;

// ── Layer 4: HTTP API ────────────────────────────────────────────────────────

/// HTTP client with retry policies.
#[cfg(feature = "http")]
pub mod http;

/// `MarketClient` — the primary entry point.
#[cfg(feature = "http")]
pub mod client;

// ── Layer 5: Runtime ─────────────────────────────────────────────────────────

/// Tokio actor driving a session over the native transport.
#[cfg(all(feature = "http", feature = "ws-native"))]
pub mod runtime;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{ChannelId, Interval, Side, Symbol};

    // Domain types — candles
    pub use crate::domain::candle::{
        BackfillRequest, CandleBar, CandlePhase, CandleReconciler, CandleWindow, ChangeDirection,
        PriceChange, PriceSummary,
    };

    // Domain types — order book
    pub use crate::domain::book::{
        BookLevel, DepthRow, DepthView, OrderBookReconciler, OrderBookState, RefreshThrottle,
    };

    // Errors
    pub use crate::error::SdkError;

    // Network + config
    pub use crate::config::MarketConfig;
    pub use crate::network::{DEFAULT_API_URL, DEFAULT_WS_URL};

    // Session
    pub use crate::session::{AppState, Effect, MarketEvent, MarketSession};

    // WebSocket types
    pub use crate::ws::{
        ConnectionManager, ConnectionState, Frame, MessageOut, StreamKey, WsConfig, WsEvent,
    };

    // HTTP client + sub-clients
    #[cfg(feature = "http")]
    pub use crate::client::{CandlesClient, MarketClient, MarketClientBuilder};
    #[cfg(feature = "http")]
    pub use crate::http::retry::{RetryConfig, RetryPolicy};

    // Runtime
    #[cfg(all(feature = "http", feature = "ws-native"))]
    pub use crate::runtime::{MarketHandle, MarketStream};
}
