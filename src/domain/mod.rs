//! Domain modules organized as vertical slices.
//!
//! Each sub-module contains:
//! - `mod.rs` — Domain types and view models
//! - `wire.rs` — Parsing of the positional arrays the feed sends
//! - `state.rs` — State containers with update methods (for WS-driven data)
//! - `reconciler.rs` — Stream lifecycle on top of the state container
//! - `client.rs` — Sub-client with HTTP methods (candles only)

pub mod book;
pub mod candle;
