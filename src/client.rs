//! High-level client — `MarketClient` with sub-client accessors.
//!
//! The candle sub-client lives in `domain/candle/client.rs`. This module keeps
//! the builder and the entry points for sessions and live streams.

use std::time::Duration;

use crate::config::MarketConfig;
use crate::domain::candle::client::Candles;
use crate::error::SdkError;
use crate::http::MarketHttp;
use crate::session::MarketSession;
use crate::shared::{Interval, Symbol};
use crate::ws::WsConfig;

pub use crate::domain::candle::client::Candles as CandlesClient;

/// The primary entry point: one market, one REST client.
#[derive(Debug, Clone)]
pub struct MarketClient {
    pub(crate) http: MarketHttp,
    config: MarketConfig,
}

impl MarketClient {
    pub fn builder() -> MarketClientBuilder {
        MarketClientBuilder::default()
    }

    /// Build straight from a validated config.
    pub fn from_config(config: MarketConfig) -> Result<Self, SdkError> {
        config.validate()?;
        let http = MarketHttp::new(&config.api_url, config.request_timeout)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn symbol(&self) -> &Symbol {
        &self.config.symbol
    }

    // ── Sub-client accessors ─────────────────────────────────────────────

    pub fn candles(&self) -> Candles<'_> {
        Candles { client: self }
    }

    /// A fresh sans-IO session for callers that bring their own transport.
    pub fn session(&self) -> MarketSession {
        MarketSession::new(&self.config)
    }

    pub fn ws_config(&self) -> &WsConfig {
        &self.config.ws
    }

    /// Create a new native WS client from the current config.
    #[cfg(feature = "ws-native")]
    pub fn ws_native(&self) -> crate::ws::native::WsClient {
        crate::ws::native::WsClient::new(self.config.ws.clone())
    }

    /// Connect and start the live stream for this market.
    #[cfg(feature = "ws-native")]
    pub fn stream(&self) -> Result<crate::runtime::MarketHandle, SdkError> {
        let stream = crate::runtime::MarketStream::new(self.config.clone(), self.http.clone())?;
        Ok(stream.spawn())
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MarketClientBuilder {
    config: MarketConfig,
}

impl MarketClientBuilder {
    pub fn symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.config.symbol = symbol.into();
        self
    }

    pub fn interval(mut self, interval: Interval) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.config.api_url = url.to_string();
        self
    }

    pub fn ws_url(mut self, url: &str) -> Self {
        self.config.ws.url = url.to_string();
        self
    }

    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.config.window_capacity = capacity;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Replace everything set so far.
    pub fn config(mut self, config: MarketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<MarketClient, SdkError> {
        MarketClient::from_config(self.config)
    }
}
