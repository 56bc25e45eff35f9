//! Session configuration — `MarketConfig`.

use std::time::Duration;

use crate::domain::book::reconciler::DEFAULT_REFRESH_WINDOW;
use crate::domain::book::DEFAULT_BOOK_DEPTH;
use crate::domain::candle::reconciler::DEFAULT_RESUBSCRIBE_DELAY;
use crate::domain::candle::{DEFAULT_WINDOW_CAPACITY, MAX_WINDOW_CAPACITY};
use crate::error::SdkError;
use crate::shared::{Interval, Symbol};
use crate::ws::WsConfig;

pub const ENV_SYMBOL: &str = "BFX_SYMBOL";
pub const ENV_INTERVAL: &str = "BFX_INTERVAL";
pub const ENV_WS_URL: &str = "BFX_WS_URL";
pub const ENV_API_URL: &str = "BFX_API_URL";
pub const ENV_WINDOW: &str = "BFX_WINDOW";

/// Everything a market session needs to know up front.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub symbol: Symbol,
    /// Interval selected on mount.
    pub interval: Interval,
    /// Bars kept in the chart window.
    pub window_capacity: usize,
    /// Rows per side in the depth view.
    pub book_depth: usize,
    /// Gap between unsubscribing the old interval and subscribing the new one.
    pub resubscribe_delay: Duration,
    /// Book refresh throttle window.
    pub refresh_window: Duration,
    pub api_url: String,
    /// Per-request REST timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    pub ws: WsConfig,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::default(),
            interval: Interval::default(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            book_depth: DEFAULT_BOOK_DEPTH,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
            refresh_window: DEFAULT_REFRESH_WINDOW,
            api_url: crate::network::DEFAULT_API_URL.to_string(),
            request_timeout: None,
            ws: WsConfig::default(),
        }
    }
}

impl MarketConfig {
    pub fn new(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }

    pub fn book_depth(mut self, depth: usize) -> Self {
        self.book_depth = depth;
        self
    }

    pub fn resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    pub fn refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    pub fn ws_url(mut self, url: &str) -> Self {
        self.ws.url = url.to_string();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn ws_config(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }

    /// Defaults overridden by `BFX_*` environment variables, then validated.
    pub fn from_env() -> Result<Self, SdkError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`MarketConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SdkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(symbol) = var(ENV_SYMBOL) {
            config.symbol = Symbol::new(symbol);
        }
        if let Some(interval) = var(ENV_INTERVAL) {
            config.interval = interval.trim().parse()?;
        }
        if let Some(url) = var(ENV_WS_URL) {
            config.ws.url = url.trim().to_string();
        }
        if let Some(url) = var(ENV_API_URL) {
            config.api_url = url.trim().to_string();
        }
        if let Some(window) = var(ENV_WINDOW) {
            config.window_capacity = window.trim().parse().map_err(|_| {
                SdkError::Validation(format!("{ENV_WINDOW} must be a positive integer, got '{window}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if !self.symbol.is_valid() {
            return Err(SdkError::Validation(format!(
                "invalid symbol '{}'",
                self.symbol
            )));
        }
        if self.window_capacity == 0 {
            return Err(SdkError::Validation(
                "window capacity must be at least 1".to_string(),
            ));
        }
        if self.window_capacity > MAX_WINDOW_CAPACITY {
            return Err(SdkError::Validation(format!(
                "window capacity must be at most {MAX_WINDOW_CAPACITY}, got {}",
                self.window_capacity
            )));
        }
        if self.book_depth == 0 {
            return Err(SdkError::Validation(
                "book depth must be at least 1".to_string(),
            ));
        }
        if self.refresh_window.is_zero() {
            return Err(SdkError::Validation(
                "refresh window must be non-zero".to_string(),
            ));
        }
        if !(self.ws.url.starts_with("ws://") || self.ws.url.starts_with("wss://")) {
            return Err(SdkError::Validation(format!(
                "websocket url must use ws:// or wss://, got '{}'",
                self.ws.url
            )));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(SdkError::Validation(format!(
                "api url must use http:// or https://, got '{}'",
                self.api_url
            )));
        }
        Ok(())
    }
}
