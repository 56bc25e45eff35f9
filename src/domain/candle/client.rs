//! Candle sub-client — REST history for the chart backfill.

use super::wire::parse_history;
use super::CandleBar;
use crate::client::MarketClient;
use crate::error::SdkError;
use crate::http::MarketHttp;
use crate::shared::{Interval, Symbol};

/// Sub-client for candle history.
pub struct Candles<'a> {
    pub(crate) client: &'a MarketClient,
}

impl<'a> Candles<'a> {
    /// History for `interval`, most recent bar first. Errors are returned as-is.
    pub async fn history(&self, interval: Interval) -> Result<Vec<CandleBar>, SdkError> {
        let config = self.client.config();
        let body = self
            .client
            .http
            .get_candle_history(&config.symbol, interval, Some(config.window_capacity as u32))
            .await?;
        Ok(parse_history(&body))
    }

    /// History for `interval`, resolving any failure to an empty list.
    pub async fn backfill(&self, interval: Interval) -> Vec<CandleBar> {
        let config = self.client.config();
        fetch_backfill(
            &self.client.http,
            &config.symbol,
            interval,
            config.window_capacity,
        )
        .await
    }
}

/// Backfill fetch used by the stream runtime. A failed request is logged and
/// yields no bars, so the chart keeps streaming.
pub async fn fetch_backfill(
    http: &MarketHttp,
    symbol: &Symbol,
    interval: Interval,
    limit: usize,
) -> Vec<CandleBar> {
    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    match http.get_candle_history(symbol, interval, Some(limit)).await {
        Ok(body) => {
            let bars = parse_history(&body);
            tracing::debug!(%symbol, %interval, bars = bars.len(), "Fetched candle history");
            bars
        }
        Err(e) => {
            tracing::warn!(%symbol, %interval, error = %e, "Candle history request failed");
            Vec::new()
        }
    }
}
