//! Low-level HTTP client — `MarketHttp`.
//!
//! One method per REST endpoint, returning the raw JSON body. Parsing into
//! domain types happens in the domain modules.

use crate::domain::candle::candle_key;
use crate::error::HttpError;
use crate::http::retry::RetryPolicy;
use crate::shared::{Interval, Symbol};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Low-level HTTP client for the public REST API.
#[derive(Debug, Clone)]
pub struct MarketHttp {
    base_url: String,
    client: Client,
}

impl MarketHttp {
    /// Build a client. With `timeout: None` requests wait as long as the
    /// server takes.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, HttpError> {
        let mut builder = Client::builder().pool_max_idle_per_host(4);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Candles ──────────────────────────────────────────────────────────

    /// `GET /v2/candles/trade:<interval>:t<SYMBOL>/hist`, most recent bar first.
    pub async fn get_candle_history(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: Option<u32>,
    ) -> Result<serde_json::Value, HttpError> {
        let url = candle_history_url(&self.base_url, symbol, interval, limit);
        self.get(&url, RetryPolicy::Idempotent).await
    }

    // ── Internal HTTP methods ────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: &str, retry: RetryPolicy) -> Result<T, HttpError> {
        let Some(config) = retry.config() else {
            return self.do_get(url).await;
        };

        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            match self.do_get::<T>(url).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let should_retry = match &e {
                        HttpError::ServerError { status, .. } => {
                            config.retryable_statuses.contains(status)
                        }
                        HttpError::RateLimited { retry_after_ms } => {
                            if let Some(ms) = retry_after_ms {
                                futures_timer::Delay::new(Duration::from_millis(*ms)).await;
                            }
                            config.retryable_statuses.contains(&429)
                        }
                        HttpError::Timeout => true,
                        HttpError::Reqwest(re) => re.is_connect() || re.is_request(),
                        _ => false,
                    };

                    if should_retry && attempt < config.max_retries {
                        let delay = config.delay_for_attempt(attempt);
                        tracing::debug!(
                            attempt = attempt + 1,
                            max = config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request to {}",
                            url
                        );
                        futures_timer::Delay::new(delay).await;
                        last_error = Some(e);
                    } else if should_retry {
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(HttpError::MaxRetriesExceeded {
            attempts: config.max_retries + 1,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn do_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let resp = self.client.get(url).send().await.map_err(map_transport)?;
        let status = resp.status();

        if status.is_success() {
            return resp.json::<T>().await.map_err(map_transport);
        }

        let retry_after_ms = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body_text = resp.text().await.unwrap_or_default();

        Err(status_error(status.as_u16(), body_text, retry_after_ms))
    }
}

fn map_transport(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout
    } else {
        HttpError::Reqwest(err)
    }
}

fn status_error(status: u16, body: String, retry_after_ms: Option<u64>) -> HttpError {
    match status {
        404 => HttpError::NotFound(body),
        429 => HttpError::RateLimited { retry_after_ms },
        400..=499 => HttpError::BadRequest(body),
        _ => HttpError::ServerError { status, body },
    }
}

/// The key contains `:`, which is percent-encoded in the path.
pub(crate) fn candle_history_url(
    base_url: &str,
    symbol: &Symbol,
    interval: Interval,
    limit: Option<u32>,
) -> String {
    let mut url = format!(
        "{}/v2/candles/{}/hist",
        base_url,
        urlencoding::encode(&candle_key(interval, symbol))
    );
    if let Some(l) = limit {
        url = format!("{}?limit={}", url, l);
    }
    url
}
