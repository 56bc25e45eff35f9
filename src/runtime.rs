//! Tokio driver — `MarketStream` / `MarketHandle`.
//!
//! A single actor task owns the [`MarketSession`], the native transport and
//! the HTTP client. Effects that suspend (resubscribe delay, refresh deadline,
//! history fetch) run in their own tasks and post their result back into the
//! actor, so session state is only ever touched from one place.

use std::pin::Pin;
use std::time::Instant;

use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MarketConfig;
use crate::domain::candle::client::fetch_backfill;
use crate::domain::candle::{BackfillRequest, CandleBar};
use crate::error::SdkError;
use crate::http::MarketHttp;
use crate::session::{AppState, Effect, MarketEvent, MarketSession};
use crate::shared::Interval;
use crate::ws::native::WsClient;
use crate::ws::{WsConfig, WsEvent, SEND_RETRY_DELAY};

type WsEvents<'a> = Pin<Box<dyn Stream<Item = WsEvent> + Send + 'a>>;

/// Requests from the handle.
enum Command {
    SelectInterval(Interval),
    SetAppState(AppState),
    Shutdown,
}

/// Results posted back by effect tasks.
enum Wakeup {
    Resubscribe(Interval),
    Backfill {
        request: BackfillRequest,
        bars: Vec<CandleBar>,
    },
    BookRefresh,
}

/// A configured, not yet running market stream.
pub struct MarketStream {
    config: MarketConfig,
    http: MarketHttp,
}

impl MarketStream {
    pub fn new(config: MarketConfig, http: MarketHttp) -> Result<Self, SdkError> {
        config.validate()?;
        Ok(Self { config, http })
    }

    /// Build the HTTP client from `config` as well.
    pub fn from_config(config: MarketConfig) -> Result<Self, SdkError> {
        let http = MarketHttp::new(&config.api_url, config.request_timeout)?;
        Self::new(config, http)
    }

    /// Connect, mount the session and start publishing events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> MarketHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (wake_tx, wake_rx) = mpsc::channel(64);

        let actor = Actor {
            session: MarketSession::new(&self.config),
            http: self.http,
            window_capacity: self.config.window_capacity,
            event_tx,
            wake_tx,
        };
        let task = tokio::spawn(actor.run(self.config.ws.clone(), cmd_rx, wake_rx));

        MarketHandle {
            cmd_tx,
            events: tokio::sync::Mutex::new(event_rx),
            task: Some(task),
        }
    }
}

/// Control surface of a running market stream.
pub struct MarketHandle {
    cmd_tx: mpsc::Sender<Command>,
    events: tokio::sync::Mutex<mpsc::Receiver<MarketEvent>>,
    task: Option<JoinHandle<()>>,
}

impl MarketHandle {
    pub async fn select_interval(&self, interval: Interval) -> Result<(), SdkError> {
        self.command(Command::SelectInterval(interval)).await
    }

    pub async fn set_app_state(&self, state: AppState) -> Result<(), SdkError> {
        self.command(Command::SetAppState(state)).await
    }

    /// Published views. Ends once the stream has shut down.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = MarketEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(&self.events, |rx| async move {
            let mut guard = rx.lock().await;
            guard.recv().await.map(|event| (event, rx))
        }))
    }

    /// Unsubscribe everything, close the socket and wait for the actor.
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn command(&self, cmd: Command) -> Result<(), SdkError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SdkError::Other("market stream has stopped".to_string()))
    }
}

impl Drop for MarketHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ─── Actor ───────────────────────────────────────────────────────────────────

struct Actor {
    session: MarketSession,
    http: MarketHttp,
    window_capacity: usize,
    event_tx: mpsc::Sender<MarketEvent>,
    wake_tx: mpsc::Sender<Wakeup>,
}

impl Actor {
    async fn run(
        mut self,
        ws_config: WsConfig,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut wake_rx: mpsc::Receiver<Wakeup>,
    ) {
        let mut ws = WsClient::new(ws_config);
        if let Err(e) = ws.connect() {
            tracing::error!(error = %e, "Failed to start WebSocket transport");
            return;
        }

        let effects = self.session.mount();
        self.execute(effects);
        self.publish(self.session.candles_event());

        {
            let mut ws_events = ws.events();
            self.run_loop(&ws, &mut ws_events, &mut cmd_rx, &mut wake_rx)
                .await;
        }

        self.session.unmount();
        self.flush(&ws);
        if let Err(e) = ws.disconnect().await {
            tracing::warn!(error = %e, "WebSocket disconnect failed");
        }
        tracing::info!(symbol = %self.session.symbol(), "Market stream stopped");
    }

    async fn run_loop(
        &mut self,
        ws: &WsClient,
        ws_events: &mut WsEvents<'_>,
        cmd_rx: &mut mpsc::Receiver<Command>,
        wake_rx: &mut mpsc::Receiver<Wakeup>,
    ) {
        let mut flush = tokio::time::interval(SEND_RETRY_DELAY);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let effects = match cmd {
                        Some(Command::SelectInterval(interval)) => {
                            self.session.select_interval(interval)
                        }
                        Some(Command::SetAppState(state)) => self.session.set_app_state(state),
                        Some(Command::Shutdown) | None => return,
                    };
                    self.execute(effects);
                }

                Some(wake) = wake_rx.recv() => {
                    let effects = match wake {
                        Wakeup::Resubscribe(interval) => self.session.on_resubscribe_timer(interval),
                        Wakeup::Backfill { request, bars } => self.session.on_backfill(request, bars),
                        Wakeup::BookRefresh => self.session.on_refresh_timer(Instant::now()),
                    };
                    self.execute(effects);
                }

                event = ws_events.next() => {
                    let effects = match event {
                        Some(WsEvent::Message(text)) => {
                            self.session.on_frame(text.as_bytes(), Instant::now())
                        }
                        Some(WsEvent::Disconnected { code, reason }) => {
                            tracing::info!(?code, %reason, "Stream connection lost");
                            self.session.on_disconnected()
                        }
                        Some(WsEvent::MaxReconnectReached { attempts }) => {
                            tracing::warn!(attempts, "Giving up on the stream connection");
                            self.session.on_unavailable()
                        }
                        Some(WsEvent::Connected) => Vec::new(),
                        Some(WsEvent::Error(e)) => {
                            tracing::debug!(error = %e, "Transport error");
                            Vec::new()
                        }
                        None => self.session.on_unavailable(),
                    };
                    self.execute(effects);
                }

                _ = flush.tick() => {}
            }

            self.flush(ws);
        }
    }

    /// Write whatever the connection manager releases.
    fn flush(&mut self, ws: &WsClient) {
        for msg in self.session.drain_outgoing() {
            if let Err(e) = ws.send(&msg) {
                tracing::warn!(error = %e, "Failed to write stream frame");
            }
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchBackfill(request) => {
                    let http = self.http.clone();
                    let symbol = self.session.symbol().clone();
                    let limit = self.window_capacity;
                    let tx = self.wake_tx.clone();
                    tokio::spawn(async move {
                        let bars = fetch_backfill(&http, &symbol, request.interval, limit).await;
                        let _ = tx.send(Wakeup::Backfill { request, bars }).await;
                    });
                }
                Effect::ScheduleResubscribe { interval, after } => {
                    let tx = self.wake_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(Wakeup::Resubscribe(interval)).await;
                    });
                }
                Effect::ScheduleBookRefresh { at } => {
                    let tx = self.wake_tx.clone();
                    let delay = at.saturating_duration_since(Instant::now());
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Wakeup::BookRefresh).await;
                    });
                }
                Effect::CandlesChanged => self.publish(self.session.candles_event()),
                Effect::BookChanged => self.publish(self.session.book_event()),
                Effect::ConnectionChanged(state) => self.publish(MarketEvent::Connection(state)),
            }
        }
    }

    fn publish(&self, event: MarketEvent) {
        if self.event_tx.try_send(event).is_err() {
            tracing::warn!("Market event channel full or closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = MarketConfig::default().window_capacity(0);
        let http = MarketHttp::new(&config.api_url, None).unwrap();
        assert!(matches!(
            MarketStream::new(config, http),
            Err(SdkError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_stream() {
        // Unroutable port with reconnects off: the actor stays up, the
        // transport gives up immediately.
        let mut config = MarketConfig::default()
            .ws_url("ws://127.0.0.1:1")
            .api_url("http://127.0.0.1:1");
        config.ws.reconnect = false;
        let handle = MarketStream::from_config(config).unwrap().spawn();

        let first = handle.events().next().await;
        assert!(matches!(first, Some(MarketEvent::Candles { .. })));

        assert!(handle.select_interval(Interval::Hour1).await.is_ok());
        handle.shutdown().await;
    }
}
