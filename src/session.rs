//! Lifecycle coordination — `MarketSession`.
//!
//! One session owns the shared connection state and both reconcilers for a
//! single market. It is a plain synchronous state machine: every input
//! (mount, app state change, interval selection, raw frame, timer, backfill
//! result) returns the [`Effect`]s a driver has to carry out. Outbound frames
//! are collected separately through [`MarketSession::drain_outgoing`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::domain::book::reconciler::Refresh;
use crate::domain::book::{DepthView, OrderBookReconciler};
use crate::domain::candle::{
    BackfillRequest, CandleBar, CandlePhase, CandleReconciler, PriceSummary,
};
use crate::shared::{Interval, Symbol};
use crate::ws::{ConnectionManager, ConnectionState, MessageOut, Routed, StreamKey};

/// Foreground state of the hosting application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    #[default]
    Active,
    Background,
    Inactive,
}

impl AppState {
    pub fn is_active(&self) -> bool {
        matches!(self, AppState::Active)
    }
}

/// Work the driver performs on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch candle history and report it, with the request, through
    /// [`MarketSession::on_backfill`].
    FetchBackfill(BackfillRequest),
    /// Call [`MarketSession::on_resubscribe_timer`] after `after`.
    ScheduleResubscribe { interval: Interval, after: Duration },
    /// Call [`MarketSession::on_refresh_timer`] at `at`.
    ScheduleBookRefresh { at: Instant },
    /// The candle window or its summary changed.
    CandlesChanged,
    /// The book should be redrawn.
    BookChanged,
    ConnectionChanged(ConnectionState),
}

/// View published to consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Candles {
        interval: Interval,
        bars: Vec<CandleBar>,
        summary: PriceSummary,
    },
    Book(DepthView),
    Connection(ConnectionState),
}

/// Single-market coordinator.
#[derive(Debug)]
pub struct MarketSession {
    conn: ConnectionManager,
    candles: CandleReconciler,
    book: OrderBookReconciler,
    app_state: AppState,
    mounted: bool,
    /// A reconnect left a gap in the candle stream; refetch history once ready.
    backfill_on_ready: bool,
}

impl MarketSession {
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            conn: ConnectionManager::new(config.symbol.clone()),
            candles: CandleReconciler::new(
                config.interval,
                config.window_capacity,
                config.resubscribe_delay,
            ),
            book: OrderBookReconciler::new(config.book_depth, config.refresh_window),
            app_state: AppState::Active,
            mounted: false,
            backfill_on_ready: false,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        self.conn.symbol()
    }

    pub fn app_state(&self) -> AppState {
        self.app_state
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn candles(&self) -> &CandleReconciler {
        &self.candles
    }

    pub fn book(&self) -> &OrderBookReconciler {
        &self.book
    }

    pub fn candles_event(&self) -> MarketEvent {
        MarketEvent::Candles {
            interval: self.candles.selected(),
            bars: self.candles.bars(),
            summary: self.candles.summary(),
        }
    }

    pub fn book_event(&self) -> MarketEvent {
        MarketEvent::Book(self.book.view())
    }

    /// Frames to write on the socket now.
    pub fn drain_outgoing(&mut self) -> Vec<MessageOut> {
        self.conn.drain_outgoing()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Subscribe the book and the selected interval and request history.
    pub fn mount(&mut self) -> Vec<Effect> {
        if self.mounted {
            return Vec::new();
        }
        self.mounted = true;
        tracing::info!(symbol = %self.symbol(), app_state = ?self.app_state, "Mounting market session");

        if self.app_state.is_active() {
            self.start_streams()
        } else {
            Vec::new()
        }
    }

    /// Drop every subscription. The driver closes the transport afterwards.
    pub fn unmount(&mut self) -> Vec<Effect> {
        if !self.mounted {
            return Vec::new();
        }
        self.mounted = false;
        tracing::info!(symbol = %self.symbol(), "Unmounting market session");
        self.stop_streams();
        self.conn.unsubscribe_all();
        Vec::new()
    }

    /// Foreground/background transition. Repeating the current state is a no-op.
    pub fn set_app_state(&mut self, state: AppState) -> Vec<Effect> {
        if state == self.app_state {
            return Vec::new();
        }
        let was_active = self.app_state.is_active();
        self.app_state = state;
        tracing::info!(?state, "App state changed");

        if !self.mounted {
            return Vec::new();
        }
        match (was_active, state.is_active()) {
            (true, false) => {
                self.stop_streams();
                Vec::new()
            }
            (false, true) => self.start_streams(),
            _ => Vec::new(),
        }
    }

    /// User picked an interval on the chart.
    pub fn select_interval(&mut self, interval: Interval) -> Vec<Effect> {
        let before = self.candles.selected();
        match self.candles.switch_interval(interval, &mut self.conn) {
            Some(plan) => vec![
                Effect::ScheduleResubscribe {
                    interval: plan.interval,
                    after: plan.resubscribe_after,
                },
                Effect::FetchBackfill(plan.backfill),
            ],
            None if self.candles.selected() != before => vec![Effect::CandlesChanged],
            None => Vec::new(),
        }
    }

    fn start_streams(&mut self) -> Vec<Effect> {
        self.book.start(&mut self.conn);
        vec![Effect::FetchBackfill(self.candles.start(&mut self.conn))]
    }

    fn stop_streams(&mut self) {
        self.candles.stop(&mut self.conn);
        self.book.stop(&mut self.conn);
        self.backfill_on_ready = false;
    }

    // ── Driver callbacks ─────────────────────────────────────────────────

    pub fn on_resubscribe_timer(&mut self, interval: Interval) -> Vec<Effect> {
        self.candles.resubscribe(interval, &mut self.conn);
        Vec::new()
    }

    pub fn on_backfill(&mut self, request: BackfillRequest, bars: Vec<CandleBar>) -> Vec<Effect> {
        if self.candles.apply_backfill(request, bars) {
            vec![Effect::CandlesChanged]
        } else {
            Vec::new()
        }
    }

    pub fn on_refresh_timer(&mut self, now: Instant) -> Vec<Effect> {
        if self.book.fire_refresh(now) {
            vec![Effect::BookChanged]
        } else {
            Vec::new()
        }
    }

    /// Feed one raw text frame from the transport.
    pub fn on_frame(&mut self, raw: &[u8], now: Instant) -> Vec<Effect> {
        let before = self.conn.state();
        let routed = self.conn.on_frame(raw);
        let mut effects = Vec::new();

        if self.conn.state() != before {
            effects.push(Effect::ConnectionChanged(self.conn.state()));
            if self.conn.is_ready() && std::mem::take(&mut self.backfill_on_ready) {
                effects.push(Effect::FetchBackfill(self.candles.request_backfill()));
            }
        }

        match routed {
            Some(Routed {
                key: StreamKey::Candles(interval),
                payload,
            }) => {
                if self.candles.apply_payload(interval, &payload) {
                    effects.push(Effect::CandlesChanged);
                }
            }
            Some(Routed {
                key: StreamKey::Book,
                payload,
            }) => match self.book.apply_payload(&payload, now) {
                Some(Refresh::Now) => effects.push(Effect::BookChanged),
                Some(Refresh::At(at)) => effects.push(Effect::ScheduleBookRefresh { at }),
                Some(Refresh::AlreadyScheduled) | None => {}
            },
            None => {}
        }
        effects
    }

    /// The transport lost the socket and is reconnecting.
    pub fn on_disconnected(&mut self) -> Vec<Effect> {
        let before = self.conn.state();
        self.conn.on_disconnected();
        if self.candles.phase() != CandlePhase::Idle {
            self.backfill_on_ready = true;
        }
        if self.conn.state() != before {
            vec![Effect::ConnectionChanged(self.conn.state())]
        } else {
            Vec::new()
        }
    }

    /// The transport gave up reconnecting.
    pub fn on_unavailable(&mut self) -> Vec<Effect> {
        let before = self.conn.state();
        self.conn.on_unavailable();
        if self.conn.state() != before {
            vec![Effect::ConnectionChanged(self.conn.state())]
        } else {
            Vec::new()
        }
    }
}
