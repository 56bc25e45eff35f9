//! Book reconciliation — applies every frame, throttles the refresh signal.

use std::time::{Duration, Instant};

use serde_json::Value;

use super::wire::BookPayload;
use super::{BookLevel, DepthView, OrderBookState, DEFAULT_BOOK_DEPTH};
use crate::ws::{ConnectionManager, StreamKey};

/// Default refresh window for book updates.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_millis(1000);

/// What the caller should do about presenting the book after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Refresh immediately.
    Now,
    /// Arm a timer and call [`RefreshThrottle::fire`] at this instant.
    At(Instant),
    /// A trailing refresh is already armed and will carry this update.
    AlreadyScheduled,
}

/// Leading-edge plus trailing-edge throttle.
///
/// The first update after a quiet window refreshes at once; updates inside the
/// window collapse into one refresh at the end of it. At most one refresh is
/// emitted per window.
#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    window: Duration,
    last_emit: Option<Instant>,
    scheduled: Option<Instant>,
}

impl RefreshThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
            scheduled: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an update at `now`.
    pub fn record(&mut self, now: Instant) -> Refresh {
        if self.scheduled.is_some() {
            return Refresh::AlreadyScheduled;
        }

        match self.last_emit {
            Some(last) if now < last + self.window => {
                let deadline = last + self.window;
                self.scheduled = Some(deadline);
                Refresh::At(deadline)
            }
            _ => {
                self.last_emit = Some(now);
                Refresh::Now
            }
        }
    }

    /// The armed timer went off. Returns `true` if a refresh is due.
    pub fn fire(&mut self, now: Instant) -> bool {
        if self.scheduled.take().is_none() {
            return false;
        }
        self.last_emit = Some(now);
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    /// Forget pending and past refreshes; a timer armed earlier becomes a no-op.
    pub fn reset(&mut self) {
        self.last_emit = None;
        self.scheduled = None;
    }
}

impl Default for RefreshThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_WINDOW)
    }
}

/// Owns the order book and its refresh cadence.
#[derive(Debug, Clone)]
pub struct OrderBookReconciler {
    book: OrderBookState,
    throttle: RefreshThrottle,
    depth: usize,
}

impl Default for OrderBookReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_BOOK_DEPTH, DEFAULT_REFRESH_WINDOW)
    }
}

impl OrderBookReconciler {
    pub fn new(depth: usize, refresh_window: Duration) -> Self {
        Self {
            book: OrderBookState::new(),
            throttle: RefreshThrottle::new(refresh_window),
            depth,
        }
    }

    pub fn start(&mut self, conn: &mut ConnectionManager) {
        conn.subscribe(StreamKey::Book);
    }

    /// Unsubscribe. The book stays as last seen and the throttle is reset.
    pub fn stop(&mut self, conn: &mut ConnectionManager) {
        conn.unsubscribe(StreamKey::Book);
        self.throttle.reset();
    }

    pub fn apply_snapshot(&mut self, levels: Vec<BookLevel>, now: Instant) -> Refresh {
        tracing::debug!(levels = levels.len(), "Book snapshot");
        self.book.apply_snapshot(levels);
        self.throttle.record(now)
    }

    pub fn apply_delta(&mut self, level: BookLevel, now: Instant) -> Refresh {
        self.book.apply_delta(level);
        self.throttle.record(now)
    }

    /// Apply a routed `book` channel payload. `None` for heartbeats or junk.
    pub fn apply_payload(&mut self, payload: &Value, now: Instant) -> Option<Refresh> {
        match BookPayload::from_value(payload)? {
            BookPayload::Snapshot(levels) => Some(self.apply_snapshot(levels, now)),
            BookPayload::Delta(level) => Some(self.apply_delta(level, now)),
        }
    }

    /// The trailing refresh timer fired.
    pub fn fire_refresh(&mut self, now: Instant) -> bool {
        self.throttle.fire(now)
    }

    /// Top `limit` levels per side.
    pub fn depth(&self, limit: usize) -> DepthView {
        self.book.depth(limit)
    }

    /// Depth view at the configured number of rows.
    pub fn view(&self) -> DepthView {
        self.book.depth(self.depth)
    }

    pub fn book(&self) -> &OrderBookState {
        &self.book
    }

    pub fn throttle(&self) -> &RefreshThrottle {
        &self.throttle
    }

    pub fn clear(&mut self) {
        self.book.clear();
        self.throttle.reset();
    }
}
