//! Candle stream reconciliation — one selected interval, REST backfill merged
//! with live ticks, and guarded interval switching.
//!
//! The reconciler never waits. A switch returns a [`SwitchPlan`] describing
//! the delayed resubscribe and the backfill to run; the driver executes both
//! and reports back through [`CandleReconciler::resubscribe`] and
//! [`CandleReconciler::apply_backfill`]. Every backfill request carries a
//! generation; only the response to the latest request is applied.

use std::time::Duration;

use serde_json::Value;

use super::wire::CandlePayload;
use super::{CandleBar, CandleWindow, PriceSummary, DEFAULT_WINDOW_CAPACITY};
use crate::shared::Interval;
use crate::ws::{ConnectionManager, StreamKey};

/// Delay between unsubscribing the old interval and subscribing the new one.
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandlePhase {
    /// Not subscribed.
    #[default]
    Idle,
    /// Subscribed (or about to be) and waiting for history.
    Backfilling,
    /// History applied; live ticks flowing.
    Streaming,
}

/// Ask the driver to fetch history for `interval`. Hand it back unchanged
/// with the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillRequest {
    pub interval: Interval,
    /// Issue order. Superseded requests are discarded on arrival.
    pub generation: u64,
}

/// Work a switch leaves for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPlan {
    pub interval: Interval,
    /// Call [`CandleReconciler::resubscribe`] after this delay.
    pub resubscribe_after: Duration,
    /// Run in parallel with the delay.
    pub backfill: BackfillRequest,
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingSwitch {
    resubscribed: bool,
    backfilled: bool,
}

/// Owns the candle window for the selected interval.
#[derive(Debug, Clone)]
pub struct CandleReconciler {
    window: CandleWindow,
    selected: Interval,
    phase: CandlePhase,
    switch: Option<PendingSwitch>,
    resubscribe_delay: Duration,
    /// Generation of the most recent backfill request.
    backfill_generation: u64,
}

impl Default for CandleReconciler {
    fn default() -> Self {
        Self::new(Interval::default(), DEFAULT_WINDOW_CAPACITY, DEFAULT_RESUBSCRIBE_DELAY)
    }
}

impl CandleReconciler {
    pub fn new(interval: Interval, capacity: usize, resubscribe_delay: Duration) -> Self {
        Self {
            window: CandleWindow::new(capacity),
            selected: interval,
            phase: CandlePhase::Idle,
            switch: None,
            resubscribe_delay,
            backfill_generation: 0,
        }
    }

    pub fn selected(&self) -> Interval {
        self.selected
    }

    pub fn phase(&self) -> CandlePhase {
        self.phase
    }

    /// Whether an interval switch is in flight (new switches are ignored).
    pub fn is_switching(&self) -> bool {
        self.switch.is_some()
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }

    pub fn bars(&self) -> Vec<CandleBar> {
        self.window.to_vec()
    }

    pub fn summary(&self) -> PriceSummary {
        self.window.summary()
    }

    /// Subscribe the selected interval and ask for its history.
    pub fn start(&mut self, conn: &mut ConnectionManager) -> BackfillRequest {
        conn.subscribe(StreamKey::Candles(self.selected));
        self.phase = CandlePhase::Backfilling;
        tracing::debug!(interval = %self.selected, "Candle stream started");
        self.request_backfill()
    }

    /// Fresh history request for the selected interval. Any request issued
    /// earlier becomes stale.
    pub fn request_backfill(&mut self) -> BackfillRequest {
        self.backfill_generation += 1;
        BackfillRequest {
            interval: self.selected,
            generation: self.backfill_generation,
        }
    }

    /// Unsubscribe. The window is kept and displayed as last seen; an
    /// unfinished switch is abandoned.
    pub fn stop(&mut self, conn: &mut ConnectionManager) {
        conn.unsubscribe(StreamKey::Candles(self.selected));
        self.phase = CandlePhase::Idle;
        self.switch = None;
    }

    /// Switch to `interval`.
    ///
    /// Ignored while another switch is in flight or when `interval` is already
    /// selected. While stopped only the selection changes; the next `start`
    /// picks it up.
    pub fn switch_interval(
        &mut self,
        interval: Interval,
        conn: &mut ConnectionManager,
    ) -> Option<SwitchPlan> {
        if self.switch.is_some() {
            tracing::debug!(requested = %interval, "Interval switch already in flight, ignoring");
            return None;
        }
        if interval == self.selected {
            return None;
        }

        if self.phase == CandlePhase::Idle {
            tracing::debug!(from = %self.selected, to = %interval, "Interval selected while stopped");
            self.selected = interval;
            self.window.clear();
            return None;
        }

        tracing::info!(from = %self.selected, to = %interval, "Switching interval");
        conn.unsubscribe(StreamKey::Candles(self.selected));
        self.selected = interval;
        self.phase = CandlePhase::Backfilling;
        self.switch = Some(PendingSwitch::default());

        Some(SwitchPlan {
            interval,
            resubscribe_after: self.resubscribe_delay,
            backfill: self.request_backfill(),
        })
    }

    /// Delayed half of a switch. Returns `false` if `interval` is no longer
    /// selected or the stream was stopped meanwhile.
    pub fn resubscribe(&mut self, interval: Interval, conn: &mut ConnectionManager) -> bool {
        if interval != self.selected || self.phase == CandlePhase::Idle {
            tracing::debug!(%interval, "Dropping stale resubscribe");
            return false;
        }

        conn.subscribe(StreamKey::Candles(interval));
        if let Some(switch) = self.switch.as_mut() {
            switch.resubscribed = true;
        }
        self.complete_switch_if_done();
        true
    }

    /// Apply a history response, most recent bar first.
    ///
    /// Discarded unless `request` is the latest one issued for the selected
    /// interval. Otherwise the window is fully replaced; an empty response
    /// (failed fetch) leaves it empty.
    pub fn apply_backfill(&mut self, request: BackfillRequest, bars: Vec<CandleBar>) -> bool {
        let interval = request.interval;
        if interval != self.selected || request.generation != self.backfill_generation {
            tracing::debug!(
                %interval,
                generation = request.generation,
                latest = self.backfill_generation,
                selected = %self.selected,
                "Discarding stale backfill"
            );
            return false;
        }

        tracing::debug!(%interval, bars = bars.len(), "Applying backfill");
        self.window.replace_most_recent_first(bars);
        if self.phase == CandlePhase::Backfilling {
            self.phase = CandlePhase::Streaming;
        }
        if let Some(switch) = self.switch.as_mut() {
            switch.backfilled = true;
        }
        self.complete_switch_if_done();
        true
    }

    /// Apply the channel's initial snapshot (most recent first). Same replace
    /// semantics as a backfill, without touching switch progress.
    pub fn apply_snapshot(&mut self, interval: Interval, bars: Vec<CandleBar>) -> bool {
        if interval != self.selected {
            return false;
        }
        self.window.replace_most_recent_first(bars);
        if self.phase == CandlePhase::Backfilling {
            self.phase = CandlePhase::Streaming;
        }
        true
    }

    /// Apply one live bar. Discarded if `interval` is not the selected one.
    pub fn apply_tick(&mut self, interval: Interval, bar: CandleBar) -> bool {
        if interval != self.selected {
            tracing::trace!(%interval, "Discarding tick for unselected interval");
            return false;
        }
        self.window.apply(bar);
        true
    }

    /// Apply a routed `candles` channel payload. `false` for heartbeats, junk,
    /// or stale intervals.
    pub fn apply_payload(&mut self, interval: Interval, payload: &Value) -> bool {
        match CandlePayload::from_value(payload) {
            Some(CandlePayload::Snapshot(bars)) => self.apply_snapshot(interval, bars),
            Some(CandlePayload::Update(bar)) => self.apply_tick(interval, bar),
            None => false,
        }
    }

    fn complete_switch_if_done(&mut self) {
        if let Some(switch) = self.switch {
            if switch.resubscribed && switch.backfilled {
                tracing::debug!(interval = %self.selected, "Interval switch complete");
                self.switch = None;
            }
        }
    }
}
