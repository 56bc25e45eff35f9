//! Sans-IO protocol state for the shared feed connection.
//!
//! `ConnectionManager` never touches a socket. The driver feeds it raw frames
//! ([`ConnectionManager::on_frame`]) and transport events, and writes whatever
//! [`ConnectionManager::drain_outgoing`] hands back. Nothing is released for
//! writing before the server identity frame has been seen; messages issued
//! earlier wait in order and are flushed on readiness.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use super::subscriptions::{Binding, StreamKey, SubscribeParams, SubscriptionRegistry};
use super::{Frame, MessageOut, StreamRef};
use crate::domain::candle::candle_key;
use crate::shared::{ChannelId, Symbol};

/// How often a driver re-checks readiness while the connection is still `Connecting`.
pub const SEND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket opening, or open without a server identity yet.
    #[default]
    Connecting,
    /// Server identity received; subscriptions may be written.
    Ready,
    /// Gave up. Nothing will be written again.
    Unavailable,
}

/// A data frame resolved to the stream that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub key: StreamKey,
    pub payload: Value,
}

#[derive(Debug, Clone)]
struct Outbound {
    message: MessageOut,
    /// Set for subscribes issued through [`ConnectionManager::subscribe`].
    key: Option<StreamKey>,
}

/// Readiness gate, outbound queue, subscription bindings and frame routing.
#[derive(Debug)]
pub struct ConnectionManager {
    symbol: Symbol,
    state: ConnectionState,
    registry: SubscriptionRegistry,
    queue: VecDeque<Outbound>,
}

impl ConnectionManager {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: ConnectionState::Connecting,
            registry: SubscriptionRegistry::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Messages waiting to be written (all of them while not `Ready`).
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_subscribed(&self, key: &StreamKey) -> bool {
        self.registry.is_wanted(key)
    }

    pub fn channel_id(&self, key: &StreamKey) -> Option<ChannelId> {
        match self.registry.binding(key)? {
            Binding::Confirmed(chan_id) => Some(chan_id),
            _ => None,
        }
    }

    pub fn wanted(&self) -> Vec<StreamKey> {
        self.registry.wanted_keys().collect()
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    /// Queue a raw message. It is released by `drain_outgoing` once the
    /// connection is ready, in the order it was sent.
    pub fn send(&mut self, message: MessageOut) {
        self.push(Outbound { message, key: None });
    }

    fn push(&mut self, outbound: Outbound) {
        if !self.is_ready() {
            tracing::debug!(
                state = ?self.state,
                queued = self.queue.len() + 1,
                "Connection not ready, holding message"
            );
        }
        self.queue.push_back(outbound);
    }

    /// Subscribe to `key`. Returns `false` when it is already wanted.
    pub fn subscribe(&mut self, key: StreamKey) -> bool {
        if self.registry.is_wanted(&key) {
            return false;
        }

        // A cancelled subscribe whose ack is still in flight is simply revived.
        if self.registry.take_cancel_on_ack(&key) {
            tracing::debug!(%key, "Reviving in-flight subscription");
            self.registry.track(key, Binding::AwaitingAck);
            return true;
        }

        tracing::info!(%key, "Subscribing");
        self.registry.track(key, Binding::Queued);
        let params = SubscribeParams::for_key(&key, &self.symbol);
        self.push(Outbound {
            message: MessageOut::subscribe(params),
            key: Some(key),
        });
        true
    }

    /// Unsubscribe from `key`. Returns `false` when it was not wanted.
    ///
    /// Confirmed channels get an `unsubscribe` frame; a subscribe still in the
    /// queue is withdrawn; a subscribe awaiting its ack is unsubscribed as soon
    /// as the ack binds a channel id.
    pub fn unsubscribe(&mut self, key: StreamKey) -> bool {
        let Some(binding) = self.registry.untrack(&key) else {
            return false;
        };

        tracing::info!(%key, ?binding, "Unsubscribing");
        match binding {
            Binding::Confirmed(chan_id) => self.send(MessageOut::unsubscribe(chan_id)),
            Binding::Queued => self.queue.retain(|outbound| outbound.key != Some(key)),
            Binding::AwaitingAck => self.registry.mark_cancel_on_ack(key),
        }
        true
    }

    pub fn unsubscribe_all(&mut self) {
        for key in self.wanted() {
            self.unsubscribe(key);
        }
    }

    /// Messages to write now. Empty until the connection is ready.
    pub fn drain_outgoing(&mut self) -> Vec<MessageOut> {
        if !self.is_ready() || self.queue.is_empty() {
            return Vec::new();
        }

        let drained: Vec<Outbound> = self.queue.drain(..).collect();
        drained
            .into_iter()
            .map(|outbound| {
                if let Some(key) = outbound.key {
                    self.registry.set_binding(&key, Binding::AwaitingAck);
                }
                outbound.message
            })
            .collect()
    }

    // ── Inbound ──────────────────────────────────────────────────────────

    /// Handle one raw text frame. Data for a confirmed channel is returned for
    /// routing; everything else is consumed here. Malformed frames are dropped.
    pub fn on_frame(&mut self, raw: &[u8]) -> Option<Routed> {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding malformed frame");
                return None;
            }
        };

        match frame {
            Frame::Ready => {
                if self.state == ConnectionState::Connecting {
                    tracing::info!(pending = self.queue.len(), "Feed ready");
                    self.state = ConnectionState::Ready;
                }
                None
            }
            Frame::Subscribed(ack) => {
                self.on_subscribed(ack.chan_id, &ack.stream);
                None
            }
            Frame::Unsubscribed { chan_id } => {
                tracing::debug!(%chan_id, "Channel closed");
                if let Some(key) = self.registry.key_for(chan_id) {
                    tracing::warn!(%key, %chan_id, "Server closed a wanted channel");
                    self.registry.untrack(&key);
                }
                None
            }
            Frame::Error { msg, code, stream } => {
                tracing::warn!(?code, %msg, "Feed error event");
                self.on_error(&stream);
                None
            }
            Frame::Heartbeat { chan_id } => {
                tracing::trace!(%chan_id, "Heartbeat");
                None
            }
            Frame::Data { chan_id, payload } => match self.registry.key_for(chan_id) {
                Some(key) => Some(Routed { key, payload }),
                None => {
                    tracing::trace!(%chan_id, "Data for unbound channel");
                    None
                }
            },
            Frame::Ignored => None,
        }
    }

    fn on_subscribed(&mut self, chan_id: ChannelId, stream: &StreamRef) {
        let awaiting = self
            .registry
            .awaiting_ack()
            .find(|key| self.matches(key, stream));
        if let Some(key) = awaiting {
            tracing::info!(%key, %chan_id, "Subscription confirmed");
            self.registry.set_binding(&key, Binding::Confirmed(chan_id));
            return;
        }

        let cancelled = self
            .registry
            .cancelled_keys()
            .find(|key| self.matches(key, stream));
        if let Some(key) = cancelled {
            tracing::info!(%key, %chan_id, "Late ack for cancelled subscription");
            self.registry.take_cancel_on_ack(&key);
            self.send(MessageOut::unsubscribe(chan_id));
            return;
        }

        tracing::debug!(%chan_id, ?stream, "Ack matches no pending subscription");
    }

    fn on_error(&mut self, stream: &StreamRef) {
        let rejected = self
            .registry
            .awaiting_ack()
            .find(|key| self.matches(key, stream));
        if let Some(key) = rejected {
            tracing::warn!(%key, "Dropping rejected subscription");
            self.registry.untrack(&key);
            return;
        }

        let cancelled = self
            .registry
            .cancelled_keys()
            .find(|key| self.matches(key, stream));
        if let Some(key) = cancelled {
            self.registry.take_cancel_on_ack(&key);
        }
    }

    /// Whether echoed stream fields are consistent with `key`. Missing fields match.
    fn matches(&self, key: &StreamKey, stream: &StreamRef) -> bool {
        if stream.channel.as_deref().is_some_and(|channel| channel != key.channel()) {
            return false;
        }
        match key {
            StreamKey::Candles(interval) => stream
                .key
                .as_deref()
                .map_or(true, |echoed| echoed == candle_key(*interval, &self.symbol)),
            StreamKey::Book => stream
                .symbol
                .as_deref()
                .map_or(true, |echoed| echoed == self.symbol.trading()),
        }
    }

    // ── Transport events ─────────────────────────────────────────────────

    /// The socket dropped. Channel ids die with it, so every wanted
    /// subscription is queued again for the next ready connection.
    pub fn on_disconnected(&mut self) {
        if self.state == ConnectionState::Unavailable {
            return;
        }

        self.state = ConnectionState::Connecting;
        self.registry.reset_bindings();
        self.queue.retain(|outbound| {
            outbound.key.is_none() && !matches!(outbound.message, MessageOut::Unsubscribe { .. })
        });

        for key in self.wanted() {
            let params = SubscribeParams::for_key(&key, &self.symbol);
            self.queue.push_back(Outbound {
                message: MessageOut::subscribe(params),
                key: Some(key),
            });
        }
        tracing::info!(resubscribe = self.queue.len(), "Connection lost, waiting for readiness");
    }

    /// The transport gave up. Terminal.
    pub fn on_unavailable(&mut self) {
        if self.state != ConnectionState::Unavailable {
            tracing::warn!(dropped = self.queue.len(), "Feed unavailable");
        }
        self.state = ConnectionState::Unavailable;
        self.queue.clear();
        self.registry.reset_bindings();
    }
}
