//! Subscription keys, wire parameters, and the binding registry.

use crate::domain::candle::candle_key;
use crate::shared::{ChannelId, Interval, Symbol};
use serde::Serialize;

/// Logical stream the session can subscribe to.
///
/// The symbol is fixed per session, so a key only carries what varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Candles(Interval),
    Book,
}

impl StreamKey {
    pub fn channel(&self) -> &'static str {
        match self {
            StreamKey::Candles(_) => "candles",
            StreamKey::Book => "book",
        }
    }

    /// Deterministic key for logs and maps.
    pub fn subscription_key(&self) -> String {
        match self {
            StreamKey::Candles(interval) => format!("candles:{interval}"),
            StreamKey::Book => "book".to_string(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.subscription_key())
    }
}

/// Parameters for subscribing to a channel, flattened into the `subscribe` event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum SubscribeParams {
    /// `key` is `trade:<interval>:t<SYMBOL>`.
    Candles { key: String },
    Book { symbol: String },
}

impl SubscribeParams {
    pub fn for_key(key: &StreamKey, symbol: &Symbol) -> Self {
        match key {
            StreamKey::Candles(interval) => SubscribeParams::Candles {
                key: candle_key(*interval, symbol),
            },
            StreamKey::Book => SubscribeParams::Book {
                symbol: symbol.trading(),
            },
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Where a wanted subscription stands on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Subscribe message queued, not yet written.
    Queued,
    /// Subscribe written, waiting for the ack.
    AwaitingAck,
    /// Acked and bound to a channel id.
    Confirmed(ChannelId),
}

#[derive(Debug, Clone)]
struct Entry {
    key: StreamKey,
    binding: Binding,
}

/// Subscriptions the session wants, plus subscriptions it no longer wants but
/// whose ack is still outstanding (those get unsubscribed as soon as they bind).
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    wanted: Vec<Entry>,
    cancel_on_ack: Vec<StreamKey>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `key` as wanted with an initial binding. Returns `false` if it already was.
    pub fn track(&mut self, key: StreamKey, binding: Binding) -> bool {
        if self.wanted.iter().any(|entry| entry.key == key) {
            return false;
        }
        self.wanted.push(Entry { key, binding });
        true
    }

    /// Stop wanting `key`, returning its binding at the time of removal.
    pub fn untrack(&mut self, key: &StreamKey) -> Option<Binding> {
        let index = self.wanted.iter().position(|entry| entry.key == *key)?;
        Some(self.wanted.remove(index).binding)
    }

    pub fn binding(&self, key: &StreamKey) -> Option<Binding> {
        self.wanted
            .iter()
            .find(|entry| entry.key == *key)
            .map(|entry| entry.binding)
    }

    pub fn is_wanted(&self, key: &StreamKey) -> bool {
        self.binding(key).is_some()
    }

    pub fn set_binding(&mut self, key: &StreamKey, binding: Binding) {
        if let Some(entry) = self.wanted.iter_mut().find(|entry| entry.key == *key) {
            entry.binding = binding;
        }
    }

    /// Wanted key bound to `chan_id`.
    pub fn key_for(&self, chan_id: ChannelId) -> Option<StreamKey> {
        self.wanted
            .iter()
            .find(|entry| entry.binding == Binding::Confirmed(chan_id))
            .map(|entry| entry.key)
    }

    /// Wanted keys still waiting for an ack, oldest first.
    pub fn awaiting_ack(&self) -> impl Iterator<Item = StreamKey> + '_ {
        self.wanted
            .iter()
            .filter(|entry| entry.binding == Binding::AwaitingAck)
            .map(|entry| entry.key)
    }

    pub fn wanted_keys(&self) -> impl Iterator<Item = StreamKey> + '_ {
        self.wanted.iter().map(|entry| entry.key)
    }

    pub fn mark_cancel_on_ack(&mut self, key: StreamKey) {
        if !self.cancel_on_ack.contains(&key) {
            self.cancel_on_ack.push(key);
        }
    }

    /// Consume a cancel-on-ack marker for `key`.
    pub fn take_cancel_on_ack(&mut self, key: &StreamKey) -> bool {
        let before = self.cancel_on_ack.len();
        self.cancel_on_ack.retain(|pending| pending != key);
        self.cancel_on_ack.len() != before
    }

    pub fn cancelled_keys(&self) -> impl Iterator<Item = StreamKey> + '_ {
        self.cancel_on_ack.iter().copied()
    }

    /// Forget every channel id and cancel marker; every wanted key goes back to `Queued`.
    pub fn reset_bindings(&mut self) {
        for entry in &mut self.wanted {
            entry.binding = Binding::Queued;
        }
        self.cancel_on_ack.clear();
    }

    pub fn len(&self) -> usize {
        self.wanted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wanted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_key_format() {
        assert_eq!(
            candle_key(Interval::Day1, &Symbol::new("BTCUSD")),
            "trade:1D:tBTCUSD"
        );
    }

    #[test]
    fn test_subscription_key_deterministic() {
        assert_eq!(StreamKey::Candles(Interval::Minute30).subscription_key(), "candles:30m");
        assert_eq!(StreamKey::Book.to_string(), "book");
    }

    #[test]
    fn test_track_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.track(StreamKey::Book, Binding::Queued));
        assert!(!registry.track(StreamKey::Book, Binding::AwaitingAck));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_key_for_only_matches_confirmed() {
        let mut registry = SubscriptionRegistry::new();
        let key = StreamKey::Candles(Interval::Hour1);
        registry.track(key, Binding::AwaitingAck);
        assert_eq!(registry.key_for(ChannelId(5)), None);
        assert_eq!(registry.awaiting_ack().collect::<Vec<_>>(), vec![key]);

        registry.set_binding(&key, Binding::Confirmed(ChannelId(5)));
        assert_eq!(registry.key_for(ChannelId(5)), Some(key));
        assert_eq!(registry.awaiting_ack().count(), 0);
    }

    #[test]
    fn test_cancel_marker_is_consumed_once() {
        let mut registry = SubscriptionRegistry::new();
        registry.mark_cancel_on_ack(StreamKey::Book);
        registry.mark_cancel_on_ack(StreamKey::Book);
        assert!(registry.take_cancel_on_ack(&StreamKey::Book));
        assert!(!registry.take_cancel_on_ack(&StreamKey::Book));
    }

    #[test]
    fn test_reset_bindings_requeues_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.track(StreamKey::Book, Binding::Confirmed(ChannelId(1)));
        registry.mark_cancel_on_ack(StreamKey::Candles(Interval::Minute5));

        registry.reset_bindings();
        assert_eq!(registry.binding(&StreamKey::Book), Some(Binding::Queued));
        assert_eq!(registry.cancelled_keys().count(), 0);
    }
}
