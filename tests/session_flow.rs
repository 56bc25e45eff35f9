//! Drives a `MarketSession` frame by frame, no network involved.
//!
//! Run with:
//! ```bash
//! cargo test --test session_flow
//! ```

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde_json::{json, Value};

use bfx_market::prelude::*;

const READY: &str = r#"{"event":"info","version":2,"serverId":"8e8b3c4a","platform":{"status":1}}"#;
const BOOK_ACK: &str = r#"{"event":"subscribed","channel":"book","chanId":10,"symbol":"tBTCUSD","prec":"P0","freq":"F0","len":"25","pair":"BTCUSD"}"#;
const CANDLES_ACK: &str = r#"{"event":"subscribed","channel":"candles","chanId":20,"key":"trade:5m:tBTCUSD"}"#;

fn bar(timestamp: i64, close: i64) -> CandleBar {
    CandleBar {
        timestamp,
        open: Decimal::from(close),
        close: Decimal::from(close),
        high: Decimal::from(close),
        low: Decimal::from(close),
    }
}

fn json_of(messages: &[MessageOut]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| serde_json::to_value(msg).unwrap())
        .collect()
}

/// The history request among `effects`.
fn requested(effects: &[Effect]) -> BackfillRequest {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::FetchBackfill(request) => Some(*request),
            _ => None,
        })
        .expect("effects should request history")
}

/// Mounted, ready and with both channels confirmed. Also returns the
/// history request issued on mount.
fn live_session() -> (MarketSession, BackfillRequest) {
    let mut session = MarketSession::new(&MarketConfig::default());
    let mounted = requested(&session.mount());
    session.on_frame(READY.as_bytes(), Instant::now());
    session.drain_outgoing();
    session.on_frame(BOOK_ACK.as_bytes(), Instant::now());
    session.on_frame(CANDLES_ACK.as_bytes(), Instant::now());
    (session, mounted)
}

#[test]
fn subscriptions_wait_for_readiness_and_flush_in_order() {
    let mut session = MarketSession::new(&MarketConfig::default());
    session.mount();
    assert!(session.drain_outgoing().is_empty());
    assert_eq!(session.connection().pending_len(), 2);

    // Non-JSON and unrelated events leave the connection alone.
    assert!(session.on_frame(b"not json", Instant::now()).is_empty());
    assert!(session.drain_outgoing().is_empty());

    session.on_frame(READY.as_bytes(), Instant::now());
    assert_eq!(
        json_of(&session.drain_outgoing()),
        vec![
            json!({"event": "subscribe", "channel": "book", "symbol": "tBTCUSD"}),
            json!({"event": "subscribe", "channel": "candles", "key": "trade:5m:tBTCUSD"}),
        ]
    );
    assert!(session.drain_outgoing().is_empty());
}

#[test]
fn acks_bind_channels_and_data_is_routed() {
    let (mut session, mounted) = live_session();
    let conn = session.connection();
    assert_eq!(conn.channel_id(&StreamKey::Book), Some(ChannelId(10)));
    assert_eq!(
        conn.channel_id(&StreamKey::Candles(Interval::Minute5)),
        Some(ChannelId(20))
    );

    let effects = session.on_backfill(
        mounted,
        vec![bar(3_000, 103), bar(2_000, 102), bar(1_000, 101)],
    );
    assert_eq!(effects, vec![Effect::CandlesChanged]);

    // In-progress bar replaces, next bar appends.
    let effects = session.on_frame(br#"[20,[3000,103,104,104,103,1.5]]"#, Instant::now());
    assert_eq!(effects, vec![Effect::CandlesChanged]);
    session.on_frame(br#"[20,[4000,104,100,104,99,2]]"#, Instant::now());

    let bars = session.candles().bars();
    let stamps: Vec<i64> = bars.iter().map(|bar| bar.timestamp).collect();
    assert_eq!(stamps, vec![1_000, 2_000, 3_000, 4_000]);
    assert_eq!(bars[2].close, Decimal::from(104));

    let summary = session.candles().summary();
    assert_eq!(summary.last_price, Decimal::from(100));
    assert_eq!(summary.change.direction, ChangeDirection::Negative);
    assert_eq!(summary.change.amount, Decimal::from(4));

    // Heartbeats and data for unknown channels do nothing.
    assert!(session.on_frame(br#"[20,"hb"]"#, Instant::now()).is_empty());
    assert!(session.on_frame(br#"[99,[1,2,3]]"#, Instant::now()).is_empty());
}

#[test]
fn book_refresh_is_throttled_with_trailing_update() {
    let (mut session, _) = live_session();
    let t0 = Instant::now();

    let effects = session.on_frame(
        br#"[10,[[100,2,1.5],[99,1,0.5],[101,3,-2],[102,1,-1]]]"#,
        t0,
    );
    assert_eq!(effects, vec![Effect::BookChanged]);

    let view = session.book().view();
    assert_eq!(view.bids[0].price, Decimal::from(100));
    assert_eq!(view.asks[0].price, Decimal::from(101));
    assert_eq!(view.asks[0].bar_width_pct, 100.0);

    let t1 = t0 + Duration::from_millis(200);
    let effects = session.on_frame(br#"[10,[100,0,1]]"#, t1);
    let deadline = t0 + Duration::from_millis(1000);
    assert_eq!(effects, vec![Effect::ScheduleBookRefresh { at: deadline }]);

    // Collapses into the already scheduled refresh.
    let t2 = t0 + Duration::from_millis(400);
    assert!(session.on_frame(br#"[10,[98,4,3]]"#, t2).is_empty());

    assert_eq!(session.on_refresh_timer(deadline), vec![Effect::BookChanged]);
    let view = session.book().view();
    let bid_prices: Vec<Decimal> = view.bids.iter().map(|row| row.price).collect();
    assert_eq!(bid_prices, vec![Decimal::from(99), Decimal::from(98)]);

    // A stray timer after the refresh is a no-op.
    assert!(session.on_refresh_timer(deadline).is_empty());
}

#[test]
fn interval_switch_discards_stale_data() {
    let (mut session, mounted) = live_session();
    session.on_backfill(mounted, vec![bar(2_000, 2), bar(1_000, 1)]);

    let effects = session.select_interval(Interval::Hour1);
    let switched = requested(&effects);
    assert_eq!(switched.interval, Interval::Hour1);
    assert_eq!(
        effects,
        vec![
            Effect::ScheduleResubscribe {
                interval: Interval::Hour1,
                after: Duration::from_millis(500),
            },
            Effect::FetchBackfill(switched),
        ]
    );
    assert_eq!(
        json_of(&session.drain_outgoing()),
        vec![json!({"event": "unsubscribe", "chanId": 20})]
    );

    // Old channel data and an old backfill arriving late are ignored.
    assert!(session
        .on_frame(br#"[20,[3000,1,1,1,1,1]]"#, Instant::now())
        .is_empty());
    assert!(session
        .on_backfill(mounted, vec![bar(9_000, 9)])
        .is_empty());

    session.on_resubscribe_timer(Interval::Hour1);
    assert_eq!(
        json_of(&session.drain_outgoing()),
        vec![json!({"event": "subscribe", "channel": "candles", "key": "trade:1h:tBTCUSD"})]
    );
    assert!(session.candles().is_switching());

    let effects = session.on_backfill(switched, vec![bar(3_600_000, 50)]);
    assert_eq!(effects, vec![Effect::CandlesChanged]);
    assert!(!session.candles().is_switching());
    assert_eq!(session.candles().bars(), vec![bar(3_600_000, 50)]);

    // New channel binds and streams.
    session.on_frame(
        br#"{"event":"subscribed","channel":"candles","chanId":21,"key":"trade:1h:tBTCUSD"}"#,
        Instant::now(),
    );
    let effects = session.on_frame(br#"[21,[7200000,50,51,52,49,1]]"#, Instant::now());
    assert_eq!(effects, vec![Effect::CandlesChanged]);
    assert_eq!(session.candles().bars().len(), 2);
}

#[test]
fn background_unsubscribes_and_foreground_restores() {
    let (mut session, mounted) = live_session();

    assert!(session.set_app_state(AppState::Background).is_empty());
    let sent = json_of(&session.drain_outgoing());
    assert_eq!(sent.len(), 2);
    assert!(sent.contains(&json!({"event": "unsubscribe", "chanId": 10})));
    assert!(sent.contains(&json!({"event": "unsubscribe", "chanId": 20})));

    let effects = session.set_app_state(AppState::Active);
    let restored = requested(&effects);
    assert_eq!(effects, vec![Effect::FetchBackfill(restored)]);
    assert_eq!(restored.interval, Interval::Minute5);
    assert_ne!(restored.generation, mounted.generation);
    assert_eq!(session.drain_outgoing().len(), 2);
}

#[test]
fn reconnect_resubscribes_and_refetches() {
    let (mut session, mounted) = live_session();

    session.on_disconnected();
    assert_eq!(session.connection().state(), ConnectionState::Connecting);
    assert!(session.drain_outgoing().is_empty());
    assert!(session
        .on_frame(br#"[20,[3000,1,1,1,1,1]]"#, Instant::now())
        .is_empty());

    let effects = session.on_frame(READY.as_bytes(), Instant::now());
    let refetch = requested(&effects);
    assert_eq!(refetch.interval, Interval::Minute5);
    assert_eq!(session.drain_outgoing().len(), 2);

    // History requested before the gap no longer applies.
    assert!(session.on_backfill(mounted, vec![bar(1_000, 1)]).is_empty());
    assert_eq!(
        session.on_backfill(refetch, vec![bar(2_000, 2)]),
        vec![Effect::CandlesChanged]
    );

    session.on_unavailable();
    assert_eq!(session.connection().state(), ConnectionState::Unavailable);
    assert!(session.on_frame(READY.as_bytes(), Instant::now()).is_empty());
}
