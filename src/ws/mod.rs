//! WebSocket layer — outbound messages, inbound frames, transport events.
//!
//! The protocol state (readiness gating, subscription bindings, routing) is
//! sans-IO and lives in [`connection`]. The physical socket is owned by the
//! `ws-native` transport (`tokio-tungstenite`, see `native.rs`), which only
//! moves text frames in both directions.

pub mod connection;
pub mod subscriptions;

#[cfg(feature = "ws-native")]
pub mod native;

use crate::error::WsError;
use crate::shared::ChannelId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use connection::{ConnectionManager, ConnectionState, Routed, SEND_RETRY_DELAY};
pub use subscriptions::{StreamKey, SubscribeParams, SubscriptionRegistry};

// ─── Outbound messages ───────────────────────────────────────────────────────

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MessageOut {
    Subscribe {
        #[serde(flatten)]
        params: SubscribeParams,
    },
    Unsubscribe {
        #[serde(rename = "chanId")]
        chan_id: ChannelId,
    },
}

impl MessageOut {
    pub fn subscribe(params: SubscribeParams) -> Self {
        Self::Subscribe { params }
    }

    pub fn unsubscribe(chan_id: ChannelId) -> Self {
        Self::Unsubscribe { chan_id }
    }

    pub fn to_json(&self) -> Result<String, WsError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ─── Inbound frames ──────────────────────────────────────────────────────────

/// Object-shaped server message (`info`, `subscribed`, `unsubscribed`, `error`, ...).
///
/// Every field is optional: the feed adds fields freely and the classification
/// in [`Frame::parse`] only looks at the ones it needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(rename = "serverId", default)]
    pub server_id: Option<Value>,
    #[serde(rename = "chanId", default)]
    pub chan_id: Option<ChannelId>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

/// Stream fields the server echoes back on acks and errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRef {
    pub channel: Option<String>,
    pub key: Option<String>,
    pub symbol: Option<String>,
}

/// Subscription acknowledgement: the server bound `chan_id` to a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribedAck {
    pub chan_id: ChannelId,
    pub stream: StreamRef,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Server identity frame; the connection may now carry subscriptions.
    Ready,
    Subscribed(SubscribedAck),
    Unsubscribed { chan_id: ChannelId },
    Error {
        msg: String,
        code: Option<i64>,
        stream: StreamRef,
    },
    Heartbeat { chan_id: ChannelId },
    /// `[chanId, payload]` with the payload left for the owning domain to parse.
    Data { chan_id: ChannelId, payload: Value },
    /// Well-formed but of no interest (info without identity, pong, checksum...).
    Ignored,
}

impl Frame {
    /// Decode and classify a raw text frame.
    pub fn parse(raw: &[u8]) -> Result<Frame, WsError> {
        let value: Value = serde_json::from_slice(raw)?;
        if value.is_object() {
            let message: EventMessage = serde_json::from_value(value)?;
            return Ok(Self::from_event(message));
        }
        match value {
            Value::Array(mut items) => {
                let chan_id = items
                    .first()
                    .and_then(Value::as_i64)
                    .map(ChannelId)
                    .ok_or_else(|| {
                        WsError::ProtocolError("data frame without channel id".to_string())
                    })?;
                match items.get(1) {
                    Some(Value::String(tag)) if tag == "hb" => Ok(Frame::Heartbeat { chan_id }),
                    Some(Value::Array(_)) => Ok(Frame::Data {
                        chan_id,
                        payload: items.swap_remove(1),
                    }),
                    Some(_) => Ok(Frame::Ignored),
                    None => Err(WsError::ProtocolError(format!(
                        "data frame for channel {chan_id} has no payload"
                    ))),
                }
            }
            other => Err(WsError::ProtocolError(format!(
                "unexpected frame shape: {other}"
            ))),
        }
    }

    fn from_event(message: EventMessage) -> Frame {
        if message.server_id.is_some() {
            return Frame::Ready;
        }
        let stream = StreamRef {
            channel: message.channel,
            key: message.key,
            symbol: message.symbol,
        };
        match message.event.as_deref() {
            Some("unsubscribed") => match message.chan_id {
                Some(chan_id) => Frame::Unsubscribed { chan_id },
                None => Frame::Ignored,
            },
            Some("error") => Frame::Error {
                msg: message.msg.unwrap_or_default(),
                code: message.code,
                stream,
            },
            _ => match message.chan_id {
                Some(chan_id) => Frame::Subscribed(SubscribedAck { chan_id, stream }),
                None => Frame::Ignored,
            },
        }
    }
}

// ─── WsEvent ─────────────────────────────────────────────────────────────────

/// Events emitted by the transport to its consumer.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// Socket open. Readiness still waits for the server identity frame.
    Connected,
    /// A raw text frame from the server.
    Message(String),
    /// Connection lost (may trigger reconnect).
    Disconnected { code: Option<u16>, reason: String },
    /// Reconnection was given up after `attempts` tries.
    MaxReconnectReached { attempts: u32 },
    /// Transport-level error that did not close the socket.
    Error(String),
}

/// Configuration for the WS transport.
#[derive(Debug, Clone, PartialEq)]
pub struct WsConfig {
    pub url: String,
    pub reconnect: bool,
    pub base_reconnect_delay_ms: u32,
    pub max_reconnect_attempts: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: crate::network::DEFAULT_WS_URL.to_string(),
            reconnect: true,
            base_reconnect_delay_ms: 1_000,
            max_reconnect_attempts: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Interval, Symbol};

    #[test]
    fn test_subscribe_candles_wire_shape() {
        let msg = MessageOut::subscribe(SubscribeParams::for_key(
            &StreamKey::Candles(Interval::Hour1),
            &Symbol::new("BTCUSD"),
        ));
        let parsed: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed["event"], "subscribe");
        assert_eq!(parsed["channel"], "candles");
        assert_eq!(parsed["key"], "trade:1h:tBTCUSD");
    }

    #[test]
    fn test_subscribe_book_wire_shape() {
        let msg = MessageOut::subscribe(SubscribeParams::for_key(
            &StreamKey::Book,
            &Symbol::new("ETHUSD"),
        ));
        let parsed: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed["event"], "subscribe");
        assert_eq!(parsed["channel"], "book");
        assert_eq!(parsed["symbol"], "tETHUSD");
    }

    #[test]
    fn test_unsubscribe_wire_shape() {
        let json = MessageOut::unsubscribe(ChannelId(42)).to_json().unwrap();
        assert_eq!(json, r#"{"event":"unsubscribe","chanId":42}"#);
    }

    #[test]
    fn test_parse_ready_frame() {
        let raw = br#"{"event":"info","version":2,"serverId":"abc-123","platform":{"status":1}}"#;
        assert_eq!(Frame::parse(raw).unwrap(), Frame::Ready);
    }

    #[test]
    fn test_parse_info_without_identity_is_ignored() {
        let raw = br#"{"event":"info","code":20060,"msg":"maintenance"}"#;
        assert_eq!(Frame::parse(raw).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_parse_subscribed_ack() {
        let raw = br#"{"event":"subscribed","channel":"candles","chanId":343351,"key":"trade:5m:tBTCUSD"}"#;
        match Frame::parse(raw).unwrap() {
            Frame::Subscribed(ack) => {
                assert_eq!(ack.chan_id, ChannelId(343351));
                assert_eq!(ack.stream.key.as_deref(), Some("trade:5m:tBTCUSD"));
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bare_chan_id_counts_as_ack() {
        let raw = br#"{"chanId":7}"#;
        assert!(matches!(Frame::parse(raw).unwrap(), Frame::Subscribed(ack) if ack.chan_id == ChannelId(7)));
    }

    #[test]
    fn test_parse_unsubscribed_and_error() {
        let raw = br#"{"event":"unsubscribed","status":"OK","chanId":9}"#;
        assert_eq!(
            Frame::parse(raw).unwrap(),
            Frame::Unsubscribed {
                chan_id: ChannelId(9)
            }
        );

        let raw = br#"{"event":"error","msg":"subscribe: dup","code":10301,"channel":"book","symbol":"tBTCUSD"}"#;
        match Frame::parse(raw).unwrap() {
            Frame::Error { msg, code, stream } => {
                assert_eq!(msg, "subscribe: dup");
                assert_eq!(code, Some(10301));
                assert_eq!(stream.channel.as_deref(), Some("book"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_heartbeat_and_data() {
        assert_eq!(
            Frame::parse(br#"[17,"hb"]"#).unwrap(),
            Frame::Heartbeat {
                chan_id: ChannelId(17)
            }
        );
        match Frame::parse(br#"[17,[1700000000000,1,2,3,0.5,9]]"#).unwrap() {
            Frame::Data { chan_id, payload } => {
                assert_eq!(chan_id, ChannelId(17));
                assert_eq!(payload.as_array().unwrap().len(), 6);
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_malformed_frames() {
        assert!(Frame::parse(b"not json").is_err());
        assert!(Frame::parse(br#"["x",[1]]"#).is_err());
        assert!(Frame::parse(br#"[17]"#).is_err());
        assert!(Frame::parse(br#"42"#).is_err());
        assert_eq!(Frame::parse(br#"[17,"cs",12345]"#).unwrap(), Frame::Ignored);
    }
}
