//! Socket.IO v5 / Engine.IO v4 text framing.
//!
//! TallyArbiter speaks Socket.IO. Over a websocket each text frame is one
//! Engine.IO packet; message packets carry a Socket.IO packet inside.
//!
//! ## Wire Format
//!
//! ```text
//! 0{"sid":"...","pingInterval":25000,...}   engine open
//! 1                                           engine close
//! 2 / 3                                       engine ping / pong
//! 40[/nsp,]{...}                              socket connect (ack)
//! 41[/nsp,]                                   socket disconnect
//! 42[/nsp,][ack]["event",...]                 socket event
//! 44[/nsp,]{"message":"..."}                  socket connect error
//! ```
//!
//! Only the event array text is handed upward; the envelope module decodes it.

use serde::Deserialize;
use thiserror::Error;

/// Errors decoding a transport frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),

    #[error("engine.io message carries no socket.io packet")]
    EmptyMessage,

    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),

    #[error("invalid open handshake: {0}")]
    Handshake(#[from] serde_json::Error),
}

/// Engine.IO open handshake body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

/// Socket.IO packet carried in an Engine.IO message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPacket {
    Connect { namespace: String },
    Disconnect { namespace: String },
    Event { namespace: String, data: String },
    ConnectError { namespace: String, data: String },
    /// Acks and binary packets - we never request either.
    Unsupported(char),
}

/// One Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// The namespace every listener lives in.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Decode one websocket text frame.
pub fn decode_frame(text: &str) -> Result<EnginePacket, FrameError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket_packet(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(FrameError::UnknownEngineType(other)),
    }
}

fn decode_socket_packet(text: &str) -> Result<SocketPacket, FrameError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(FrameError::EmptyMessage)?;
    let (namespace, rest) = split_namespace(chars.as_str());

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            // Skip an optional ack id; the array starts at the first '['
            let data = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            Ok(SocketPacket::Event {
                namespace,
                data: data.to_string(),
            })
        }
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            data: rest.to_string(),
        }),
        '3' | '5' | '6' => Ok(SocketPacket::Unsupported(kind)),
        other => Err(FrameError::UnknownSocketType(other)),
    }
}

/// `/admin,rest` -> ("/admin", "rest"); anything else is the default namespace.
fn split_namespace(text: &str) -> (String, &str) {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => (text[..idx].to_string(), &text[idx + 1..]),
            None => (text.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), text)
    }
}

// === Encoding ===

/// Join the default namespace.
pub fn encode_connect() -> String {
    "40".to_string()
}

/// Answer an engine ping with the same payload.
pub fn encode_pong(payload: &str) -> String {
    format!("3{}", payload)
}

/// Wrap an application envelope as a socket event in the default namespace.
pub fn encode_event(envelope: &str) -> String {
    format!("42{}", envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_open_handshake() {
        let packet = decode_frame(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let EnginePacket::Open(open) = packet else {
            panic!("expected open");
        };
        assert_eq!(open.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(open.ping_interval, 25000);
        assert_eq!(open.ping_timeout, 20000);
    }

    #[test]
    fn decodes_ping_and_close() {
        assert_eq!(decode_frame("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(decode_frame("2hello").unwrap(), EnginePacket::Ping("hello".into()));
        assert_eq!(decode_frame("1").unwrap(), EnginePacket::Close);
    }

    #[test]
    fn decodes_connect_ack() {
        assert_eq!(
            decode_frame(r#"40{"sid":"wZX3oN0bSVIhsaknAAAI"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect {
                namespace: "/".into()
            })
        );
    }

    #[test]
    fn decodes_event_in_default_namespace() {
        assert_eq!(
            decode_frame(r#"42["deviceId","abc"]"#).unwrap(),
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/".into(),
                data: r#"["deviceId","abc"]"#.into(),
            })
        );
    }

    #[test]
    fn decodes_event_with_namespace_and_ack_id() {
        assert_eq!(
            decode_frame(r#"42/admin,13["flash"]"#).unwrap(),
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/admin".into(),
                data: r#"["flash"]"#.into(),
            })
        );
    }

    #[test]
    fn decodes_server_disconnect() {
        assert_eq!(
            decode_frame("41").unwrap(),
            EnginePacket::Message(SocketPacket::Disconnect {
                namespace: "/".into()
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_frame(""), Err(FrameError::Empty)));
        assert!(matches!(decode_frame("9"), Err(FrameError::UnknownEngineType('9'))));
        assert!(matches!(decode_frame("4"), Err(FrameError::EmptyMessage)));
        assert!(matches!(decode_frame("4x"), Err(FrameError::UnknownSocketType('x'))));
        assert!(matches!(decode_frame("0{"), Err(FrameError::Handshake(_))));
    }

    #[test]
    fn encodes_client_packets() {
        assert_eq!(encode_connect(), "40");
        assert_eq!(encode_pong(""), "3");
        assert_eq!(encode_event(r#"["flash"]"#), r#"42["flash"]"#);
    }
}
