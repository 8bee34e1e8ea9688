//! Transport message → typed event
//!
//! The transport hands us connection changes and raw event array text. This
//! module is the one place that text gets decoded: first into
//! [`Dispatch`] (connect, disconnect, or named event with a raw body), then
//! for named events into an [`InboundEvent`]. Anything that fails to decode
//! is logged and dropped here; it never reaches listener state.

use std::net::SocketAddr;

use tallyproto::{decode_event, EnvelopeError, InboundEvent};
use tracing::{debug, warn};

/// What the transport reports to the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    /// Websocket is up; the namespace join is still pending.
    Opened { local_address: SocketAddr },
    Connected,
    /// Connection lost, or a connect attempt failed.
    Disconnected,
    /// Event array text, e.g. `["deviceId","abc"]`.
    Text(String),
}

/// What the control loop asks of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Open a connection. Ignored while one is live.
    Connect,
    /// Emit an event envelope.
    Send(String),
}

/// A decoded transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Socket open from this local address.
    Opened(SocketAddr),
    Connect,
    Disconnect,
    Event { name: String, raw_body: Option<String> },
}

/// Decode a transport message. Only `Text` can fail.
pub fn classify(message: TransportMessage) -> Result<Dispatch, EnvelopeError> {
    match message {
        TransportMessage::Opened { local_address } => Ok(Dispatch::Opened(local_address)),
        TransportMessage::Connected => Ok(Dispatch::Connect),
        TransportMessage::Disconnected => Ok(Dispatch::Disconnect),
        TransportMessage::Text(text) => {
            let frame = decode_event(&text)?;
            Ok(Dispatch::Event {
                name: frame.name,
                raw_body: frame.body,
            })
        }
    }
}

/// Route a named event to its typed form. Unknown or malformed events are
/// logged and come back as `None`.
pub fn route(name: &str, raw_body: Option<&str>) -> Option<InboundEvent> {
    match InboundEvent::decode(name, raw_body) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            debug!("ignoring unhandled event '{}'", name);
            None
        }
        Err(e) => {
            warn!("dropping malformed event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_connection_changes() {
        assert_eq!(classify(TransportMessage::Connected).unwrap(), Dispatch::Connect);
        assert_eq!(classify(TransportMessage::Disconnected).unwrap(), Dispatch::Disconnect);

        let local_address: SocketAddr = "192.168.1.40:50112".parse().unwrap();
        assert_eq!(
            classify(TransportMessage::Opened { local_address }).unwrap(),
            Dispatch::Opened(local_address)
        );
    }

    #[test]
    fn test_classify_event_keeps_raw_body() {
        let dispatch = classify(TransportMessage::Text(
            r#"["device_states",[{"busId":"1","sources":[]}]]"#.into(),
        ))
        .unwrap();
        assert_eq!(
            dispatch,
            Dispatch::Event {
                name: "device_states".into(),
                raw_body: Some(r#"[{"busId":"1","sources":[]}]"#.into()),
            }
        );
    }

    #[test]
    fn test_classify_bodyless_event() {
        assert_eq!(
            classify(TransportMessage::Text(r#"["flash"]"#.into())).unwrap(),
            Dispatch::Event {
                name: "flash".into(),
                raw_body: None,
            }
        );
    }

    #[test]
    fn test_classify_rejects_malformed_text() {
        assert!(classify(TransportMessage::Text("not an envelope".into())).is_err());
        assert!(classify(TransportMessage::Text(r#"["flash""#.into())).is_err());
    }

    #[test]
    fn test_route_known_unknown_and_malformed() {
        assert_eq!(route("flash", None), Some(InboundEvent::Flash));
        assert_eq!(route("messaging", Some("[]")), None);
        assert_eq!(route("bus_options", Some("{nope")), None);
        assert_eq!(route("device_states", None), None);
    }
}
