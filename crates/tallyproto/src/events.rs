//! Typed bodies for the events a listener exchanges with TallyArbiter.
//!
//! The envelope layer hands us a name and raw body text; this module turns
//! the names we understand into typed values. Unknown names decode to
//! `None` so callers can log and drop them.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::envelope::encode_event;

// === Event names ===

pub const BUS_OPTIONS: &str = "bus_options";
pub const DEVICE_ID: &str = "deviceId";
pub const DEVICES: &str = "devices";
pub const DEVICE_STATES: &str = "device_states";
pub const FLASH: &str = "flash";
pub const REASSIGN: &str = "reassign";
pub const LISTENER_CONNECT: &str = "listenerclient_connect";

/// Device id sent for a slot the server has not assigned yet.
pub const UNASSIGNED: &str = "unassigned";

/// Errors decoding or encoding an event body.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event '{event}' requires a body")]
    MissingBody { event: &'static str },

    #[error("invalid body for event '{event}': {source}")]
    InvalidBody {
        event: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to encode '{event}': {source}")]
    Encode {
        event: &'static str,
        source: serde_json::Error,
    },
}

/// One entry of `bus_options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusOption {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// `preview`, `program`, or anything else.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
}

/// One entry of `devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One entry of `device_states`. Only the number of sources matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateEntry {
    #[serde(rename = "busId", deserialize_with = "id_string")]
    pub bus_id: String,
    #[serde(rename = "deviceId", default, deserialize_with = "id_string")]
    pub device_id: String,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
}

impl DeviceStateEntry {
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Server ids are strings, but some server builds send bare numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
        Null(()),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
        Id::Null(()) => String::new(),
    })
}

/// Inbound events the listener acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    BusOptions(Vec<BusOption>),
    DeviceId(String),
    Devices(Vec<DeviceEntry>),
    DeviceStates(Vec<DeviceStateEntry>),
    Flash,
    /// Accepted but inert; the raw body is kept for logging.
    Reassign(Option<String>),
}

impl InboundEvent {
    /// Decode a named event. Returns `Ok(None)` for names we don't handle.
    pub fn decode(name: &str, body: Option<&str>) -> Result<Option<Self>, EventError> {
        let event = match name {
            BUS_OPTIONS => InboundEvent::BusOptions(parse_body(BUS_OPTIONS, body)?),
            DEVICE_ID => InboundEvent::DeviceId(parse_body(DEVICE_ID, body)?),
            DEVICES => InboundEvent::Devices(parse_body(DEVICES, body)?),
            DEVICE_STATES => InboundEvent::DeviceStates(parse_body(DEVICE_STATES, body)?),
            FLASH => InboundEvent::Flash,
            REASSIGN => InboundEvent::Reassign(body.map(str::to_string)),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::BusOptions(_) => BUS_OPTIONS,
            InboundEvent::DeviceId(_) => DEVICE_ID,
            InboundEvent::Devices(_) => DEVICES,
            InboundEvent::DeviceStates(_) => DEVICE_STATES,
            InboundEvent::Flash => FLASH,
            InboundEvent::Reassign(_) => REASSIGN,
        }
    }
}

fn parse_body<T>(event: &'static str, body: Option<&str>) -> Result<T, EventError>
where
    T: for<'de> Deserialize<'de>,
{
    let body = body.ok_or(EventError::MissingBody { event })?;
    serde_json::from_str(body).map_err(|source| EventError::InvalidBody { event, source })
}

/// Body of `listenerclient_connect`, one per virtual endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRegistration {
    pub device_id: String,
    pub listener_type: String,
    pub can_be_reassigned: bool,
    pub can_be_flashed: bool,
    pub supports_chat: bool,
}

impl ListenerRegistration {
    /// Registration for an endpoint; `None` registers as `"unassigned"`.
    pub fn new(device_id: Option<&str>, listener_type: impl Into<String>) -> Self {
        Self {
            device_id: device_id.unwrap_or(UNASSIGNED).to_string(),
            listener_type: listener_type.into(),
            can_be_reassigned: true,
            can_be_flashed: true,
            supports_chat: false,
        }
    }

    /// Full envelope text: `["listenerclient_connect",{...}]`.
    pub fn to_envelope(&self) -> Result<String, EventError> {
        let body = serde_json::to_string(self).map_err(|source| EventError::Encode {
            event: LISTENER_CONNECT,
            source,
        })?;
        Ok(encode_event(LISTENER_CONNECT, Some(&body)))
    }
}
