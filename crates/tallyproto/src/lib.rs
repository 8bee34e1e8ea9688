//! tallyproto - wire types for the TallyArbiter listener protocol
//!
//! Three layers, outermost first:
//!
//! - **frame**: Socket.IO / Engine.IO text packets as they appear on the
//!   websocket. Only the transport adapter touches this layer.
//! - **envelope**: the application event envelope `["<event>",<body>]`.
//!   Decoding yields the event name and the body as raw text.
//! - **events**: typed bodies for the events we understand
//!   (`bus_options`, `deviceId`, `devices`, `device_states`, `flash`,
//!   `reassign`) and the `listenerclient_connect` registration we send.
//!
//! Nothing here knows what a tally light is; domain interpretation lives in
//! the daemon.

pub mod envelope;
pub mod events;
pub mod frame;

pub use envelope::{decode_event, encode_event, EnvelopeError, EventFrame};
pub use events::{
    BusOption, DeviceEntry, DeviceStateEntry, EventError, InboundEvent, ListenerRegistration,
    LISTENER_CONNECT, UNASSIGNED,
};
pub use frame::{decode_frame, EnginePacket, FrameError, OpenHandshake, SocketPacket};
