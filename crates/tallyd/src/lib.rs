//! tallyd - TallyArbiter tally light listener
//!
//! Registers four virtual listener endpoints with a TallyArbiter server and
//! drives four green/red tally lamps from the live bus state it reports.
//!
//! Layout:
//! - [`model`] / [`resolver`]: domain data and the pure channel derivation
//! - [`session`]: connect/reconnect phases and endpoint registration
//! - [`dispatch`]: transport messages to typed events
//! - [`listener`]: the state owner, one dispatch in, actions out
//! - [`runner`]: the control loop that carries actions out
//! - [`transport`], [`lamp`], [`control`]: the outside world

pub mod control;
pub mod dispatch;
pub mod lamp;
pub mod listener;
pub mod model;
pub mod resolver;
pub mod runner;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use control::{ControlInput, Diagnostics};
pub use dispatch::{classify, Dispatch, TransportCommand, TransportMessage};
pub use lamp::{LampDriver, LampSignal, Level, MemoryLamps, TracingLamps};
pub use listener::{Action, Listener};
pub use model::{BusCatalog, BusKind, ChannelStates, DeviceBusState, TallyState, CHANNEL_COUNT};
pub use resolver::resolve;
pub use runner::{ControlLoop, LoopExit};
pub use session::{ConnectionSession, SessionPhase};
pub use transport::TransportHandle;
