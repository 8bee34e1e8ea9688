//! Local control input
//!
//! The reference hardware has one button: a short press prints device
//! information, holding it for five seconds wipes settings and restarts.
//! On unix hosts `SIGUSR1` and `SIGUSR2` stand in for the two presses.

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::listener::Listener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    /// Print diagnostics.
    ShortPress,
    /// Reset settings and restart.
    LongPress,
}

/// Snapshot of what a short press reports.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub server: String,
    pub local_address: Option<String>,
    pub phase: &'static str,
    pub reconnects: u32,
    pub endpoints: Vec<EndpointLine>,
    pub channels: String,
}

#[derive(Debug, Clone)]
pub struct EndpointLine {
    pub slot: usize,
    pub display_name: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

impl Diagnostics {
    pub fn capture(listener: &Listener, server: &str) -> Self {
        Self {
            server: server.to_string(),
            local_address: listener.local_address().map(|addr| addr.to_string()),
            phase: listener.session().phase().as_str(),
            reconnects: listener.session().reconnects(),
            endpoints: listener
                .endpoints()
                .iter()
                .map(|ep| EndpointLine {
                    slot: ep.slot_index + 1,
                    display_name: ep.display_name.clone(),
                    device_id: ep.assigned_id.clone(),
                    device_name: ep.device_name.clone(),
                })
                .collect(),
            channels: listener.channels().to_string(),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "server: {} ({}, {} reconnects)", self.server, self.phase, self.reconnects)?;
        writeln!(f, "local: {}", self.local_address.as_deref().unwrap_or("-"))?;
        for ep in &self.endpoints {
            writeln!(
                f,
                "tally {}: {} device={} name={}",
                ep.slot,
                ep.display_name,
                ep.device_id.as_deref().unwrap_or("unassigned"),
                ep.device_name.as_deref().unwrap_or("-")
            )?;
        }
        write!(f, "channels: {}", self.channels)
    }
}

/// Forward `SIGUSR1` / `SIGUSR2` as short / long presses.
#[cfg(unix)]
pub fn spawn_signal_inputs(tx: mpsc::Sender<ControlInput>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut short = signal(SignalKind::user_defined1())?;
    let mut long = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            let input = tokio::select! {
                Some(()) = short.recv() => ControlInput::ShortPress,
                Some(()) = long.recv() => ControlInput::LongPress,
                else => break,
            };
            if tx.send(input).await.is_err() {
                break;
            }
        }
    }))
}

/// No button source on this platform; the channel stays quiet.
#[cfg(not(unix))]
pub fn spawn_signal_inputs(tx: mpsc::Sender<ControlInput>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tx.closed().await;
    }))
}
