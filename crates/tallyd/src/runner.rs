//! The control loop
//!
//! One task owns the [`Listener`] and the lamps. It waits on four things:
//! transport messages, control input, the reconnect timer, and shutdown.
//! Flash sequences and registration pacing run inline, so nothing else is
//! processed while they play out; queued messages are handled afterwards in
//! order.
//!
//! Commands to the transport never wait for queue space. If the transport
//! is stuck (say, in a connect that has not timed out yet) and its queue is
//! full, the command is skipped; the next reconnect tick tries again.

use std::future::Future;

use anyhow::{bail, Result};
use tallyconf::TimingConfig;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::control::{ControlInput, Diagnostics};
use crate::dispatch::{classify, TransportCommand, TransportMessage};
use crate::lamp::{show_all, show_states, LampDriver, LampSignal};
use crate::listener::{Action, Listener};
use crate::transport::TransportHandle;

/// Why the control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown signal.
    Shutdown,
    /// Long press: settings should be wiped and the process restarted.
    SettingsReset,
}

pub struct ControlLoop<L: LampDriver> {
    listener: Listener,
    lamps: L,
    timing: TimingConfig,
    server: String,
}

impl<L: LampDriver> ControlLoop<L> {
    pub fn new(listener: Listener, lamps: L, timing: TimingConfig, server: impl Into<String>) -> Self {
        Self {
            listener,
            lamps,
            timing,
            server: server.into(),
        }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Run until shutdown or a long press.
    pub async fn run<S>(
        &mut self,
        transport: &mut TransportHandle,
        controls: &mut mpsc::Receiver<ControlInput>,
        shutdown: S,
    ) -> Result<LoopExit>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        show_states(&mut self.lamps, &self.listener.channels());
        self.listener.session_mut().record_attempt(Instant::now());
        offer(&transport.commands, TransportCommand::Connect)?;

        loop {
            let reconnect_at = self.listener.session().next_attempt_at();

            tokio::select! {
                message = transport.messages.recv() => {
                    let Some(message) = message else {
                        bail!("transport task stopped");
                    };
                    self.on_transport(message, &transport.commands).await?;
                }
                Some(input) = controls.recv() => {
                    match input {
                        ControlInput::ShortPress => {
                            info!("\n{}", Diagnostics::capture(&self.listener, &self.server));
                        }
                        ControlInput::LongPress => {
                            warn!("Settings reset requested");
                            show_all(&mut self.lamps, LampSignal::DARK);
                            return Ok(LoopExit::SettingsReset);
                        }
                    }
                }
                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    info!("Trying to re-connect to {}", self.server);
                    self.listener.session_mut().record_attempt(Instant::now());
                    offer(&transport.commands, TransportCommand::Connect)?;
                }
                _ = &mut shutdown => {
                    info!("Shutting down");
                    show_all(&mut self.lamps, LampSignal::DARK);
                    return Ok(LoopExit::Shutdown);
                }
            }
        }
    }

    async fn on_transport(
        &mut self,
        message: TransportMessage,
        commands: &mpsc::Sender<TransportCommand>,
    ) -> Result<()> {
        let dispatch = match classify(message) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!("dropping malformed envelope: {}", e);
                return Ok(());
            }
        };

        for action in self.listener.handle(dispatch, Instant::now()) {
            match action {
                Action::Register(envelopes) => self.register(envelopes, commands).await?,
                Action::Show(states) => show_states(&mut self.lamps, &states),
                Action::Flash => self.flash().await,
            }
        }
        Ok(())
    }

    async fn register(
        &mut self,
        envelopes: Vec<String>,
        commands: &mpsc::Sender<TransportCommand>,
    ) -> Result<()> {
        for (i, envelope) in envelopes.into_iter().enumerate() {
            if i > 0 {
                sleep(self.timing.registration_delay()).await;
            }
            debug!("registering endpoint {}", i + 1);
            offer(commands, TransportCommand::Send(envelope))?;
        }
        Ok(())
    }

    async fn flash(&mut self) {
        let pulse = self.timing.flash_pulse();
        for _ in 0..self.timing.flash_pulses {
            show_all(&mut self.lamps, LampSignal::FULL);
            sleep(pulse).await;
            show_all(&mut self.lamps, LampSignal::DARK);
            sleep(pulse).await;
        }
        let restored = self.listener.restore();
        show_states(&mut self.lamps, &restored);
    }
}

/// Queue a command without waiting. Returns false if it was skipped.
fn offer(commands: &mpsc::Sender<TransportCommand>, cmd: TransportCommand) -> Result<bool> {
    match commands.try_send(cmd) {
        Ok(()) => Ok(true),
        Err(TrySendError::Full(cmd)) => {
            warn!("transport busy, skipping {:?}", cmd);
            Ok(false)
        }
        Err(TrySendError::Closed(_)) => bail!("transport task stopped"),
    }
}
