//! Lighting output
//!
//! Each tally channel is a green/red lamp pair. On the reference hardware the
//! pairs hang off a PCA9685 PWM expander, channel `i` using PWM outputs `2i`
//! (green) and `2i + 1` (red) at 12-bit duty.
//!
//! | state   | green | red  |
//! |---------|-------|------|
//! | off     | off   | off  |
//! | preview | full  | off  |
//! | program | off   | full |
//! | both    | full  | full |

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ChannelStates, TallyState, CHANNEL_COUNT};

/// Full-scale PWM duty.
pub const DUTY_FULL: u16 = 4095;

#[derive(Debug, Error)]
pub enum LampError {
    #[error("channel {0} out of range")]
    ChannelOutOfRange(usize),

    #[error("lamp driver failed: {0}")]
    Driver(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Off,
    Full,
}

impl Level {
    pub fn duty(self) -> u16 {
        match self {
            Level::Off => 0,
            Level::Full => DUTY_FULL,
        }
    }
}

/// What one channel's lamp pair shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LampSignal {
    pub green: Level,
    pub red: Level,
}

impl LampSignal {
    pub const DARK: LampSignal = LampSignal {
        green: Level::Off,
        red: Level::Off,
    };

    pub const FULL: LampSignal = LampSignal {
        green: Level::Full,
        red: Level::Full,
    };

    pub fn for_state(state: TallyState) -> Self {
        match state {
            TallyState::Off => Self::DARK,
            TallyState::Preview => LampSignal {
                green: Level::Full,
                red: Level::Off,
            },
            TallyState::Program => LampSignal {
                green: Level::Off,
                red: Level::Full,
            },
            TallyState::Both => Self::FULL,
        }
    }
}

/// PWM outputs (green, red) for a channel.
pub fn pwm_outputs(channel: usize) -> (usize, usize) {
    (channel * 2, channel * 2 + 1)
}

/// Something that can light the four lamp pairs.
pub trait LampDriver: Send {
    fn set(&mut self, channel: usize, signal: LampSignal) -> Result<(), LampError>;
}

/// Push resolved channel states to the lamps. Driver errors are logged.
pub fn show_states(driver: &mut dyn LampDriver, states: &ChannelStates) {
    for channel in states.iter() {
        set_logged(driver, channel.index, LampSignal::for_state(channel.state));
    }
}

/// Drive every channel to the same signal (flash, blackout).
pub fn show_all(driver: &mut dyn LampDriver, signal: LampSignal) {
    for channel in 0..CHANNEL_COUNT {
        set_logged(driver, channel, signal);
    }
}

fn set_logged(driver: &mut dyn LampDriver, channel: usize, signal: LampSignal) {
    if let Err(e) = driver.set(channel, signal) {
        warn!("lamp channel {}: {}", channel + 1, e);
    }
}

// === Drivers ===

/// Reports lamp changes through tracing, with the PWM outputs and duty a
/// PCA9685 would be given.
#[derive(Debug, Default)]
pub struct TracingLamps {
    current: [LampSignal; CHANNEL_COUNT],
}

impl TracingLamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> [LampSignal; CHANNEL_COUNT] {
        self.current
    }
}

impl LampDriver for TracingLamps {
    fn set(&mut self, channel: usize, signal: LampSignal) -> Result<(), LampError> {
        let slot = self
            .current
            .get_mut(channel)
            .ok_or(LampError::ChannelOutOfRange(channel))?;
        let (green, red) = pwm_outputs(channel);
        if *slot != signal {
            info!(
                "tally {}: pwm{}={} pwm{}={}",
                channel + 1,
                green,
                signal.green.duty(),
                red,
                signal.red.duty()
            );
        } else {
            debug!("tally {}: unchanged", channel + 1);
        }
        *slot = signal;
        Ok(())
    }
}

/// Records every write. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryLamps {
    inner: Arc<Mutex<MemoryRecord>>,
}

#[derive(Debug, Default)]
struct MemoryRecord {
    current: [LampSignal; CHANNEL_COUNT],
    writes: Vec<(usize, LampSignal)>,
}

impl MemoryLamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> [LampSignal; CHANNEL_COUNT] {
        self.inner
            .lock()
            .map(|r| r.current)
            .unwrap_or_default()
    }

    /// Every `(channel, signal)` written so far, in order.
    pub fn writes(&self) -> Vec<(usize, LampSignal)> {
        self.inner
            .lock()
            .map(|r| r.writes.clone())
            .unwrap_or_default()
    }

    /// Number of times all four channels were driven fully on at once.
    pub fn full_frames(&self) -> usize {
        self.writes()
            .chunks(CHANNEL_COUNT)
            .filter(|frame| frame.len() == CHANNEL_COUNT && frame.iter().all(|(_, s)| *s == LampSignal::FULL))
            .count()
    }
}

impl LampDriver for MemoryLamps {
    fn set(&mut self, channel: usize, signal: LampSignal) -> Result<(), LampError> {
        if channel >= CHANNEL_COUNT {
            return Err(LampError::ChannelOutOfRange(channel));
        }
        let mut record = self
            .inner
            .lock()
            .map_err(|e| LampError::Driver(e.to_string()))?;
        record.current[channel] = signal;
        record.writes.push((channel, signal));
        Ok(())
    }
}
