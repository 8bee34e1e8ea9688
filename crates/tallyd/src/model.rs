//! Domain model: buses, device bus states, virtual endpoints, tally channels.
//!
//! Everything here is plain owned data. The listener owns one of each and
//! replaces the bus catalog, device states and directory wholesale as updates
//! arrive; nothing is merged across updates.

use std::fmt;

use tallyproto::{BusOption, DeviceEntry, DeviceStateEntry};

/// Number of physical tally channels (and virtual endpoints).
pub const CHANNEL_COUNT: usize = tallyconf::SLOT_COUNT;

/// Label reported for a bus id missing from the catalog.
pub const UNKNOWN_LABEL: &str = "unknown";

// === Buses ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    Preview,
    Program,
    Other,
}

impl BusKind {
    /// Map the server's `type` string. Stray quotes are tolerated.
    pub fn from_wire(kind: &str) -> Self {
        match kind.trim_matches('"') {
            "preview" => BusKind::Preview,
            "program" => BusKind::Program,
            _ => BusKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusKind::Preview => "preview",
            BusKind::Program => "program",
            BusKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    pub id: String,
    pub kind: BusKind,
    pub label: String,
}

impl From<&BusOption> for Bus {
    fn from(option: &BusOption) -> Self {
        Self {
            id: option.id.clone(),
            kind: BusKind::from_wire(&option.kind),
            label: option.label.clone(),
        }
    }
}

/// What the resolver needs to know about a bus id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBus<'a> {
    pub kind: BusKind,
    pub label: &'a str,
}

/// The current bus catalog, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusCatalog {
    buses: Vec<Bus>,
}

impl BusCatalog {
    /// Build from a `bus_options` update. The first entry for a repeated id wins.
    pub fn from_options(options: &[BusOption]) -> Self {
        let mut buses: Vec<Bus> = Vec::with_capacity(options.len());
        for option in options {
            if buses.iter().any(|b| b.id == option.id) {
                continue;
            }
            buses.push(Bus::from(option));
        }
        Self { buses }
    }

    pub fn get(&self, id: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.id == id)
    }

    /// Kind and label for `id`; unknown ids resolve to `Other` / `"unknown"`.
    pub fn resolve(&self, id: &str) -> ResolvedBus<'_> {
        match self.get(id) {
            Some(bus) => ResolvedBus {
                kind: bus.kind,
                label: &bus.label,
            },
            None => ResolvedBus {
                kind: BusKind::Other,
                label: UNKNOWN_LABEL,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}

// === Device bus states ===

/// "This bus, as seen by this device, currently carries N sources."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBusState {
    pub bus_id: String,
    pub owner_device_id: String,
    pub source_count: usize,
}

impl DeviceBusState {
    pub fn new(bus_id: impl Into<String>, owner_device_id: impl Into<String>, source_count: usize) -> Self {
        Self {
            bus_id: bus_id.into(),
            owner_device_id: owner_device_id.into(),
            source_count,
        }
    }

    /// Buses with no sources routed onto them are inactive.
    pub fn is_active(&self) -> bool {
        self.source_count > 0
    }
}

impl From<&DeviceStateEntry> for DeviceBusState {
    fn from(entry: &DeviceStateEntry) -> Self {
        Self::new(entry.bus_id.clone(), entry.device_id.clone(), entry.source_count())
    }
}

// === Device directory ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

/// Server-side device names, used only to label our endpoints in logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDirectory {
    devices: Vec<DeviceInfo>,
}

impl DeviceDirectory {
    pub fn from_entries(entries: &[DeviceEntry]) -> Self {
        Self {
            devices: entries
                .iter()
                .map(|e| DeviceInfo {
                    id: e.id.clone(),
                    name: e.name.clone(),
                })
                .collect(),
        }
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// === Virtual endpoints ===

/// One of the four listener identities this device registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEndpoint {
    pub slot_index: usize,
    pub assigned_id: Option<String>,
    pub display_name: String,
    /// Name of the assigned device per the server's directory.
    pub device_name: Option<String>,
}

/// The fixed table of endpoints. Assignment is append-only, in slot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTable {
    slots: [VirtualEndpoint; CHANNEL_COUNT],
}

impl EndpointTable {
    pub fn new(display_names: [String; CHANNEL_COUNT]) -> Self {
        let mut names = display_names.into_iter();
        Self {
            slots: std::array::from_fn(|slot_index| VirtualEndpoint {
                slot_index,
                assigned_id: None,
                display_name: names.next().unwrap_or_default(),
                device_name: None,
            }),
        }
    }

    /// Give `id` to the first unassigned slot. `None` when all slots are taken.
    pub fn assign_next(&mut self, id: &str) -> Option<usize> {
        let slot = self.slots.iter_mut().find(|s| s.assigned_id.is_none())?;
        slot.assigned_id = Some(id.to_string());
        Some(slot.slot_index)
    }

    /// Re-read device names for assigned slots. Returns true if any changed.
    pub fn refresh_names(&mut self, directory: &DeviceDirectory) -> bool {
        let mut changed = false;
        for slot in &mut self.slots {
            let name = slot
                .assigned_id
                .as_deref()
                .and_then(|id| directory.name_of(id))
                .map(str::to_string);
            if name.is_some() && slot.device_name != name {
                slot.device_name = name;
                changed = true;
            }
        }
        changed
    }

    pub fn get(&self, slot_index: usize) -> Option<&VirtualEndpoint> {
        self.slots.get(slot_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualEndpoint> {
        self.slots.iter()
    }

    pub fn assigned_count(&self) -> usize {
        self.slots.iter().filter(|s| s.assigned_id.is_some()).count()
    }
}

// === Tally channels ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TallyState {
    #[default]
    Off,
    Preview,
    Program,
    Both,
}

impl TallyState {
    /// Combine two contributions on one channel. Never demotes.
    ///
    /// This is a join: commutative, associative and idempotent, so the
    /// order contributions arrive in cannot change the result.
    pub fn join(self, other: TallyState) -> TallyState {
        use TallyState::*;
        match (self, other) {
            (Off, x) | (x, Off) => x,
            (Both, _) | (_, Both) => Both,
            (Preview, Preview) => Preview,
            (Program, Program) => Program,
            (Preview, Program) | (Program, Preview) => Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TallyState::Off => "off",
            TallyState::Preview => "preview",
            TallyState::Program => "program",
            TallyState::Both => "both",
        }
    }
}

impl fmt::Display for TallyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyChannel {
    pub index: usize,
    pub state: TallyState,
}

/// The derived output: one state per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStates {
    states: [TallyState; CHANNEL_COUNT],
}

impl ChannelStates {
    pub fn all_off() -> Self {
        Self::default()
    }

    pub fn from_states(states: [TallyState; CHANNEL_COUNT]) -> Self {
        Self { states }
    }

    /// Join `contribution` into channel `index`. Out of range indices are ignored.
    pub fn promote(&mut self, index: usize, contribution: TallyState) {
        if let Some(state) = self.states.get_mut(index) {
            *state = state.join(contribution);
        }
    }

    pub fn get(&self, index: usize) -> Option<TallyState> {
        self.states.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = TallyChannel> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(index, &state)| TallyChannel { index, state })
    }

    pub fn as_array(&self) -> [TallyState; CHANNEL_COUNT] {
        self.states
    }

    pub fn is_dark(&self) -> bool {
        self.states.iter().all(|s| *s == TallyState::Off)
    }
}

impl fmt::Display for ChannelStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, channel) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}={}", channel.index + 1, channel.state)?;
        }
        Ok(())
    }
}
