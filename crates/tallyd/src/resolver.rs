//! Tally state resolver
//!
//! Pure derivation of the four channel states from the bus catalog and the
//! current device bus states. Re-run whenever either input changes
//! (`bus_options` or `device_states`) and after a flash sequence; it never
//! looks at anything but its arguments.

use tracing::trace;

use crate::model::{BusCatalog, BusKind, ChannelStates, DeviceBusState, TallyState, CHANNEL_COUNT};

/// Labels that pin an `Other` bus to a fixed channel.
const AUX_LABELS: [(&str, usize); 3] = [("Aux 1", 1), ("Aux 2", 2), ("Aux 3", 3)];

/// Resolve channel states from a snapshot of the catalog and device states.
pub fn resolve(catalog: &BusCatalog, states: &[DeviceBusState]) -> ChannelStates {
    let mut channels = ChannelStates::all_off();

    for state in states.iter().filter(|s| s.is_active()) {
        let bus = catalog.resolve(&state.bus_id);
        let channel = channel_for(&state.bus_id, bus.kind, bus.label);
        let contribution = contribution(bus.kind);

        trace!(
            "bus {} ({} '{}') x{} -> channel {} {}",
            state.bus_id,
            bus.kind.as_str(),
            bus.label,
            state.source_count,
            channel,
            contribution
        );
        channels.promote(channel, contribution);
    }

    channels
}

/// Channel index for a bus.
///
/// Preview and program share channel 0. Other buses go to their Aux channel
/// if the label names one, else to a stable hash of the id.
pub fn channel_for(bus_id: &str, kind: BusKind, label: &str) -> usize {
    match kind {
        BusKind::Preview | BusKind::Program => 0,
        BusKind::Other => AUX_LABELS
            .iter()
            .find(|(aux, _)| *aux == label)
            .map(|(_, channel)| *channel)
            .unwrap_or_else(|| bus_hash(bus_id) as usize % CHANNEL_COUNT),
    }
}

/// `h = h * 31 + byte`, wrapping at 32 bits.
///
/// Folds the id's UTF-8 bytes. For the ASCII ids servers issue this equals
/// folding char codes; a non-ASCII id hashes per byte, not per code unit.
pub fn bus_hash(bus_id: &str) -> u32 {
    bus_id
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// What an active bus of this kind adds to its channel.
///
/// Other buses light as program: a routed aux is treated as on-air.
pub fn contribution(kind: BusKind) -> TallyState {
    match kind {
        BusKind::Preview => TallyState::Preview,
        BusKind::Program | BusKind::Other => TallyState::Program,
    }
}
