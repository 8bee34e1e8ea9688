//! Listener state
//!
//! [`Listener`] owns everything the daemon knows: the session, the endpoint
//! table, the latest bus catalog, device states and directory, and the
//! channel states derived from them. It is driven one [`Dispatch`] at a time
//! and answers with [`Action`]s for the control loop to carry out; it never
//! sleeps or touches the transport itself.

use std::net::SocketAddr;
use std::time::Duration;

use tallyproto::InboundEvent;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatch::{route, Dispatch};
use crate::model::{
    BusCatalog, ChannelStates, DeviceBusState, DeviceDirectory, EndpointTable, CHANNEL_COUNT,
};
use crate::resolver::resolve;
use crate::session::{registration_envelopes, ConnectionSession, SessionPhase};

/// Side effects requested by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send these envelopes in order, spaced by the registration delay.
    Register(Vec<String>),
    /// Show these channel states on the lamps.
    Show(ChannelStates),
    /// Run the flash sequence, then [`Listener::restore`].
    Flash,
}

pub struct Listener {
    session: ConnectionSession,
    endpoints: EndpointTable,
    catalog: BusCatalog,
    device_states: Vec<DeviceBusState>,
    directory: DeviceDirectory,
    channels: ChannelStates,
    local_address: Option<SocketAddr>,
}

impl Listener {
    pub fn new(display_names: [String; CHANNEL_COUNT], now: Instant, reconnect_interval: Duration) -> Self {
        Self {
            session: ConnectionSession::new(now, reconnect_interval),
            endpoints: EndpointTable::new(display_names),
            catalog: BusCatalog::default(),
            device_states: Vec::new(),
            directory: DeviceDirectory::default(),
            channels: ChannelStates::all_off(),
            local_address: None,
        }
    }

    // === Accessors ===

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ConnectionSession {
        &mut self.session
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    pub fn catalog(&self) -> &BusCatalog {
        &self.catalog
    }

    pub fn device_states(&self) -> &[DeviceBusState] {
        &self.device_states
    }

    pub fn channels(&self) -> ChannelStates {
        self.channels
    }

    /// Our end of the live socket, if any.
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    // === Handling ===

    pub fn handle(&mut self, dispatch: Dispatch, now: Instant) -> Vec<Action> {
        match dispatch {
            Dispatch::Opened(addr) => {
                debug!("socket open from {}", addr);
                self.local_address = Some(addr);
                Vec::new()
            }
            Dispatch::Connect => self.on_connect(),
            Dispatch::Disconnect => self.on_disconnect(now),
            Dispatch::Event { name, raw_body } => match route(&name, raw_body.as_deref()) {
                Some(event) => self.on_event(event),
                None => Vec::new(),
            },
        }
    }

    /// Re-derive channel states from the retained inputs.
    pub fn restore(&mut self) -> ChannelStates {
        self.channels = resolve(&self.catalog, &self.device_states);
        self.channels
    }

    fn on_connect(&mut self) -> Vec<Action> {
        let prev = self.session.on_connect();
        match prev {
            SessionPhase::Reconnecting => info!("Reconnected to server"),
            _ => info!("Connected to server"),
        }

        match registration_envelopes(&self.endpoints) {
            Ok(envelopes) => vec![Action::Register(envelopes)],
            Err(e) => {
                warn!("failed to encode registrations: {}", e);
                Vec::new()
            }
        }
    }

    fn on_disconnect(&mut self, now: Instant) -> Vec<Action> {
        // Device states from a dead session must not relight anything later
        self.device_states.clear();
        self.local_address = None;
        self.channels = ChannelStates::all_off();
        if self.session.on_disconnect(now) {
            warn!("Disconnected from server, lamps off until reconnected");
        } else {
            debug!("disconnect while already reconnecting");
        }
        vec![Action::Show(self.channels)]
    }

    fn on_event(&mut self, event: InboundEvent) -> Vec<Action> {
        match event {
            InboundEvent::BusOptions(options) => {
                self.catalog = BusCatalog::from_options(&options);
                debug!("bus catalog: {} buses", self.catalog.len());
                let channels = self.restore();
                vec![Action::Show(channels)]
            }
            InboundEvent::DeviceId(id) => {
                match self.endpoints.assign_next(&id) {
                    Some(slot) => info!("Assigned device {} to tally {}", id, slot + 1),
                    None => debug!("all endpoints assigned, ignoring device {}", id),
                }
                self.log_endpoint_names();
                Vec::new()
            }
            InboundEvent::Devices(devices) => {
                self.directory = DeviceDirectory::from_entries(&devices);
                debug!("device directory: {} devices", self.directory.len());
                self.log_endpoint_names();
                Vec::new()
            }
            InboundEvent::DeviceStates(entries) => {
                self.device_states = entries.iter().map(DeviceBusState::from).collect();
                let channels = self.restore();
                debug!("channels: {}", channels);
                vec![Action::Show(channels)]
            }
            InboundEvent::Flash => {
                info!("Flash requested");
                vec![Action::Flash]
            }
            InboundEvent::Reassign(body) => {
                info!("Reassign received ({}), ignoring", body.as_deref().unwrap_or("no body"));
                Vec::new()
            }
        }
    }

    fn log_endpoint_names(&mut self) {
        if !self.endpoints.refresh_names(&self.directory) {
            return;
        }
        for ep in self.endpoints.iter() {
            if let (Some(id), Some(name)) = (&ep.assigned_id, &ep.device_name) {
                info!("tally {}: {} ({})", ep.slot_index + 1, name, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TallyState::*;
    use pretty_assertions::assert_eq;

    const INTERVAL: Duration = Duration::from_secs(5);

    const BUS_OPTIONS: &str = r#"["bus_options",[{"id":"p","type":"preview","label":"Preview"},{"id":"g","type":"program","label":"Program"},{"id":"a2","type":"aux","label":"Aux 2"}]]"#;

    fn listener() -> Listener {
        Listener::new(
            std::array::from_fn(|i| format!("Tally-Tally{}-T", i + 1)),
            Instant::now(),
            INTERVAL,
        )
    }

    fn event(text: &str) -> Dispatch {
        crate::dispatch::classify(crate::dispatch::TransportMessage::Text(text.to_string())).unwrap()
    }

    fn feed(listener: &mut Listener, text: &str) -> Vec<Action> {
        listener.handle(event(text), Instant::now())
    }

    #[test]
    fn test_connect_registers_four_endpoints() {
        let mut l = listener();
        let actions = l.handle(Dispatch::Connect, Instant::now());
        let [Action::Register(envelopes)] = actions.as_slice() else {
            panic!("expected a single register action, got {:?}", actions);
        };
        assert_eq!(envelopes.len(), 4);
        for (i, env) in envelopes.iter().enumerate() {
            assert!(env.contains(&format!(r#""listenerType":"Tally-Tally{}-T""#, i + 1)));
        }
        assert!(l.session().is_connected());
    }

    #[test]
    fn test_scenario_preview_and_program() {
        let mut l = listener();
        feed(&mut l, BUS_OPTIONS);
        let actions = feed(
            &mut l,
            r#"["device_states",[{"busId":"p","sources":["s"]},{"busId":"g","sources":["s"]}]]"#,
        );
        assert_eq!(
            actions,
            vec![Action::Show(ChannelStates::from_states([Both, Off, Off, Off]))]
        );
    }

    #[test]
    fn test_scenario_aux_bus() {
        let mut l = listener();
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["device_states",[{"busId":"a2","sources":["s"]}]]"#);
        assert_eq!(l.channels().as_array(), [Off, Off, Program, Off]);
    }

    #[test]
    fn test_scenario_disconnect_blackout() {
        let mut l = listener();
        l.handle(Dispatch::Connect, Instant::now());
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["device_states",[{"busId":"g","sources":["s"]}]]"#);
        assert_eq!(l.channels().get(0), Some(Program));

        let actions = l.handle(Dispatch::Disconnect, Instant::now());
        assert_eq!(actions, vec![Action::Show(ChannelStates::all_off())]);
        assert!(l.channels().is_dark());
        assert_eq!(l.session().phase(), SessionPhase::Reconnecting);
    }

    #[test]
    fn test_flash_restores_previous_states() {
        let mut l = listener();
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["device_states",[{"busId":"p","sources":["s"]}]]"#);
        let before = l.channels();

        assert_eq!(feed(&mut l, r#"["flash"]"#), vec![Action::Flash]);
        assert_eq!(l.restore(), before);
        assert_eq!(l.catalog().len(), 3);
        assert_eq!(l.device_states().len(), 1);
    }

    #[test]
    fn test_device_ids_fill_slots_then_stop() {
        let mut l = listener();
        for id in ["a", "b", "c", "d", "e"] {
            assert!(feed(&mut l, &format!(r#"["deviceId","{}"]"#, id)).is_empty());
        }
        let ids: Vec<_> = l
            .endpoints()
            .iter()
            .map(|ep| ep.assigned_id.as_deref().unwrap_or("-"))
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_device_names_follow_directory() {
        let mut l = listener();
        feed(&mut l, r#"["deviceId","cam1"]"#);
        feed(&mut l, r#"["devices",[{"id":"cam1","name":"Camera 1"}]]"#);
        assert_eq!(
            l.endpoints().get(0).and_then(|ep| ep.device_name.as_deref()),
            Some("Camera 1")
        );
    }

    #[test]
    fn test_malformed_and_unknown_events_change_nothing() {
        let mut l = listener();
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["device_states",[{"busId":"p","sources":["s"]}]]"#);
        let before = l.channels();

        assert!(feed(&mut l, r#"["device_states",{broken]"#).is_empty());
        assert!(feed(&mut l, r#"["messaging",["x"]]"#).is_empty());
        assert!(feed(&mut l, r#"["reassign"]"#).is_empty());
        assert_eq!(l.channels(), before);
        assert_eq!(l.catalog().len(), 3);
    }

    #[test]
    fn test_new_bus_options_replace_catalog() {
        let mut l = listener();
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["bus_options",[{"id":"g","type":"program","label":"Program"}]]"#);
        assert_eq!(l.catalog().len(), 1);
        assert!(l.catalog().get("p").is_none());
    }

    #[test]
    fn test_bus_options_change_re_resolves() {
        let mut l = listener();
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["device_states",[{"busId":"g","sources":["s"]}]]"#);
        assert_eq!(l.channels().get(0), Some(Program));

        // Same bus id, now declared as preview
        let actions = feed(&mut l, r#"["bus_options",[{"id":"g","type":"preview","label":"Preview"}]]"#);
        let expected = ChannelStates::from_states([Preview, Off, Off, Off]);
        assert_eq!(actions, vec![Action::Show(expected)]);
        assert_eq!(l.channels(), expected);
        assert_eq!(l.channels(), resolve(l.catalog(), l.device_states()));
    }

    #[test]
    fn test_flash_after_reconnect_stays_dark() {
        let mut l = listener();
        let local: SocketAddr = "10.0.0.20:41000".parse().unwrap();
        assert!(l.handle(Dispatch::Opened(local), Instant::now()).is_empty());
        assert_eq!(l.local_address(), Some(local));
        l.handle(Dispatch::Connect, Instant::now());
        feed(&mut l, BUS_OPTIONS);
        feed(&mut l, r#"["device_states",[{"busId":"g","sources":["s"]}]]"#);
        assert_eq!(l.channels().get(0), Some(Program));

        l.handle(Dispatch::Disconnect, Instant::now());
        assert!(l.device_states().is_empty());
        assert_eq!(l.local_address(), None);
        l.handle(Dispatch::Connect, Instant::now());

        let before = l.channels();
        assert!(before.is_dark());
        assert_eq!(feed(&mut l, r#"["flash"]"#), vec![Action::Flash]);
        assert_eq!(l.restore(), before);
    }
}
