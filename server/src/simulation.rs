//! Aggregate round state: devices, characters and the respawn cycle
//!
//! The network layer owns a single [`Simulation`] and drives it from the
//! tick loop. Packet handlers decode payloads here so the transport code
//! never touches device internals.

use log::{debug, info};
use shared::bitio::{BitReader, BitWriter, WireError};
use shared::{Packet, PanelAction};
use std::collections::HashMap;

use crate::character::{Campaign, CharacterRoster, JobPrefab, Skill};
use crate::client_manager::{Client, ClientManager};
use crate::reactor::{AccessPolicy, CrewAccess, Reactor};
use crate::respawn::{
    CycleObserver, DefaultSpawnSelector, RespawnManager, RoundRobinAssigner, SessionContext,
};
use crate::settings::ServerSettings;
use crate::signal_panel::{
    EffectKind, ElementDef, ElementKind, PropertyBus, SignalPanel, SignalPort,
};
use crate::world::{Level, Shuttle, SpawnPoint, StandardCatalog, Submarine, Vec2};

/// Routes panel signals and property writes between devices.
///
/// Signals and effects are collected per tick; anything not drained by a
/// consumer is discarded at the start of the next update pass.
#[derive(Default)]
pub struct SignalHub {
    signals: Vec<(String, String)>,
    effects: Vec<(String, EffectKind)>,
    properties: HashMap<String, String>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }

    /// Signals emitted since the last drain, oldest first
    pub fn drain_signals(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.signals)
    }

    pub fn drain_effects(&mut self) -> Vec<(String, EffectKind)> {
        std::mem::take(&mut self.effects)
    }
}

impl SignalPort for SignalHub {
    fn send_signal(&mut self, connection: &str, signal: &str) {
        self.signals.push((connection.to_string(), signal.to_string()));
    }

    fn apply_effect(&mut self, effect: &str, kind: EffectKind) {
        self.effects.push((effect.to_string(), kind));
    }
}

impl PropertyBus for SignalHub {
    fn read_first(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }

    fn write_all(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }
}

/// Logs cycle transitions; dirty flags drive the actual broadcasts
pub struct LoggingObserver;

impl CycleObserver for LoggingObserver {
    fn broadcast(&mut self) {}

    fn log_event(&mut self, message: &str) {
        info!("{}", message);
    }
}

pub struct Simulation {
    pub settings: ServerSettings,
    pub level: Level,
    pub main_sub: Submarine,
    pub characters: CharacterRoster,
    pub campaign: Option<Campaign>,
    pub reactor: Reactor,
    pub panels: Vec<SignalPanel>,
    pub respawn: RespawnManager,
    pub hub: SignalHub,
    pub tick: u64,
    jobs: RoundRobinAssigner,
    spawn_selector: DefaultSpawnSelector,
    catalog: StandardCatalog,
    access: CrewAccess,
}

impl Simulation {
    pub fn new(settings: ServerSettings) -> Self {
        let level = Level {
            size: Vec2::new(80_000.0, 25_000.0),
            start_position: Vec2::new(6_000.0, 22_000.0),
        };
        let main_sub = Submarine {
            position: Vec2::new(6_000.0, 21_500.0),
            spawn_points: (0..6)
                .map(|i| SpawnPoint::human(Vec2::new(6_000.0 + i as f32 * 60.0, 21_500.0)))
                .collect(),
        };

        let shuttle = if !settings.use_respawn_shuttle {
            None
        } else {
            let mut points: Vec<SpawnPoint> = (0..6)
                .map(|i| SpawnPoint::human(Vec2::new(i as f32 * 50.0, 0.0)))
                .collect();
            points.push(SpawnPoint::cargo(Vec2::new(-80.0, 0.0)));
            Some(Shuttle::new(Vec2::new(400.0, 180.0), points))
        };

        let mut hub = SignalHub::new();
        // power grid defaults the engineering panel binds against
        hub.set_property("grid_load", "0");

        let panels = vec![SignalPanel::new(
            2,
            vec![
                ElementDef::new(ElementKind::Button)
                    .label("Alarm")
                    .connection("signal_out1")
                    .signal("alarm")
                    .effect("klaxon"),
                ElementDef::new(ElementKind::Tickbox)
                    .label("Lights")
                    .connection("signal_out2")
                    .signal("1")
                    .effect("floodlights"),
                ElementDef::new(ElementKind::TextInput { max_length: 32 })
                    .label("Status")
                    .connection("signal_out3"),
                ElementDef::new(ElementKind::NumberInput {
                    min: 0.0,
                    max: 100.0,
                    integer_only: true,
                })
                .label("Load limit")
                .property("grid_load", false),
            ],
            HashMap::new(),
            &hub,
        )];

        let respawn = RespawnManager::new(shuttle, &settings);
        let jobs = RoundRobinAssigner::new(default_jobs());

        Self {
            settings,
            level,
            main_sub,
            characters: CharacterRoster::new(),
            campaign: None,
            reactor: Reactor::new(1),
            panels,
            respawn,
            hub,
            tick: 0,
            jobs,
            spawn_selector: DefaultSpawnSelector,
            catalog: StandardCatalog::default(),
            access: CrewAccess,
        }
    }

    /// Advances devices and the respawn cycle by one tick
    pub fn update(&mut self, dt: f32, clients: &mut ClientManager, observer: &mut dyn CycleObserver) {
        self.tick += 1;

        self.reactor.update(dt);
        for panel in &mut self.panels {
            panel.update(&mut self.hub);
        }

        // blamed client gone for good: the record must not outlive the session
        if let Some(blame) = self.reactor.blame_on_broken() {
            if !clients.session_alive(blame.client_id, blame.session) {
                self.reactor.reset_blame();
            }
        }

        let Simulation {
            characters,
            campaign,
            settings,
            level,
            main_sub,
            jobs,
            spawn_selector,
            catalog,
            respawn,
            ..
        } = self;
        let mut ctx = SessionContext {
            clients,
            characters,
            campaign: campaign.as_mut(),
            settings,
            level,
            main_sub,
            jobs,
            spawn_selector: &*spawn_selector,
            catalog: &*catalog,
        };
        respawn.update(dt, &mut ctx, observer);
    }

    /// Decodes and applies an operator control payload for a reactor device
    pub fn handle_reactor_control(
        &mut self,
        client: &Client,
        device_id: u16,
        payload: &[u8],
    ) -> Result<(), WireError> {
        if device_id != self.reactor.device_id {
            debug!("Control for unknown device {} from client {}", device_id, client.id);
            return Ok(());
        }
        let mut reader = BitReader::new(payload);
        self.reactor.server_event_read(&mut reader, client, &self.access)
    }

    /// Applies a relayed panel element interaction
    pub fn handle_panel_input(
        &mut self,
        client: &Client,
        device_id: u16,
        element: u8,
        action: &PanelAction,
    ) {
        if !self.access.can_access(client) {
            return;
        }
        let Some(panel) = self.panels.iter_mut().find(|p| p.device_id == device_id) else {
            debug!("Panel input for unknown device {} from client {}", device_id, client.id);
            return;
        };

        let index = element as usize;
        match action {
            PanelAction::ButtonPressed => panel.button_activated(index, &mut self.hub),
            PanelAction::TickboxToggled { state } => panel.tickbox_toggled(index, *state),
            PanelAction::TextEntered { text } => panel.text_changed(index, text, &mut self.hub),
            PanelAction::NumberEntered { value } => {
                panel.number_changed(index, *value, &mut self.hub)
            }
        }
    }

    pub fn reactor_state_packet(&self) -> Packet {
        let mut writer = BitWriter::new();
        self.reactor.server_event_write(&mut writer);
        Packet::ReactorState {
            device_id: self.reactor.device_id,
            payload: writer.into_bytes(),
        }
    }

    /// State packets for every panel marked dirty since the last pass
    pub fn dirty_panel_packets(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        for panel in &mut self.panels {
            if panel.take_unsent_changes() {
                let (labels, signals) = panel.save();
                packets.push(Packet::PanelState {
                    device_id: panel.device_id,
                    labels,
                    signals,
                    states: panel.states(),
                });
            }
        }
        packets
    }

    /// Serializes the respawn cycle state as seen by one client
    pub fn respawn_update_for(&mut self, clients: &mut ClientManager, client_id: u32) -> Packet {
        let Simulation {
            characters,
            campaign,
            settings,
            level,
            main_sub,
            jobs,
            spawn_selector,
            catalog,
            respawn,
            ..
        } = self;
        let ctx = SessionContext {
            clients,
            characters,
            campaign: campaign.as_mut(),
            settings,
            level,
            main_sub,
            jobs,
            spawn_selector: &*spawn_selector,
            catalog: &*catalog,
        };

        let mut writer = BitWriter::new();
        respawn.server_event_write(&mut writer, &ctx, client_id);
        Packet::RespawnUpdate {
            payload: writer.into_bytes(),
        }
    }
}

fn default_jobs() -> Vec<JobPrefab> {
    vec![
        JobPrefab::new(
            "mechanic",
            "Mechanic",
            vec![Skill::new("mechanical", 40.0), Skill::new("electrical", 15.0)],
        ),
        JobPrefab::new(
            "engineer",
            "Engineer",
            vec![Skill::new("electrical", 40.0), Skill::new("mechanical", 15.0)],
        ),
        JobPrefab::new(
            "medic",
            "Medical Doctor",
            vec![Skill::new("medical", 45.0)],
        ),
        JobPrefab::new(
            "securityofficer",
            "Security Officer",
            vec![Skill::new("weapons", 45.0)],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RespawnState;
    use std::net::SocketAddr;

    fn connect(sim_clients: &mut ClientManager, port: u16, name: &str) -> u32 {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let id = sim_clients.add_client(addr, name).unwrap();
        sim_clients.get_mut(id).unwrap().in_game = true;
        id
    }

    #[test]
    fn test_reactor_control_roundtrip_through_simulation() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9100, "op");

        let payload = Reactor::encode_control(false, true, 30.0, 70.0);
        let client = clients.get(id).unwrap();
        sim.handle_reactor_control(client, 1, &payload).unwrap();

        assert!(sim.reactor.power_on());
        assert!(!sim.reactor.auto_temp());
        // powering on and disabling automatic control both assign blame
        assert_eq!(sim.reactor.blame_on_broken().unwrap().client_id, id);
        assert!(sim.reactor.take_unsent_changes());
    }

    #[test]
    fn test_control_for_unknown_device_ignored() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9101, "op");

        let payload = Reactor::encode_control(false, true, 30.0, 70.0);
        sim.handle_reactor_control(clients.get(id).unwrap(), 99, &payload)
            .unwrap();

        assert!(!sim.reactor.power_on());
        assert!(!sim.reactor.has_unsent_changes());
    }

    #[test]
    fn test_blame_cleared_when_session_dies() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9102, "op");

        let payload = Reactor::encode_control(true, true, 0.0, 0.0);
        sim.handle_reactor_control(clients.get(id).unwrap(), 1, &payload)
            .unwrap();
        assert!(sim.reactor.blame_on_broken().is_some());

        clients.remove_client(&id);
        let mut observer = LoggingObserver;
        sim.update(0.1, &mut clients, &mut observer);
        assert!(sim.reactor.blame_on_broken().is_none());
    }

    #[test]
    fn test_panel_input_dispatch_and_dirty_packet() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9103, "op");
        // construction-time signal resolution marks the panel dirty once
        sim.dirty_panel_packets();

        let action = PanelAction::TickboxToggled { state: true };
        sim.handle_panel_input(clients.get(id).unwrap(), 2, 1, &action);

        let packets = sim.dirty_panel_packets();
        assert_eq!(packets.len(), 1);
        match &packets[0] {
            Packet::PanelState { device_id, states, .. } => {
                assert_eq!(*device_id, 2);
                assert!(states[1]);
            }
            _ => panic!("Expected a panel state packet"),
        }
        // nothing changed since: no packet
        assert!(sim.dirty_panel_packets().is_empty());
    }

    #[test]
    fn test_spectator_panel_input_rejected() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9104, "watcher");
        clients.get_mut(id).unwrap().spectate_only = true;
        sim.dirty_panel_packets();

        let action = PanelAction::TickboxToggled { state: true };
        sim.handle_panel_input(clients.get(id).unwrap(), 2, 1, &action);

        assert_eq!(sim.panels[0].state(1), Some(false));
        assert!(sim.dirty_panel_packets().is_empty());
    }

    #[test]
    fn test_tick_emits_continuous_signals() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9105, "op");

        let action = PanelAction::TickboxToggled { state: true };
        sim.handle_panel_input(clients.get(id).unwrap(), 2, 1, &action);

        let mut observer = LoggingObserver;
        sim.update(0.1, &mut clients, &mut observer);
        let signals = sim.hub.drain_signals();
        assert!(signals.contains(&("signal_out2".to_string(), "1".to_string())));
    }

    #[test]
    fn test_respawn_update_packet_has_payload() {
        let mut sim = Simulation::new(ServerSettings::default());
        let mut clients = ClientManager::new(8);
        let id = connect(&mut clients, 9106, "crew");

        let mut observer = LoggingObserver;
        sim.update(0.1, &mut clients, &mut observer);
        assert_eq!(sim.respawn.state(), RespawnState::Waiting);

        match sim.respawn_update_for(&mut clients, id) {
            Packet::RespawnUpdate { payload } => assert!(!payload.is_empty()),
            _ => panic!("Expected a respawn update packet"),
        }
    }
}
