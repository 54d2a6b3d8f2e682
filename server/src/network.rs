//! Server network layer handling UDP communications and tick loop coordination

use crate::client_manager::ClientManager;
use crate::settings::ServerSettings;
use crate::simulation::{LoggingObserver, Simulation};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the tick loop to network tasks
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and the round simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    simulation: Simulation,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        settings: ServerSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let max_clients = settings.max_clients;
        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            simulation: Simulation::new(settings),
            tick_duration,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet, exclude: Option<u32>) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::BroadcastPacket {
            packet: packet.clone(),
            exclude,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets and updates simulation state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&existing_id);
                }

                // Try to add new client
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let name = format!("Crew-{:04X}", rand::random::<u16>());
                    let client_id = clients.add_client(addr, &name);
                    if let Some(id) = client_id {
                        if let Some(client) = clients.get_mut(id) {
                            client.in_game = true;
                        }
                    }
                    client_id
                };

                if let Some(client_id) = client_id {
                    let response = Packet::Connected { client_id };
                    self.send_packet(&response, addr).await;

                    // bring the late joiner up to date with device state
                    self.send_packet(&self.simulation.reactor_state_packet(), addr)
                        .await;
                    let panel_packets: Vec<Packet> = self
                        .simulation
                        .panels
                        .iter_mut()
                        .map(|panel| {
                            let (labels, signals) = panel.save();
                            Packet::PanelState {
                                device_id: panel.device_id,
                                labels,
                                signals,
                                states: panel.states(),
                            }
                        })
                        .collect();
                    for packet in panel_packets {
                        self.send_packet(&packet, addr).await;
                    }
                } else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                }
            }

            Packet::ReactorControl { device_id, payload } => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    if let Some(client) = clients.get_mut(client_id) {
                        client.touch();
                    }
                    if let Some(client) = clients.get(client_id) {
                        if let Err(e) =
                            self.simulation
                                .handle_reactor_control(client, device_id, &payload)
                        {
                            warn!(
                                "Malformed reactor control from client {}: {}",
                                client_id, e
                            );
                        }
                    }
                }
            }

            Packet::PanelInput {
                device_id,
                element,
                action,
            } => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    if let Some(client) = clients.get_mut(client_id) {
                        client.touch();
                    }
                    if let Some(client) = clients.get(client_id) {
                        self.simulation
                            .handle_panel_input(client, device_id, element, &action);
                    }
                }
            }

            Packet::RespawnResponse {
                wait_for_next_round,
            } => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    if let Some(client) = clients.get_mut(client_id) {
                        client.touch();
                        client.wait_for_next_round_respawn = Some(wait_for_next_round);
                        debug!(
                            "Client {} answered respawn prompt: wait={}",
                            client_id, wait_for_next_round
                        );
                    }
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Advances the simulation and broadcasts whatever turned dirty
    async fn run_tick(&mut self, dt: f32) {
        let mut observer = LoggingObserver;
        {
            let mut clients = self.clients.write().await;
            self.simulation.update(dt, &mut clients, &mut observer);
        }

        if self.simulation.reactor.take_unsent_changes() {
            let packet = self.simulation.reactor_state_packet();
            self.broadcast_packet(&packet, None).await;
        }

        let panel_packets = self.simulation.dirty_panel_packets();
        for packet in panel_packets {
            self.broadcast_packet(&packet, None).await;
        }

        // respawn state is view-dependent, serialize it per receiving client
        if self.simulation.respawn.take_unsent_changes() {
            let updates = {
                let mut clients = self.clients.write().await;
                let addrs = clients.get_client_addrs();
                addrs
                    .into_iter()
                    .map(|(client_id, addr)| {
                        (addr, self.simulation.respawn_update_for(&mut clients, client_id))
                    })
                    .collect::<Vec<_>>()
            };
            for (addr, packet) in updates {
                self.send_packet(&packet, addr).await;
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.run_tick(dt).await;

                    // Periodic performance monitoring
                    if self.simulation.tick % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {:.1}Hz, respawn state {:?}",
                                self.simulation.tick,
                                client_count,
                                1.0 / dt,
                                self.simulation.respawn.state()
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
