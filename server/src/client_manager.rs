//! Client connection management for the authoritative server
//!
//! Tracks every connected client: network address, activity for timeout
//! cleanup, roster flags the respawn cycle inspects (in-game, spectating,
//! server owner), the character the client currently controls, and their
//! answer to the mid-round respawn prompt. Client ids are never reused;
//! each connection additionally carries a session generation so that
//! references held by devices (blame records) stay weak.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::character::{CharacterId, CharacterInfo, JobPrefab, TeamId};

/// A connected client and the per-connection state the simulation reads
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Session generation, for weak references that must not outlive the connection
    pub session: u64,
    pub addr: SocketAddr,
    pub name: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// False until the client has finished loading into the round
    pub in_game: bool,
    pub spectate_only: bool,
    /// The hosting player; exempt from some spectator restrictions
    pub is_owner: bool,
    pub team: TeamId,
    /// The character this client currently controls, if any
    pub character: Option<CharacterId>,
    pub character_info: Option<CharacterInfo>,
    /// Job granted by the last job-assignment pass
    pub assigned_job: Option<JobPrefab>,
    /// Respawn prompt answer: None = unanswered, Some(true) = wait for next round
    pub wait_for_next_round_respawn: Option<bool>,
}

impl Client {
    pub fn new(id: u32, session: u64, addr: SocketAddr, name: String) -> Self {
        Self {
            id,
            session,
            addr,
            name,
            last_seen: Instant::now(),
            in_game: false,
            spectate_only: false,
            is_owner: false,
            team: TeamId::Team1,
            character: None,
            character_info: None,
            assigned_job: None,
            wait_for_next_round_respawn: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Central roster of connected clients
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    next_session: u64,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            next_session: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection.
    /// Returns None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, name: &str) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;
        let session = self.next_session;
        self.next_session += 1;

        let client = Client::new(client_id, session, addr, name.to_string());
        info!("Client {} ({}) connected from {}", client_id, name, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// True if the blame pair still refers to a live connection
    pub fn session_alive(&self, client_id: u32, session: u64) -> bool {
        self.clients
            .get(&client_id)
            .map(|c| c.session == session)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    /// Checks for and removes timed-out clients, returning their ids
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = Duration::from_secs(5);
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// All client ids and addresses, for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_add_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr(), "Nemo").unwrap();
        assert_eq!(client_id, 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get(client_id).unwrap().name, "Nemo");
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        assert!(manager.add_client(test_addr(), "a").is_some());
        assert!(manager.add_client(test_addr2(), "b").is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr(), "a").unwrap();
        assert!(manager.remove_client(&client_id));
        assert!(!manager.remove_client(&client_id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let id1 = manager.add_client(test_addr(), "a").unwrap();
        manager.add_client(test_addr2(), "b").unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(id1));
        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
    }

    #[test]
    fn test_sessions_are_unique_across_connections() {
        let mut manager = ClientManager::new(4);
        let id1 = manager.add_client(test_addr(), "a").unwrap();
        let session1 = manager.get(id1).unwrap().session;
        manager.remove_client(&id1);

        let id2 = manager.add_client(test_addr(), "a").unwrap();
        let session2 = manager.get(id2).unwrap().session;
        assert_ne!(session1, session2);

        assert!(!manager.session_alive(id1, session1));
        assert!(manager.session_alive(id2, session2));
    }

    #[test]
    fn test_client_timeout() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr(), "a").unwrap();
        manager.get_mut(id).unwrap().last_seen = Instant::now() - Duration::from_secs(10);

        let timed_out = manager.check_timeouts();
        assert_eq!(timed_out, vec![id]);
        assert!(manager.is_empty());
    }
}
