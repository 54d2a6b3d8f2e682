//! # Survival Game Server Library
//!
//! Authoritative server for a cooperative submarine survival game. It owns
//! the canonical device and crew state, processes client device inputs, and
//! broadcasts updates so every connected client converges on the server's
//! view of the round.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Devices
//! Shipboard devices (the reactor, configurable signal panels) live on the
//! server. Clients submit bit-packed control payloads; the server validates
//! access, applies the input, and rebroadcasts the resulting state. For the
//! reactor, unsafe inputs additionally record which client to blame if the
//! device later fails.
//!
//! ### The Respawn Cycle
//! Dead players and bots are periodically brought back aboard a transport
//! shuttle that dives into the level, waits on station, and despawns after
//! returning. The cycle is a three-phase state machine driven from the tick
//! loop; see the [`respawn`] module.
//!
//! ### Client Management
//! Connection lifecycle, session generations for weak cross-references,
//! timeout detection and per-client respawn prompt answers.
//!
//! ## Architecture Design
//!
//! The server uses a single-threaded, event-driven tick loop over UDP.
//! Network receive, send and timeout checking run as separate async tasks
//! feeding the main loop through channels; all simulation state is mutated
//! sequentially inside the tick, which keeps the round deterministic.
//!
//! ## Module Organization
//!
//! - [`client_manager`]: connection roster and session bookkeeping
//! - [`simulation`]: aggregate round state driven by the tick loop
//! - [`reactor`]: reactor device controller and blame attribution
//! - [`signal_panel`]: configurable button/tickbox/text/number panels
//! - [`respawn`]: the shuttle respawn cycle state machine
//! - [`character`]: crew roster, jobs, campaign persistence
//! - [`world`]: level geometry, submarines, the shuttle, item prefabs
//! - [`tasks`]: named cancelable shuttle motion tasks
//! - [`network`]: UDP transport and the main server loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::settings::ServerSettings;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(33), // 30Hz tick
//!         ServerSettings::default(),
//!     ).await?;
//!
//!     // Runs the main loop: receives device inputs, advances the
//!     // simulation and the respawn cycle, broadcasts dirty state.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod client_manager;
pub mod network;
pub mod reactor;
pub mod respawn;
pub mod settings;
pub mod signal_panel;
pub mod simulation;
pub mod tasks;
pub mod world;
