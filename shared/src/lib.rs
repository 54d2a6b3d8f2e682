pub mod bitio;

use serde::{Deserialize, Serialize};

/// Quantization width used for all ranged-float device fields
pub const RANGED_FLOAT_BITS: u8 = 8;

/// Seconds the shuttle must stay without living occupants before it counts as empty
pub const SHUTTLE_EMPTY_DEBOUNCE_SECS: f32 = 1.0;
/// Grace period before an abandoned shuttle is despawned
pub const DESPAWN_GRACE_SECS: f32 = 30.0;
/// How far skills regress toward the job's default level on a mid-round campaign respawn
pub const SKILL_REGRESSION_ON_MIDROUND_RESPAWN: f32 = 0.75;
/// Horizontal proximity to the level start position at which the shuttle counts as returned
pub const SHUTTLE_RETURN_PROXIMITY: f32 = 1000.0;
/// Vertical extent of the exit shaft above the level start position
pub const SHAFT_HEIGHT: f32 = 2000.0;
/// Real-world depth beyond which respawnees are issued pressure-rated diving gear
pub const DEFAULT_CRUSH_DEPTH: f32 = 3500.0;

/// Phases of the shuttle respawn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RespawnState {
    Waiting,
    Transporting,
    Returning,
}

impl RespawnState {
    pub const COUNT: u32 = 3;

    pub fn to_u32(self) -> u32 {
        match self {
            RespawnState::Waiting => 0,
            RespawnState::Transporting => 1,
            RespawnState::Returning => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(RespawnState::Waiting),
            1 => Some(RespawnState::Transporting),
            2 => Some(RespawnState::Returning),
            _ => None,
        }
    }
}

/// Interaction with a single signal panel element, relayed by a client
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PanelAction {
    ButtonPressed,
    TickboxToggled { state: bool },
    TextEntered { text: String },
    NumberEntered { value: f32 },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    /// Bit-packed operator input for a reactor-type device
    ReactorControl {
        device_id: u16,
        payload: Vec<u8>,
    },
    PanelInput {
        device_id: u16,
        element: u8,
        action: PanelAction,
    },
    /// Client's answer to the respawn prompt: wait for next round or respawn mid-round
    RespawnResponse {
        wait_for_next_round: bool,
    },
    Disconnect,

    Connected {
        client_id: u32,
    },
    /// Bit-packed authoritative reactor state, broadcast when the device is dirty
    ReactorState {
        device_id: u16,
        payload: Vec<u8>,
    },
    /// Bit-packed respawn cycle state, serialized per receiving client
    RespawnUpdate {
        payload: Vec<u8>,
    },
    /// Full panel state so late joiners see current tickbox/text values
    PanelState {
        device_id: u16,
        labels: String,
        signals: String,
        states: Vec<bool>,
    },
    Disconnected {
        reason: String,
    },
}
