//! Server-side tunables governing respawns and device access

/// How bots are replenished when a respawn batch is assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotSpawnMode {
    /// Revive every dead crew-team bot
    Normal,
    /// Top the crew up to `bot_count` total, counting connected players
    Fill,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub max_clients: usize,
    /// Seconds between a respawn countdown starting and the shuttle dispatching
    pub respawn_interval: f32,
    /// Fraction of connected clients that must be waiting before a countdown starts
    pub min_respawn_ratio: f32,
    /// Seconds the shuttle stays on station before it is recalled
    pub max_transport_time: f32,
    pub allow_spectating: bool,
    pub bot_count: usize,
    pub bot_spawn_mode: BotSpawnMode,
    /// Campaign clients who already spawned must answer a prompt before respawning mid-round
    pub use_respawn_prompt: bool,
    /// When false no shuttle is installed and batches respawn aboard the main sub
    pub use_respawn_shuttle: bool,
    /// Scripted override: suppress shuttle transport and respawn nobody through the cycle
    pub override_respawn_sub: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_clients: 16,
            respawn_interval: 180.0,
            min_respawn_ratio: 0.5,
            max_transport_time: 180.0,
            allow_spectating: true,
            bot_count: 0,
            bot_spawn_mode: BotSpawnMode::Normal,
            use_respawn_prompt: false,
            use_respawn_shuttle: true,
            override_respawn_sub: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_sane() {
        let settings = ServerSettings::default();
        assert!(settings.min_respawn_ratio > 0.0 && settings.min_respawn_ratio <= 1.0);
        assert!(settings.respawn_interval > 0.0);
        assert!(settings.max_transport_time > 0.0);
        assert!(settings.use_respawn_shuttle);
    }
}
