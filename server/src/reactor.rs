//! Reactor device controller: authoritative state, remote input and blame
//!
//! Operator input arrives pre-decoded from the network layer, is checked
//! against the submitting client's access rights, and always overwrites the
//! authoritative targets when accepted. Validation affects blame, not
//! acceptance: any input that degrades safety records the submitting client
//! as the party at fault for a later meltdown, overwriting prior blame.

use log::debug;
use shared::bitio::{BitReader, BitWriter, WireError};
use shared::RANGED_FLOAT_BITS;

use crate::client_manager::Client;

/// Grants or denies a client the right to operate a device.
/// A negative result must reject remote input completely.
pub trait AccessPolicy {
    fn can_access(&self, client: &Client) -> bool;
}

/// Default policy: any in-game, non-spectating client may operate devices
pub struct CrewAccess;

impl AccessPolicy for CrewAccess {
    fn can_access(&self, client: &Client) -> bool {
        client.in_game && !client.spectate_only
    }
}

/// Weak reference to the client whose input caused an unsafe transition.
/// Valid only while the (id, session) pair matches a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlameRecord {
    pub client_id: u32,
    pub session: u64,
}

#[derive(Debug)]
pub struct Reactor {
    pub device_id: u16,
    is_active: bool,
    auto_temp: bool,
    power_on: bool,
    temperature: f32,
    target_fission_rate: f32,
    target_turbine_output: f32,
    degree_of_success: f32,
    blame_on_broken: Option<BlameRecord>,
    last_user: Option<u32>,
    unsent_changes: bool,
    last_sent_temperature: f32,
}

impl Reactor {
    pub fn new(device_id: u16) -> Self {
        Self {
            device_id,
            is_active: false,
            auto_temp: true,
            power_on: false,
            temperature: 0.0,
            target_fission_rate: 0.0,
            target_turbine_output: 0.0,
            degree_of_success: 0.0,
            blame_on_broken: None,
            last_user: None,
            unsent_changes: false,
            last_sent_temperature: 0.0,
        }
    }

    /// Applies remotely submitted control values.
    ///
    /// Silently rejected if the client lacks access: no state change, no
    /// blame, no dirty flag. On acceptance the four authoritative fields are
    /// always overwritten; unsafe transitions additionally assign blame.
    pub fn apply_remote_input(
        &mut self,
        client: &Client,
        access: &dyn AccessPolicy,
        auto_temp: bool,
        power_on: bool,
        fission_rate: f32,
        turbine_output: f32,
    ) {
        if !access.can_access(client) {
            return;
        }

        self.is_active = true;

        let fission_rate = fission_rate.clamp(0.0, 100.0);
        let turbine_output = turbine_output.clamp(0.0, 100.0);

        let blame = BlameRecord {
            client_id: client.id,
            session: client.session,
        };
        if !auto_temp && self.auto_temp {
            self.blame_on_broken = Some(blame);
        }
        if turbine_output < self.target_turbine_output {
            self.blame_on_broken = Some(blame);
        }
        if fission_rate > self.target_fission_rate {
            self.blame_on_broken = Some(blame);
        }
        if !self.power_on && power_on {
            self.blame_on_broken = Some(blame);
        }

        self.auto_temp = auto_temp;
        self.power_on = power_on;
        self.target_fission_rate = fission_rate;
        self.target_turbine_output = turbine_output;

        self.last_user = Some(client.id);
        self.unsent_changes = true;
        debug!(
            "Reactor {} input from client {}: auto={} power={} fission={:.1} turbine={:.1}",
            self.device_id, client.id, auto_temp, power_on, fission_rate, turbine_output
        );
    }

    /// Decodes an operator control payload and applies it.
    /// Field order and widths must mirror the client-side encoder exactly.
    pub fn server_event_read(
        &mut self,
        reader: &mut BitReader,
        client: &Client,
        access: &dyn AccessPolicy,
    ) -> Result<(), WireError> {
        let auto_temp = reader.read_bool()?;
        let power_on = reader.read_bool()?;
        let fission_rate = reader.read_ranged_f32(0.0, 100.0, RANGED_FLOAT_BITS)?;
        let turbine_output = reader.read_ranged_f32(0.0, 100.0, RANGED_FLOAT_BITS)?;

        self.apply_remote_input(client, access, auto_temp, power_on, fission_rate, turbine_output);
        Ok(())
    }

    /// Serializes the full authoritative state for broadcast
    pub fn server_event_write(&self, writer: &mut BitWriter) {
        writer.write_bool(self.auto_temp);
        writer.write_bool(self.power_on);
        writer.write_ranged_f32(self.temperature, 0.0, 100.0, RANGED_FLOAT_BITS);
        writer.write_ranged_f32(self.target_fission_rate, 0.0, 100.0, RANGED_FLOAT_BITS);
        writer.write_ranged_f32(self.target_turbine_output, 0.0, 100.0, RANGED_FLOAT_BITS);
        writer.write_ranged_f32(self.degree_of_success, 0.0, 1.0, RANGED_FLOAT_BITS);
        writer.write_pad_bits();
    }

    /// Encodes an operator control payload; counterpart of [`server_event_read`](Self::server_event_read)
    pub fn encode_control(
        auto_temp: bool,
        power_on: bool,
        fission_rate: f32,
        turbine_output: f32,
    ) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write_bool(auto_temp);
        writer.write_bool(power_on);
        writer.write_ranged_f32(fission_rate, 0.0, 100.0, RANGED_FLOAT_BITS);
        writer.write_ranged_f32(turbine_output, 0.0, 100.0, RANGED_FLOAT_BITS);
        writer.into_bytes()
    }

    /// Advances the simulated temperature toward the load the targets imply
    pub fn update(&mut self, dt: f32) {
        if !self.is_active {
            return;
        }

        let desired = if self.power_on {
            (self.target_fission_rate * 2.0 - self.target_turbine_output).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let rate = 10.0 * dt;
        let delta = (desired - self.temperature).clamp(-rate, rate);
        self.temperature += delta;

        // 50 is the optimal operating temperature; success falls off linearly
        self.degree_of_success = if self.power_on {
            (1.0 - (self.temperature - 50.0).abs() / 50.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        if (self.temperature - self.last_sent_temperature).abs() > 0.5 {
            self.last_sent_temperature = self.temperature;
            self.unsent_changes = true;
        }
    }

    /// Clears blame, e.g. when the device is repaired or reset
    pub fn reset_blame(&mut self) {
        self.blame_on_broken = None;
    }

    /// Returns and clears the dirty flag; the scheduler broadcasts when true
    pub fn take_unsent_changes(&mut self) -> bool {
        std::mem::take(&mut self.unsent_changes)
    }

    pub fn has_unsent_changes(&self) -> bool {
        self.unsent_changes
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn auto_temp(&self) -> bool {
        self.auto_temp
    }

    pub fn power_on(&self) -> bool {
        self.power_on
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn target_fission_rate(&self) -> f32 {
        self.target_fission_rate
    }

    pub fn target_turbine_output(&self) -> f32 {
        self.target_turbine_output
    }

    pub fn degree_of_success(&self) -> f32 {
        self.degree_of_success
    }

    pub fn blame_on_broken(&self) -> Option<BlameRecord> {
        self.blame_on_broken
    }

    pub fn last_user(&self) -> Option<u32> {
        self.last_user
    }
}
