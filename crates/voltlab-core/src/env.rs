//! Shared physical context: temperature, light, and wireless channels.
//!
//! The environment is an explicit value threaded through the engine, not a
//! process-wide global. Device stamps read it; only the driver writes it
//! between steps (plus transmitting antennas, which accumulate into the
//! wireless channels at commit).

use serde::{Deserialize, Serialize};

/// Boltzmann constant over elementary charge (V/K).
const K_OVER_Q: f64 = 8.617_333_262e-5;

/// Number of abstract RF channels available to antennas.
pub const NUM_WIRELESS_CHANNELS: usize = 8;

/// One abstract RF channel: transmitters accumulate their terminal
/// voltage, receivers read the average.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WirelessChannel {
    pub accumulated_v: f64,
    pub tx_count: u32,
}

/// Process-wide physical context shared by all devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Ambient temperature in °C.
    pub temperature_c: f64,
    /// Illumination level in [0, 1].
    pub light: f64,
    /// Abstract RF channels, reset at the start of each assembly pass.
    pub channels: [WirelessChannel; NUM_WIRELESS_CHANNELS],
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature_c: 25.0,
            light: 0.5,
            channels: [WirelessChannel::default(); NUM_WIRELESS_CHANNELS],
        }
    }
}

impl Environment {
    pub fn new(temperature_c: f64, light: f64) -> Self {
        Self {
            temperature_c,
            light: light.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Ambient temperature in kelvin.
    pub fn temperature_k(&self) -> f64 {
        self.temperature_c + 273.15
    }

    /// Thermal voltage kT/q at the ambient temperature.
    ///
    /// Every junction model derives its exponential slope from this, so
    /// temperature dependence has a single source of truth.
    pub fn thermal_voltage(&self) -> f64 {
        K_OVER_Q * self.temperature_k()
    }

    /// Zero all wireless channels. Called at the start of each assembly pass.
    pub fn reset_channels(&mut self) {
        self.channels = [WirelessChannel::default(); NUM_WIRELESS_CHANNELS];
    }

    /// Record a transmitter's terminal voltage on `channel`.
    pub fn transmit(&mut self, channel: usize, voltage: f64) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.accumulated_v += voltage;
            ch.tx_count += 1;
        }
    }

    /// Averaged voltage on `channel` (0 when nothing transmits).
    pub fn channel_voltage(&self, channel: usize) -> f64 {
        match self.channels.get(channel) {
            Some(ch) if ch.tx_count > 0 => ch.accumulated_v / ch.tx_count as f64,
            _ => 0.0,
        }
    }
}
