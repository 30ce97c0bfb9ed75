//! Abstract RF link: transmitting and receiving antennas.
//!
//! A transmitter records its solved terminal voltage into an environment
//! channel at commit; a receiver latches the averaged channel voltage at
//! the start of the step (before the driver resets the channels) and
//! stamps it as a Thevenin source. The loop is therefore one step deep,
//! which is the intended abstraction, not a race.

use serde::{Deserialize, Serialize};
use voltlab_core::{Environment, MnaSystem};

use crate::ctx::{positive, CommitCtx, FieldError, StampCtx};
use crate::device::DeviceModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaParams {
    pub channel: usize,
    /// Source resistance of the receiver's Thevenin equivalent.
    pub r_source: f64,
}

impl Default for AntennaParams {
    fn default() -> Self {
        Self {
            channel: 0,
            r_source: 50.0,
        }
    }
}

/// Transmitting antenna. Terminals: signal, reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxAntenna {
    pub params: AntennaParams,
}

impl DeviceModel for TxAntenna {
    fn kind_name(&self) -> &'static str {
        "tx_antenna"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(0, -2), (0, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        // Presents a light load so an otherwise-unconnected driver node
        // stays well conditioned.
        mna.stamp_conductance(ctx.node(0), ctx.node(1), 1e-6);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let v = ctx.v_diff(0, 1);
        ctx.env.transmit(self.params.channel, v);
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "channel" => self.params.channel = value.max(0.0) as usize,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "channel" => Some(self.params.channel as f64),
            _ => None,
        }
    }
}

/// Receiving antenna. Terminals: signal, reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RxAntenna {
    pub params: AntennaParams,
    pub state: RxAntennaState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RxAntennaState {
    /// Channel voltage captured at the start of the current step.
    pub latched_v: f64,
}

impl DeviceModel for RxAntenna {
    fn kind_name(&self) -> &'static str {
        "rx_antenna"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(0, -2), (0, 2)]
    }

    fn begin_step(&mut self, env: &Environment) {
        self.state.latched_v = env.channel_voltage(self.params.channel);
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let g = 1.0 / self.params.r_source;
        mna.stamp_conductance(ctx.node(0), ctx.node(1), g);
        mna.stamp_current_source(ctx.node(1), ctx.node(0), g * self.state.latched_v);
    }

    fn reset_state(&mut self) {
        self.state = RxAntennaState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "channel" => self.params.channel = value.max(0.0) as usize,
            "r_source" => self.params.r_source = positive(value, "r_source")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "channel" => Some(self.params.channel as f64),
            "r_source" => Some(self.params.r_source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn test_tx_accumulates_and_rx_latches() {
        let mut tx = TxAntenna::default();
        let mut rx = RxAntenna::default();
        let mut env = Environment::default();
        let mut events = Vec::new();

        // Transmit 3 V at commit.
        let x = DVector::from_vec(vec![3.0, 0.0]);
        let nodes = [Some(0), Some(1)];
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: None,
            dt: 1e-6,
            time: 1e-6,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        tx.commit(&mut ctx);

        // Next step: receiver latches before the channel reset.
        rx.begin_step(&env);
        env.reset_channels();
        assert_eq!(rx.state.latched_v, 3.0);
        assert_eq!(env.channel_voltage(0), 0.0);
    }

    #[test]
    fn test_two_transmitters_average() {
        let mut env = Environment::default();
        env.transmit(1, 2.0);
        env.transmit(1, 4.0);
        let mut rx = RxAntenna {
            params: AntennaParams {
                channel: 1,
                ..Default::default()
            },
            state: RxAntennaState::default(),
        };
        rx.begin_step(&env);
        assert_eq!(rx.state.latched_v, 3.0);
    }
}
