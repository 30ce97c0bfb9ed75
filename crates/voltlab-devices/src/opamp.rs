//! Operational amplifier and operational transconductance amplifier.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;

const TERM_INP: usize = 0;
const TERM_INN: usize = 1;
const TERM_OUT: usize = 2;

/// Op-amp as a VCVS with one extra variable for the output branch.
///
/// The real variant adds differential input resistance, output resistance
/// in the branch equation, and rail saturation latched from the previous
/// step's output, which keeps each step linear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpAmpParams {
    pub gain: f64,
    pub r_in: f64,
    pub r_out: f64,
    pub v_neg: f64,
    pub v_pos: f64,
    pub ideal: bool,
}

impl Default for OpAmpParams {
    fn default() -> Self {
        Self {
            gain: 1e5,
            r_in: 1e6,
            r_out: 75.0,
            v_neg: -15.0,
            v_pos: 15.0,
            ideal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpAmpState {
    /// Output voltage at the last commit, drives the saturation latch.
    pub last_output: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpAmp {
    pub params: OpAmpParams,
    pub state: OpAmpState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpAmpRegion {
    Linear,
    ClampHigh,
    ClampLow,
}

impl OpAmp {
    fn region(&self) -> OpAmpRegion {
        if self.params.ideal {
            return OpAmpRegion::Linear;
        }
        if self.state.last_output >= 0.99 * self.params.v_pos {
            OpAmpRegion::ClampHigh
        } else if self.state.last_output <= 0.99 * self.params.v_neg {
            OpAmpRegion::ClampLow
        } else {
            OpAmpRegion::Linear
        }
    }
}

impl DeviceModel for OpAmp {
    fn kind_name(&self) -> &'static str {
        "opamp"
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // in+, in-, out
        vec![(-2, -1), (-2, 1), (3, 0)]
    }

    fn extra_vars(&self) -> usize {
        1
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let br = ctx.extra.expect("opamp owns one extra row");
        let out = ctx.node(TERM_OUT);

        // Output branch current enters the output node.
        if let Some(o) = out {
            mna.stamp(o, br, 1.0);
            mna.stamp(br, o, 1.0);
        }

        match self.region() {
            OpAmpRegion::Linear => {
                // V_out − A·(V+ − V−) − R_out·I = 0
                if let Some(p) = ctx.node(TERM_INP) {
                    mna.stamp(br, p, -self.params.gain);
                }
                if let Some(n) = ctx.node(TERM_INN) {
                    mna.stamp(br, n, self.params.gain);
                }
                if !self.params.ideal {
                    mna.stamp(br, br, -self.params.r_out);
                }
            }
            OpAmpRegion::ClampHigh => mna.stamp_rhs(br, self.params.v_pos),
            OpAmpRegion::ClampLow => mna.stamp_rhs(br, self.params.v_neg),
        }

        if !self.params.ideal {
            mna.stamp_conductance(
                ctx.node(TERM_INP),
                ctx.node(TERM_INN),
                1.0 / self.params.r_in,
            );
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let out = ctx.v(TERM_OUT);
        // Leave a clamp only once the input demands it; otherwise the
        // latch would stick at the rail forever.
        let demanded = self.params.gain * ctx.v_diff(TERM_INP, TERM_INN);
        self.state.last_output = match self.region() {
            OpAmpRegion::ClampHigh if demanded < self.params.v_pos => demanded.max(self.params.v_neg),
            OpAmpRegion::ClampLow if demanded > self.params.v_neg => demanded.min(self.params.v_pos),
            _ => out.clamp(self.params.v_neg, self.params.v_pos),
        };
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(0))
    }

    fn reset_state(&mut self) {
        self.state = OpAmpState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "gain" => self.params.gain = positive(value, "gain")?,
            "r_in" => self.params.r_in = positive(value, "r_in")?,
            "r_out" => self.params.r_out = positive(value, "r_out")?,
            "v_neg" => self.params.v_neg = value,
            "v_pos" => self.params.v_pos = value,
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "gain" => Some(self.params.gain),
            "r_in" => Some(self.params.r_in),
            "r_out" => Some(self.params.r_out),
            "v_neg" => Some(self.params.v_neg),
            "v_pos" => Some(self.params.v_pos),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}

/// Operational transconductance amplifier: a VCCS from the input pair
/// into the output node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtaParams {
    pub gm: f64,
}

impl Default for OtaParams {
    fn default() -> Self {
        Self { gm: 1e-3 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ota {
    pub params: OtaParams,
}

impl DeviceModel for Ota {
    fn kind_name(&self) -> &'static str {
        "ota"
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, -1), (-2, 1), (3, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        // I_out = gm · (V+ − V−), sourced into the output node.
        let gm = self.params.gm;
        if let Some(o) = ctx.node(TERM_OUT) {
            if let Some(p) = ctx.node(TERM_INP) {
                mna.stamp(o, p, -gm);
            }
            if let Some(n) = ctx.node(TERM_INN) {
                mna.stamp(o, n, gm);
            }
        }
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "gm" => self.params.gm = positive(value, "gm")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "gm" => Some(self.params.gm),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use voltlab_core::Environment;

    #[test]
    fn test_ideal_branch_equation() {
        let amp = OpAmp::default();
        let mut mna = MnaSystem::new(3, 1);
        let env = Environment::default();
        let x = DVector::zeros(4);
        let nodes = [Some(0), Some(1), Some(2)];
        let ctx = StampCtx {
            nodes: &nodes,
            extra: Some(3),
            dt: 1e-6,
            time: 0.0,
            x_prev: &x,
            env: &env,
        };
        amp.stamp(&mut mna, &ctx);
        let a = mna.to_dense_matrix();
        assert_eq!(a[(2, 3)], 1.0);
        assert_eq!(a[(3, 2)], 1.0);
        assert_eq!(a[(3, 0)], -1e5);
        assert_eq!(a[(3, 1)], 1e5);
    }

    #[test]
    fn test_saturation_latch() {
        let mut amp = OpAmp {
            params: OpAmpParams {
                ideal: false,
                ..Default::default()
            },
            state: OpAmpState { last_output: 14.9 },
        };
        assert_eq!(amp.region(), OpAmpRegion::ClampHigh);

        // When the differential input backs off, the clamp releases.
        let mut env = Environment::default();
        let mut events = Vec::new();
        let x = DVector::from_vec(vec![1e-5, 2e-5, 15.0, 0.0]); // v+ < v-
        let nodes = [Some(0), Some(1), Some(2)];
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: Some(3),
            dt: 1e-6,
            time: 1e-6,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        amp.commit(&mut ctx);
        assert!(amp.state.last_output < 0.99 * 15.0);
        assert_eq!(amp.region(), OpAmpRegion::Linear);
    }

    #[test]
    fn test_ota_vccs_pattern() {
        let ota = Ota::default();
        let mut mna = MnaSystem::new(3, 0);
        let env = Environment::default();
        let x = DVector::zeros(3);
        let nodes = [Some(0), Some(1), Some(2)];
        let ctx = StampCtx {
            nodes: &nodes,
            extra: None,
            dt: 1e-6,
            time: 0.0,
            x_prev: &x,
            env: &env,
        };
        ota.stamp(&mut mna, &ctx);
        let a = mna.to_dense_matrix();
        assert!((a[(2, 0)] + 1e-3).abs() < 1e-15);
        assert!((a[(2, 1)] - 1e-3).abs() < 1e-15);
    }
}
