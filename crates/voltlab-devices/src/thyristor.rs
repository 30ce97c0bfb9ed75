//! Latched conduction devices: SCR, TRIAC, DIAC.
//!
//! These are behavioural: the conduction latch is evaluated at commit
//! from the solved step, and the stamp is a plain conductance chosen by
//! the latch. Under very fast transients this gives the classic one-step
//! latency of relaxation models.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;
use crate::passive::G_OFF;

/// Gate-cathode path resistance while the junction is driven.
const R_GATE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrParams {
    /// Gate-cathode voltage that fires the device.
    pub v_gate_trigger: f64,
    pub holding_current: f64,
    pub r_on: f64,
}

impl Default for ScrParams {
    fn default() -> Self {
        Self {
            v_gate_trigger: 0.7,
            holding_current: 5e-3,
            r_on: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatchState {
    pub on: bool,
    pub current: f64,
}

/// Silicon controlled rectifier. Terminals: anode, cathode, gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scr {
    pub params: ScrParams,
    pub state: LatchState,
}

impl Scr {
    fn g_ak(&self) -> f64 {
        if self.state.on {
            1.0 / self.params.r_on
        } else {
            G_OFF
        }
    }
}

impl DeviceModel for Scr {
    fn kind_name(&self) -> &'static str {
        "scr"
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // anode, cathode, gate
        vec![(-2, 0), (2, 0), (0, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        mna.stamp_conductance(ctx.node(0), ctx.node(1), self.g_ak());
        mna.stamp_conductance(ctx.node(2), ctx.node(1), 1.0 / R_GATE);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let v_ak = ctx.v_diff(0, 1);
        let v_gk = ctx.v_diff(2, 1);
        self.state.current = v_ak * self.g_ak();

        if self.state.on {
            if self.state.current < self.params.holding_current {
                self.state.on = false;
            }
        } else if v_gk > self.params.v_gate_trigger && v_ak > 0.0 {
            self.state.on = true;
        }
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.current)
    }

    fn reset_state(&mut self) {
        self.state = LatchState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "v_gate_trigger" => self.params.v_gate_trigger = positive(value, "v_gate_trigger")?,
            "holding_current" => self.params.holding_current = positive(value, "holding_current")?,
            "r_on" => self.params.r_on = positive(value, "r_on")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "v_gate_trigger" => Some(self.params.v_gate_trigger),
            "holding_current" => Some(self.params.holding_current),
            "r_on" => Some(self.params.r_on),
            _ => None,
        }
    }
}

/// Bidirectional triode thyristor. Terminals: MT1, MT2, gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Triac {
    pub params: ScrParams,
    pub state: LatchState,
}

impl Triac {
    fn g_mt(&self) -> f64 {
        if self.state.on {
            1.0 / self.params.r_on
        } else {
            G_OFF
        }
    }
}

impl DeviceModel for Triac {
    fn kind_name(&self) -> &'static str {
        "triac"
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0), (0, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        mna.stamp_conductance(ctx.node(0), ctx.node(1), self.g_mt());
        mna.stamp_conductance(ctx.node(2), ctx.node(0), 1.0 / R_GATE);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let v = ctx.v_diff(1, 0);
        let v_g = ctx.v_diff(2, 0);
        self.state.current = v * self.g_mt();

        if self.state.on {
            if self.state.current.abs() < self.params.holding_current {
                self.state.on = false;
            }
        } else if v_g.abs() > self.params.v_gate_trigger {
            self.state.on = true;
        }
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.current)
    }

    fn reset_state(&mut self) {
        self.state = LatchState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "v_gate_trigger" => self.params.v_gate_trigger = positive(value, "v_gate_trigger")?,
            "holding_current" => self.params.holding_current = positive(value, "holding_current")?,
            "r_on" => self.params.r_on = positive(value, "r_on")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "v_gate_trigger" => Some(self.params.v_gate_trigger),
            "holding_current" => Some(self.params.holding_current),
            "r_on" => Some(self.params.r_on),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiacParams {
    pub breakover_v: f64,
    pub holding_current: f64,
    pub r_on: f64,
}

impl Default for DiacParams {
    fn default() -> Self {
        Self {
            breakover_v: 32.0,
            holding_current: 1e-3,
            r_on: 10.0,
        }
    }
}

/// Bidirectional trigger diode: conducts above breakover in either
/// direction, releases below the holding current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diac {
    pub params: DiacParams,
    pub state: LatchState,
}

impl Diac {
    fn g(&self) -> f64 {
        if self.state.on {
            1.0 / self.params.r_on
        } else {
            G_OFF
        }
    }
}

impl DeviceModel for Diac {
    fn kind_name(&self) -> &'static str {
        "diac"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        mna.stamp_conductance(ctx.node(0), ctx.node(1), self.g());
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let v = ctx.v_diff(0, 1);
        self.state.current = v * self.g();

        if self.state.on {
            if self.state.current.abs() < self.params.holding_current {
                self.state.on = false;
            }
        } else if v.abs() > self.params.breakover_v {
            self.state.on = true;
        }
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.current)
    }

    fn reset_state(&mut self) {
        self.state = LatchState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "breakover_v" => self.params.breakover_v = positive(value, "breakover_v")?,
            "holding_current" => self.params.holding_current = positive(value, "holding_current")?,
            "r_on" => self.params.r_on = positive(value, "r_on")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "breakover_v" => Some(self.params.breakover_v),
            "holding_current" => Some(self.params.holding_current),
            "r_on" => Some(self.params.r_on),
            _ => None,
        }
    }
}
