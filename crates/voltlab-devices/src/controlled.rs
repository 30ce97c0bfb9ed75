//! Linear controlled sources: VCVS, VCCS, CCVS, CCCS.
//!
//! The current-controlled pair senses its control current through a small
//! series resistor carried as an extra MNA branch, so the sensed wire is
//! just the device's first terminal pair.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;

/// Series resistance of the current-sense branch.
const R_SENSE: f64 = 1e-3;

// ────────────────────── VCVS ──────────────────────

/// Voltage-controlled voltage source: `V(out) = gain · V(ctrl)`.
///
/// Terminals: out+, out-, ctrl+, ctrl-. One extra branch variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vcvs {
    pub gain: f64,
}

impl Default for Vcvs {
    fn default() -> Self {
        Self { gain: 2.0 }
    }
}

impl DeviceModel for Vcvs {
    fn kind_name(&self) -> &'static str {
        "vcvs"
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(2, -1), (2, 1), (-2, -1), (-2, 1)]
    }

    fn extra_vars(&self) -> usize {
        1
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let br = ctx.extra.expect("vcvs owns one extra row");

        // Branch current couples to the output nodes like a voltage source.
        if let Some(i) = ctx.node(0) {
            mna.stamp(i, br, 1.0);
            mna.stamp(br, i, 1.0);
        }
        if let Some(i) = ctx.node(1) {
            mna.stamp(i, br, -1.0);
            mna.stamp(br, i, -1.0);
        }
        // Branch equation: V(out+) − V(out−) − gain·(V(ctrl+) − V(ctrl−)) = 0
        if let Some(i) = ctx.node(2) {
            mna.stamp(br, i, -self.gain);
        }
        if let Some(i) = ctx.node(3) {
            mna.stamp(br, i, self.gain);
        }
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(0))
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "gain" => self.gain = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "gain" => Some(self.gain),
            _ => None,
        }
    }
}

// ────────────────────── VCCS ──────────────────────

/// Voltage-controlled current source: `I(out+→out−) = gm · V(ctrl)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vccs {
    pub gm: f64,
}

impl Default for Vccs {
    fn default() -> Self {
        Self { gm: 1e-3 }
    }
}

impl DeviceModel for Vccs {
    fn kind_name(&self) -> &'static str {
        "vccs"
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(2, -1), (2, 1), (-2, -1), (-2, 1)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        // Current gm·V(ctrl) enters out+ and leaves out−; entering current
        // carries a negative sign on the matrix side.
        let gm = self.gm;
        let (op, on) = (ctx.node(0), ctx.node(1));
        let (cp, cn) = (ctx.node(2), ctx.node(3));
        if let Some(i) = op {
            if let Some(j) = cp {
                mna.stamp(i, j, -gm);
            }
            if let Some(j) = cn {
                mna.stamp(i, j, gm);
            }
        }
        if let Some(i) = on {
            if let Some(j) = cp {
                mna.stamp(i, j, gm);
            }
            if let Some(j) = cn {
                mna.stamp(i, j, -gm);
            }
        }
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "gm" => self.gm = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "gm" => Some(self.gm),
            _ => None,
        }
    }
}

// ────────────────────── CCVS ──────────────────────

/// Current-controlled voltage source: `V(out) = r_m · I(sense)`.
///
/// Terminals: sense+, sense-, out+, out-. Two extra branches: the sense
/// resistor current and the output source current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ccvs {
    /// Transresistance in ohms.
    pub r_m: f64,
}

impl Default for Ccvs {
    fn default() -> Self {
        Self { r_m: 100.0 }
    }
}

impl DeviceModel for Ccvs {
    fn kind_name(&self) -> &'static str {
        "ccvs"
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, -1), (-2, 1), (2, -1), (2, 1)]
    }

    fn extra_vars(&self) -> usize {
        2
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let base = ctx.extra.expect("ccvs owns two extra rows");
        let sense = base;
        let out = base + 1;

        stamp_sense_branch(mna, ctx, sense);

        // Output branch couples to the output nodes.
        if let Some(i) = ctx.node(2) {
            mna.stamp(i, out, 1.0);
            mna.stamp(out, i, 1.0);
        }
        if let Some(i) = ctx.node(3) {
            mna.stamp(i, out, -1.0);
            mna.stamp(out, i, -1.0);
        }
        // V(out+) − V(out−) − r_m·I(sense) = 0
        mna.stamp(out, sense, -self.r_m);
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(1))
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_m" => self.r_m = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_m" => Some(self.r_m),
            _ => None,
        }
    }
}

// ────────────────────── CCCS ──────────────────────

/// Current-controlled current source: `I(out+→out−) = gain · I(sense)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cccs {
    pub gain: f64,
}

impl Default for Cccs {
    fn default() -> Self {
        Self { gain: 3.0 }
    }
}

impl DeviceModel for Cccs {
    fn kind_name(&self) -> &'static str {
        "cccs"
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, -1), (-2, 1), (2, -1), (2, 1)]
    }

    fn extra_vars(&self) -> usize {
        1
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let sense = ctx.extra.expect("cccs owns one extra row");
        stamp_sense_branch(mna, ctx, sense);

        // gain·I(sense) enters out+ and leaves out−.
        if let Some(i) = ctx.node(2) {
            mna.stamp(i, sense, -self.gain);
        }
        if let Some(i) = ctx.node(3) {
            mna.stamp(i, sense, self.gain);
        }
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(self.gain * ctx.extra_value(0))
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "gain" => self.gain = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "gain" => Some(self.gain),
            _ => None,
        }
    }
}

/// Sense branch between terminals 0 and 1: a voltage source of 0 V with a
/// small series resistance, whose branch current is the control current.
fn stamp_sense_branch(mna: &mut MnaSystem, ctx: &StampCtx, br: usize) {
    if let Some(i) = ctx.node(0) {
        mna.stamp(i, br, 1.0);
        mna.stamp(br, i, 1.0);
    }
    if let Some(i) = ctx.node(1) {
        mna.stamp(i, br, -1.0);
        mna.stamp(br, i, -1.0);
    }
    mna.stamp(br, br, -R_SENSE);
}
