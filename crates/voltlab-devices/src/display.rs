//! Multi-diode display loads: 7-segment digit, LED bar, LED matrix.
//!
//! Each light element is one Shockley junction linearised around the
//! Newton guess, sharing the LED parameter set. Per-segment currents are
//! recorded at commit for rendering; bar and matrix segments accumulate
//! overcurrent damage and burn out individually.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, CommitCtx, DeviceEvent, FieldError, StampCtx};
use crate::device::DeviceModel;
use crate::diode::{junction_current, linearize_junction};
use crate::passive::G_OFF;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedElementParams {
    pub is: f64,
    pub n: f64,
    pub i_max: f64,
}

impl Default for LedElementParams {
    fn default() -> Self {
        Self {
            is: 1e-20,
            n: 2.0,
            i_max: 0.02,
        }
    }
}

impl LedElementParams {
    fn n_vt(&self, env: &voltlab_core::Environment) -> f64 {
        self.n * env.thermal_voltage()
    }
}

/// Stamp one LED junction between `anode` and `cathode` terminal indices.
fn stamp_led(
    mna: &mut MnaSystem,
    ctx: &StampCtx,
    params: &LedElementParams,
    anode: usize,
    cathode: usize,
    failed: bool,
) {
    let (a, k) = (ctx.node(anode), ctx.node(cathode));
    if failed {
        mna.stamp_conductance(a, k, G_OFF);
        return;
    }
    let v = ctx.v_diff(anode, cathode);
    let j = linearize_junction(v, params.is, params.n_vt(ctx.env));
    mna.stamp_conductance(a, k, j.g);
    mna.stamp_current_source(a, k, j.ieq);
}

// ────────────────────── 7-segment digit ──────────────────────

/// Terminals: segments a..g, decimal point, then the common pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SevenSegDisplay {
    pub led: LedElementParams,
    pub common_anode: bool,
    pub state: SevenSegState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SevenSegState {
    pub currents: [f64; 8],
}

impl Default for SevenSegDisplay {
    fn default() -> Self {
        Self {
            led: LedElementParams::default(),
            common_anode: false,
            state: SevenSegState::default(),
        }
    }
}

impl SevenSegDisplay {
    /// Brightness of one segment in [0, 1].
    pub fn glow(&self, segment: usize) -> f64 {
        (self.state.currents[segment] / self.led.i_max).clamp(0.0, 1.0)
    }

    fn pair(&self, seg: usize) -> (usize, usize) {
        // Common-cathode: segment pin is the anode.
        if self.common_anode {
            (8, seg)
        } else {
            (seg, 8)
        }
    }
}

impl DeviceModel for SevenSegDisplay {
    fn kind_name(&self) -> &'static str {
        "seven_seg_display"
    }

    fn terminal_count(&self) -> usize {
        9
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        let mut offs: Vec<(i32, i32)> = (0..8).map(|i| (-2, i - 4)).collect();
        offs.push((2, 0));
        offs
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        for seg in 0..8 {
            let (a, k) = self.pair(seg);
            stamp_led(mna, ctx, &self.led, a, k, false);
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let n_vt = self.led.n_vt(ctx.env);
        for seg in 0..8 {
            let (a, k) = self.pair(seg);
            let v = ctx.v_diff(a, k);
            self.state.currents[seg] = junction_current(v, self.led.is, n_vt);
        }
    }

    fn reset_state(&mut self) {
        self.state = SevenSegState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "i_max" => self.led.i_max = positive(value, "i_max")?,
            "common_anode" => self.common_anode = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "i_max" => Some(self.led.i_max),
            "common_anode" => Some(self.common_anode as u8 as f64),
            _ => None,
        }
    }
}

// ────────────────────── LED bar ──────────────────────

/// Eight parallel LEDs with one common cathode. Terminals: anodes 0..8,
/// common.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedBar {
    pub led: LedElementParams,
    pub state: LedBarState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedBarState {
    pub currents: [f64; 8],
    pub damage: [f64; 8],
    pub failed: [bool; 8],
}

impl Default for LedBar {
    fn default() -> Self {
        Self {
            led: LedElementParams::default(),
            state: LedBarState::default(),
        }
    }
}

impl DeviceModel for LedBar {
    fn kind_name(&self) -> &'static str {
        "led_bar"
    }

    fn terminal_count(&self) -> usize {
        9
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        let mut offs: Vec<(i32, i32)> = (0..8).map(|i| (-2, i - 4)).collect();
        offs.push((2, 0));
        offs
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        for seg in 0..8 {
            stamp_led(mna, ctx, &self.led, seg, 8, self.state.failed[seg]);
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let n_vt = self.led.n_vt(ctx.env);
        for seg in 0..8 {
            if self.state.failed[seg] {
                self.state.currents[seg] = 0.0;
                continue;
            }
            let i = junction_current(ctx.v_diff(seg, 8), self.led.is, n_vt);
            self.state.currents[seg] = i;

            // Sustained overcurrent cooks the segment.
            if i > self.led.i_max {
                self.state.damage[seg] += (i / self.led.i_max - 1.0) * ctx.dt;
                if self.state.damage[seg] >= 0.1 {
                    self.state.failed[seg] = true;
                    ctx.events.push(DeviceEvent::SegmentBurnedOut { segment: seg });
                }
            }
        }
    }

    fn reset_state(&mut self) {
        self.state = LedBarState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "i_max" => self.led.i_max = positive(value, "i_max")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "i_max" => Some(self.led.i_max),
            _ => None,
        }
    }
}

// ────────────────────── LED matrix ──────────────────────

/// 8×8 LED matrix: diode from row r to column c at index `8·r + c`.
/// Terminals: rows 0..8, then columns 8..16.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedMatrix {
    pub led: LedElementParams,
    pub state: LedMatrixState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedMatrixState {
    #[serde(with = "serde_big_array64")]
    pub currents: [f64; 64],
}

impl Default for LedMatrixState {
    fn default() -> Self {
        Self { currents: [0.0; 64] }
    }
}

// serde does not derive for [T; 64]; a tiny shim keeps the wire format a
// plain array.
mod serde_big_array64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &[f64; 64], s: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[f64; 64], D::Error> {
        let vec = Vec::<f64>::deserialize(d)?;
        let mut out = [0.0; 64];
        for (i, x) in vec.into_iter().take(64).enumerate() {
            out[i] = x;
        }
        Ok(out)
    }
}

impl Default for LedMatrix {
    fn default() -> Self {
        Self {
            led: LedElementParams::default(),
            state: LedMatrixState::default(),
        }
    }
}

impl DeviceModel for LedMatrix {
    fn kind_name(&self) -> &'static str {
        "led_matrix"
    }

    fn terminal_count(&self) -> usize {
        16
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        let mut offs: Vec<(i32, i32)> = (0..8).map(|i| (-2, i - 4)).collect();
        offs.extend((0..8).map(|i| (i - 4, -6)));
        offs
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        for row in 0..8 {
            for col in 0..8 {
                stamp_led(mna, ctx, &self.led, row, 8 + col, false);
            }
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let n_vt = self.led.n_vt(ctx.env);
        for row in 0..8 {
            for col in 0..8 {
                let v = ctx.v_diff(row, 8 + col);
                self.state.currents[8 * row + col] = junction_current(v, self.led.is, n_vt);
            }
        }
    }

    fn reset_state(&mut self) {
        self.state = LedMatrixState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "i_max" => self.led.i_max = positive(value, "i_max")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "i_max" => Some(self.led.i_max),
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
    fn test_led_bar_segment_burns_out() {
        let mut bar = LedBar::default();
        let mut env = Environment::default();
        let mut events = Vec::new();
        // Segment 0 driven far above i_max, others dark.
        let mut volts = vec![0.0; 9];
        volts[0] = 3.2;
        let x = DVector::from_vec(volts);
        let nodes: Vec<Option<usize>> = (0..9).map(Some).collect();

        for _ in 0..2000 {
            let mut ctx = CommitCtx {
                nodes: &nodes,
                extra: None,
                dt: 1e-3,
                time: 1e-3,
                x: &x,
                env: &mut env,
                events: &mut events,
            };
            bar.commit(&mut ctx);
            if bar.state.failed[0] {
                break;
            }
        }
        assert!(bar.state.failed[0]);
        assert!(!bar.state.failed[1]);
        assert_eq!(events, vec![DeviceEvent::SegmentBurnedOut { segment: 0 }]);
    }

    #[test]
    fn test_seven_seg_polarity() {
        let cc = SevenSegDisplay::default();
        assert_eq!(cc.pair(3), (3, 8));
        let ca = SevenSegDisplay {
            common_anode: true,
            ..Default::default()
        };
        assert_eq!(ca.pair(3), (8, 3));
    }

    #[test]
    fn test_matrix_indexing() {
        let mut m = LedMatrix::default();
        let mut env = Environment::default();
        let mut events = Vec::new();
        // Row 2 high, column 5 grounded: LED (2,5) lights.
        let mut volts = vec![0.0; 16];
        volts[2] = 2.2;
        for c in 0..8 {
            if c != 5 {
                volts[8 + c] = 2.2;
            }
        }
        let x = DVector::from_vec(volts);
        let nodes: Vec<Option<usize>> = (0..16).map(Some).collect();
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: None,
            dt: 1e-6,
            time: 1e-6,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        m.commit(&mut ctx);
        assert!(m.state.currents[8 * 2 + 5] > 1e-3);
        assert!(m.state.currents[8 * 2 + 4].abs() < 1e-6);
    }
}
