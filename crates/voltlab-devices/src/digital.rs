//! Behavioural digital devices: logic gates, flip-flops, the BCD decoder
//! and the 555 timer.
//!
//! These are not structural transistor models. Inputs are thresholded
//! from the previous committed solution, the Boolean result is latched at
//! commit, and outputs drive their node as a Thevenin source through
//! `r_out`. The one-step input lag this produces is the documented
//! behaviour of the engine.

use serde::{Deserialize, Serialize};
use voltlab_core::{MnaSystem, GMIN};

use crate::ctx::{positive, CommitCtx, FieldError, StampCtx};
use crate::device::DeviceModel;

/// Segment patterns for digits 0-15 (a..g in bits 0..6), hex A-F as
/// letters.
const SEVEN_SEG_TABLE: [u8; 16] = [
    0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F, 0x77, 0x7C, 0x39, 0x5E, 0x79, 0x71,
];

fn drive_output(mna: &mut MnaSystem, node: Option<usize>, volts: f64, r_out: f64) {
    let g = 1.0 / r_out;
    mna.stamp_conductance(node, None, g);
    mna.stamp_current_source(None, node, g * volts);
}

// ────────────────────── Logic levels ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicParams {
    pub v_high: f64,
    pub v_low: f64,
    pub threshold: f64,
    pub r_out: f64,
}

impl Default for LogicParams {
    fn default() -> Self {
        Self {
            v_high: 5.0,
            v_low: 0.0,
            threshold: 2.5,
            r_out: 100.0,
        }
    }
}

impl LogicParams {
    fn level(&self, bit: bool) -> f64 {
        if bit {
            self.v_high
        } else {
            self.v_low
        }
    }
}

// ────────────────────── Gates ──────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    Buffer,
    Not,
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
    /// Buffer with an enable input; high-Z while disabled.
    TriState,
}

impl GateKind {
    pub fn input_count(&self) -> usize {
        match self {
            GateKind::Buffer | GateKind::Not => 1,
            _ => 2,
        }
    }

    fn eval(&self, a: bool, b: bool) -> bool {
        match self {
            GateKind::Buffer | GateKind::TriState => a,
            GateKind::Not => !a,
            GateKind::And => a && b,
            GateKind::Or => a || b,
            GateKind::Nand => !(a && b),
            GateKind::Nor => !(a || b),
            GateKind::Xor => a ^ b,
            GateKind::Xnor => !(a ^ b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateParams {
    pub kind: GateKind,
    pub logic: LogicParams,
    /// Schmitt-trigger inputs with hysteresis.
    pub schmitt: bool,
    pub schmitt_high: f64,
    pub schmitt_low: f64,
}

impl GateParams {
    pub fn new(kind: GateKind) -> Self {
        Self {
            kind,
            logic: LogicParams::default(),
            schmitt: false,
            schmitt_high: 3.0,
            schmitt_low: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    pub out: bool,
    /// Per-input Schmitt latches.
    pub in_bits: [bool; 2],
    /// Enable latch for tri-state.
    pub enabled: bool,
}

/// Terminals: unary `[in, out]`; binary `[a, b, out]`;
/// tri-state `[in, enable, out]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub params: GateParams,
    pub state: GateState,
}

impl Gate {
    pub fn new(kind: GateKind) -> Self {
        Self {
            params: GateParams::new(kind),
            state: GateState::default(),
        }
    }

    fn out_terminal(&self) -> usize {
        match self.params.kind {
            GateKind::Buffer | GateKind::Not => 1,
            _ => 2,
        }
    }

    fn sample(&self, v: f64, prev: bool) -> bool {
        if self.params.schmitt {
            if v > self.params.schmitt_high {
                true
            } else if v < self.params.schmitt_low {
                false
            } else {
                prev
            }
        } else {
            v > self.params.logic.threshold
        }
    }
}

impl DeviceModel for Gate {
    fn kind_name(&self) -> &'static str {
        match self.params.kind {
            GateKind::Buffer => "gate_buffer",
            GateKind::Not => "gate_not",
            GateKind::And => "gate_and",
            GateKind::Or => "gate_or",
            GateKind::Nand => "gate_nand",
            GateKind::Nor => "gate_nor",
            GateKind::Xor => "gate_xor",
            GateKind::Xnor => "gate_xnor",
            GateKind::TriState => "gate_tristate",
        }
    }

    fn terminal_count(&self) -> usize {
        match self.params.kind {
            GateKind::Buffer | GateKind::Not => 2,
            _ => 3,
        }
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        match self.params.kind {
            GateKind::Buffer | GateKind::Not => vec![(-2, 0), (2, 0)],
            GateKind::TriState => vec![(-2, 0), (0, -2), (2, 0)],
            _ => vec![(-2, -1), (-2, 1), (2, 0)],
        }
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        if self.params.kind == GateKind::TriState && !self.state.enabled {
            // High-Z: leave only a leakage path so the node is defined.
            mna.stamp_conductance(ctx.node(self.out_terminal()), None, GMIN);
            return;
        }
        let v = self.params.logic.level(self.state.out);
        drive_output(mna, ctx.node(self.out_terminal()), v, self.params.logic.r_out);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let a = self.sample(ctx.v(0), self.state.in_bits[0]);
        self.state.in_bits[0] = a;
        let b = if self.params.kind.input_count() == 2 && self.params.kind != GateKind::TriState {
            let b = self.sample(ctx.v(1), self.state.in_bits[1]);
            self.state.in_bits[1] = b;
            b
        } else {
            false
        };
        if self.params.kind == GateKind::TriState {
            self.state.enabled = ctx.v(1) > self.params.logic.threshold;
        }
        self.state.out = self.params.kind.eval(a, b);
    }

    fn reset_state(&mut self) {
        self.state = GateState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "v_high" => self.params.logic.v_high = value,
            "v_low" => self.params.logic.v_low = value,
            "threshold" => self.params.logic.threshold = value,
            "r_out" => self.params.logic.r_out = positive(value, "r_out")?,
            "schmitt" => self.params.schmitt = value != 0.0,
            "schmitt_high" => self.params.schmitt_high = value,
            "schmitt_low" => self.params.schmitt_low = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "v_high" => Some(self.params.logic.v_high),
            "v_low" => Some(self.params.logic.v_low),
            "threshold" => Some(self.params.logic.threshold),
            "r_out" => Some(self.params.logic.r_out),
            "schmitt" => Some(self.params.schmitt as u8 as f64),
            "schmitt_high" => Some(self.params.schmitt_high),
            "schmitt_low" => Some(self.params.schmitt_low),
            _ => None,
        }
    }
}

// ────────────────────── Flip-flops and latches ──────────────────────

/// D flip-flop. Terminals: `[d, clk, q, q̄]`. The bit updates on a rising
/// clock edge detected between commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DFlipFlop {
    pub logic: LogicParams,
    pub state: FlipFlopState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlipFlopState {
    pub bit: bool,
    pub clk_prev: bool,
}

impl Default for DFlipFlop {
    fn default() -> Self {
        Self {
            logic: LogicParams::default(),
            state: FlipFlopState::default(),
        }
    }
}

impl DeviceModel for DFlipFlop {
    fn kind_name(&self) -> &'static str {
        "d_flip_flop"
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, -1), (-2, 1), (2, -1), (2, 1)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        drive_output(mna, ctx.node(2), self.logic.level(self.state.bit), self.logic.r_out);
        drive_output(mna, ctx.node(3), self.logic.level(!self.state.bit), self.logic.r_out);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let clk = ctx.v(1) > self.logic.threshold;
        if clk && !self.state.clk_prev {
            self.state.bit = ctx.v(0) > self.logic.threshold;
        }
        self.state.clk_prev = clk;
    }

    fn reset_state(&mut self) {
        self.state = FlipFlopState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_out" => self.logic.r_out = positive(value, "r_out")?,
            "threshold" => self.logic.threshold = value,
            "v_high" => self.logic.v_high = value,
            "v_low" => self.logic.v_low = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_out" => Some(self.logic.r_out),
            "threshold" => Some(self.logic.threshold),
            "v_high" => Some(self.logic.v_high),
            "v_low" => Some(self.logic.v_low),
            _ => None,
        }
    }
}

/// Set-reset latch. Terminals: `[s, r, q, q̄]`. Set wins when both inputs
/// are asserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrLatch {
    pub logic: LogicParams,
    pub state: FlipFlopState,
}

impl Default for SrLatch {
    fn default() -> Self {
        Self {
            logic: LogicParams::default(),
            state: FlipFlopState::default(),
        }
    }
}

impl DeviceModel for SrLatch {
    fn kind_name(&self) -> &'static str {
        "sr_latch"
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, -1), (-2, 1), (2, -1), (2, 1)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        drive_output(mna, ctx.node(2), self.logic.level(self.state.bit), self.logic.r_out);
        drive_output(mna, ctx.node(3), self.logic.level(!self.state.bit), self.logic.r_out);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let s = ctx.v(0) > self.logic.threshold;
        let r = ctx.v(1) > self.logic.threshold;
        if s {
            self.state.bit = true;
        } else if r {
            self.state.bit = false;
        }
    }

    fn reset_state(&mut self) {
        self.state = FlipFlopState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_out" => self.logic.r_out = positive(value, "r_out")?,
            "threshold" => self.logic.threshold = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_out" => Some(self.logic.r_out),
            "threshold" => Some(self.logic.threshold),
            _ => None,
        }
    }
}

// ────────────────────── BCD to 7-segment decoder ──────────────────────

/// Terminals: `[b1, b2, b4, b8, a, b, c, d, e, f, g]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bcd7Seg {
    pub logic: LogicParams,
    pub active_low: bool,
    pub state: Bcd7SegState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bcd7SegState {
    /// Latched segment pattern, a..g in bits 0..6.
    pub segments: u8,
}

impl Default for Bcd7Seg {
    fn default() -> Self {
        Self {
            logic: LogicParams::default(),
            active_low: false,
            state: Bcd7SegState::default(),
        }
    }
}

impl DeviceModel for Bcd7Seg {
    fn kind_name(&self) -> &'static str {
        "bcd_7seg_decoder"
    }

    fn terminal_count(&self) -> usize {
        11
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        let mut offs: Vec<(i32, i32)> = (0..4).map(|i| (-2, i * 2 - 3)).collect();
        offs.extend((0..7).map(|i| (2, i - 3)));
        offs
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        for seg in 0..7 {
            let mut bit = self.state.segments >> seg & 1 == 1;
            if self.active_low {
                bit = !bit;
            }
            drive_output(mna, ctx.node(4 + seg), self.logic.level(bit), self.logic.r_out);
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let mut value = 0usize;
        for bit in 0..4 {
            if ctx.v(bit) > self.logic.threshold {
                value |= 1 << bit;
            }
        }
        self.state.segments = SEVEN_SEG_TABLE[value];
    }

    fn reset_state(&mut self) {
        self.state = Bcd7SegState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "active_low" => self.active_low = value != 0.0,
            "r_out" => self.logic.r_out = positive(value, "r_out")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "active_low" => Some(self.active_low as u8 as f64),
            "r_out" => Some(self.logic.r_out),
            _ => None,
        }
    }
}

// ────────────────────── 555 timer ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer555Params {
    pub r_out: f64,
    /// On-resistance of the discharge transistor.
    pub r_discharge: f64,
}

impl Default for Timer555Params {
    fn default() -> Self {
        Self {
            r_out: 10.0,
            r_discharge: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timer555State {
    /// Internal RS latch: true drives the output high.
    pub flip: bool,
    /// Supply rails latched at the last commit; the output stage drives
    /// relative to these.
    pub vcc_prev: f64,
    pub gnd_prev: f64,
}

/// Bipolar 555 in its behavioural form. Terminals:
/// `[vcc, gnd, trigger, threshold, discharge, out]`.
///
/// The comparators sample the previous committed solution, so the latch
/// switches one step after a crossing. This matches the original engine's
/// behaviour and is what the astable timing tests assume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timer555 {
    pub params: Timer555Params,
    pub state: Timer555State,
}

impl DeviceModel for Timer555 {
    fn kind_name(&self) -> &'static str {
        "timer_555"
    }

    fn terminal_count(&self) -> usize {
        6
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // vcc, gnd, trigger, threshold, discharge, out
        vec![(0, -2), (0, 2), (-2, 1), (-2, -1), (-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let span = (self.state.vcc_prev - self.state.gnd_prev).max(0.0);
        let v_out = if self.state.flip {
            self.state.gnd_prev + (span - 0.1).max(0.0)
        } else {
            self.state.gnd_prev + 0.05
        };
        drive_output(mna, ctx.node(5), v_out, self.params.r_out);

        // Discharge transistor shorts pin 7 to ground while the output is
        // low.
        let g_dis = if self.state.flip {
            GMIN
        } else {
            1.0 / self.params.r_discharge
        };
        mna.stamp_conductance(ctx.node(4), ctx.node(1), g_dis);

        // The internal divider loads the supply slightly.
        mna.stamp_conductance(ctx.node(0), ctx.node(1), 1.0 / 15e3);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let vcc = ctx.v(0);
        let gnd = ctx.v(1);
        let span = vcc - gnd;
        let v_trig = ctx.v(2) - gnd;
        let v_thr = ctx.v(3) - gnd;

        // Trigger dominates, as in the real part.
        if v_trig < span / 3.0 {
            self.state.flip = true;
        } else if v_thr > 2.0 * span / 3.0 {
            self.state.flip = false;
        }
        self.state.vcc_prev = vcc;
        self.state.gnd_prev = gnd;
    }

    fn reset_state(&mut self) {
        self.state = Timer555State::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_out" => self.params.r_out = positive(value, "r_out")?,
            "r_discharge" => self.params.r_discharge = positive(value, "r_discharge")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_out" => Some(self.params.r_out),
            "r_discharge" => Some(self.params.r_discharge),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use voltlab_core::Environment;

    fn commit_device<D: DeviceModel>(dev: &mut D, voltages: &[f64]) {
        let mut env = Environment::default();
        let mut events = Vec::new();
        let x = DVector::from_vec(voltages.to_vec());
        let nodes: Vec<Option<usize>> = (0..voltages.len()).map(Some).collect();
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: None,
            dt: 1e-6,
            time: 1e-6,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        dev.commit(&mut ctx);
    }

    #[test]
    fn test_gate_truth_tables() {
        for (kind, a, b, expect) in [
            (GateKind::And, 5.0, 5.0, true),
            (GateKind::And, 5.0, 0.0, false),
            (GateKind::Nand, 5.0, 5.0, false),
            (GateKind::Or, 0.0, 5.0, true),
            (GateKind::Nor, 0.0, 0.0, true),
            (GateKind::Xor, 5.0, 5.0, false),
            (GateKind::Xor, 5.0, 0.0, true),
            (GateKind::Xnor, 0.0, 0.0, true),
        ] {
            let mut g = Gate::new(kind);
            commit_device(&mut g, &[a, b, 0.0]);
            assert_eq!(g.state.out, expect, "{kind:?}({a}, {b})");
        }
    }

    #[test]
    fn test_not_gate() {
        let mut g = Gate::new(GateKind::Not);
        commit_device(&mut g, &[0.0, 0.0]);
        assert!(g.state.out);
        commit_device(&mut g, &[5.0, 0.0]);
        assert!(!g.state.out);
    }

    #[test]
    fn test_schmitt_hysteresis() {
        let mut g = Gate::new(GateKind::Buffer);
        g.params.schmitt = true;
        // Rising through the dead band keeps the previous state.
        commit_device(&mut g, &[2.5, 0.0]);
        assert!(!g.state.out);
        commit_device(&mut g, &[3.5, 0.0]);
        assert!(g.state.out);
        // Falling back into the dead band holds high.
        commit_device(&mut g, &[2.5, 0.0]);
        assert!(g.state.out);
        commit_device(&mut g, &[1.5, 0.0]);
        assert!(!g.state.out);
    }

    #[test]
    fn test_dff_rising_edge_only() {
        let mut ff = DFlipFlop::default();
        // d high while clock low: nothing.
        commit_device(&mut ff, &[5.0, 0.0, 0.0, 0.0]);
        assert!(!ff.state.bit);
        // Rising edge captures d.
        commit_device(&mut ff, &[5.0, 5.0, 0.0, 0.0]);
        assert!(ff.state.bit);
        // d falls while clock stays high: bit holds.
        commit_device(&mut ff, &[0.0, 5.0, 0.0, 0.0]);
        assert!(ff.state.bit);
        // Falling edge: holds. Next rising edge captures low.
        commit_device(&mut ff, &[0.0, 0.0, 0.0, 0.0]);
        assert!(ff.state.bit);
        commit_device(&mut ff, &[0.0, 5.0, 0.0, 0.0]);
        assert!(!ff.state.bit);
    }

    #[test]
    fn test_sr_latch_set_priority() {
        let mut sr = SrLatch::default();
        commit_device(&mut sr, &[5.0, 0.0, 0.0, 0.0]);
        assert!(sr.state.bit);
        commit_device(&mut sr, &[0.0, 5.0, 0.0, 0.0]);
        assert!(!sr.state.bit);
        commit_device(&mut sr, &[5.0, 5.0, 0.0, 0.0]);
        assert!(sr.state.bit);
    }

    #[test]
    fn test_bcd_decoder_digits() {
        let mut dec = Bcd7Seg::default();
        // Digit 8 lights every segment.
        commit_device(&mut dec, &[0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(dec.state.segments, 0x7F);
        // Digit 1: segments b and c.
        commit_device(&mut dec, &[5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(dec.state.segments, 0x06);
    }

    #[test]
    fn test_555_latch_transitions() {
        let mut t = Timer555::default();
        // vcc=5, trigger below vcc/3 sets.
        commit_device(&mut t, &[5.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(t.state.flip);
        // Mid band: holds.
        commit_device(&mut t, &[5.0, 0.0, 2.5, 2.5, 0.0, 0.0]);
        assert!(t.state.flip);
        // Threshold above 2·vcc/3 clears.
        commit_device(&mut t, &[5.0, 0.0, 4.0, 4.0, 0.0, 0.0]);
        assert!(!t.state.flip);
    }
}
