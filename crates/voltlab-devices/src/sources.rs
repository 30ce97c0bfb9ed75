//! Independent sources: voltage, current, battery.
//!
//! Voltage sources own one extra MNA variable (their branch current) and
//! stamp the standard ±1 incidence pattern with the waveform value on the
//! RHS. The waveform's amplitude and frequency may be modulated by sweep
//! descriptors; swept frequency goes through a phase accumulator so the
//! output stays continuous while the frequency moves.

use serde::{Deserialize, Serialize};
use voltlab_core::{sweep_value, MnaSystem, SweepConfig};

use crate::ctx::{positive, CommitCtx, DeviceEvent, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;
use crate::waveform::Waveform;

// ────────────────────── Voltage source ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageSourceParams {
    pub waveform: Waveform,
    /// Optional sweep applied to the waveform amplitude.
    pub amplitude_sweep: Option<SweepConfig>,
    /// Optional sweep applied to the waveform frequency.
    pub frequency_sweep: Option<SweepConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoltageSourceState {
    /// Accumulated cycle count while the frequency is swept.
    pub cycles: f64,
    /// Commit time of the accumulator.
    pub last_t: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageSource {
    pub params: VoltageSourceParams,
    pub state: VoltageSourceState,
}

impl VoltageSource {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            params: VoltageSourceParams {
                waveform,
                amplitude_sweep: None,
                frequency_sweep: None,
            },
            state: VoltageSourceState::default(),
        }
    }

    pub fn dc(volts: f64) -> Self {
        Self::new(Waveform::dc(volts))
    }

    fn swept_amplitude(&self, t: f64) -> Option<f64> {
        let sweep = self.params.amplitude_sweep.as_ref()?;
        if !sweep.enabled {
            return None;
        }
        let base = self.params.waveform.base_amplitude().unwrap_or(0.0);
        Some(sweep_value(sweep, base, t))
    }

    fn swept_frequency(&self, t: f64) -> Option<f64> {
        let sweep = self.params.frequency_sweep.as_ref()?;
        if !sweep.enabled {
            return None;
        }
        let base = self.params.waveform.base_frequency().unwrap_or(0.0);
        Some(sweep_value(sweep, base, t))
    }

    /// Source voltage for the step ending at `t`.
    pub fn voltage_at(&self, t: f64) -> f64 {
        let amp = self.swept_amplitude(t);
        let cycles = self
            .swept_frequency(t)
            .map(|f| self.state.cycles + f * (t - self.state.last_t));
        self.params.waveform.value_mod(t, amp, cycles)
    }
}

impl DeviceModel for VoltageSource {
    fn kind_name(&self) -> &'static str {
        "voltage_source"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(0, -2), (0, 2)]
    }

    fn extra_vars(&self) -> usize {
        1
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let br = ctx.extra.expect("voltage source owns one extra row");
        if let Some(p) = ctx.node(0) {
            mna.stamp(p, br, 1.0);
            mna.stamp(br, p, 1.0);
        }
        if let Some(n) = ctx.node(1) {
            mna.stamp(n, br, -1.0);
            mna.stamp(br, n, -1.0);
        }
        mna.stamp_rhs(br, self.voltage_at(ctx.time));
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        if let Some(f) = self.swept_frequency(ctx.time) {
            self.state.cycles += f * (ctx.time - self.state.last_t);
        }
        self.state.last_t = ctx.time;
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(0))
    }

    fn reset_state(&mut self) {
        self.state = VoltageSourceState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        set_waveform_field(&mut self.params.waveform, field, value)
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        get_waveform_field(&self.params.waveform, field)
    }
}

// ────────────────────── Current source ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSourceParams {
    pub waveform: Waveform,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentSourceState {
    pub i_last: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSource {
    pub params: CurrentSourceParams,
    pub state: CurrentSourceState,
}

impl CurrentSource {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            params: CurrentSourceParams { waveform },
            state: CurrentSourceState::default(),
        }
    }

    pub fn dc(amps: f64) -> Self {
        Self::new(Waveform::dc(amps))
    }
}

impl DeviceModel for CurrentSource {
    fn kind_name(&self) -> &'static str {
        "current_source"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(0, -2), (0, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        // Positive waveform pushes current out of terminal 0.
        let i = self.params.waveform.value(ctx.time);
        mna.stamp_current_source(ctx.node(1), ctx.node(0), i);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        self.state.i_last = self.params.waveform.value(ctx.time);
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.i_last)
    }

    fn reset_state(&mut self) {
        self.state = CurrentSourceState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        set_waveform_field(&mut self.params.waveform, field, value)
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        get_waveform_field(&self.params.waveform, field)
    }
}

// ────────────────────── Battery ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryParams {
    pub v_nominal: f64,
    /// Charge capacity in coulombs.
    pub capacity: f64,
    pub internal_resistance: f64,
    pub v_cutoff: f64,
    /// Ideal batteries omit the series resistance and never age.
    pub ideal: bool,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            v_nominal: 9.0,
            capacity: 1800.0,
            internal_resistance: 0.5,
            v_cutoff: 6.5,
            ideal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Charge drawn so far, coulombs.
    pub used: f64,
    pub discharged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub params: BatteryParams,
    pub state: BatteryState,
}

impl Battery {
    pub fn new(v_nominal: f64) -> Self {
        Self {
            params: BatteryParams {
                v_nominal,
                ..Default::default()
            },
            state: BatteryState::default(),
        }
    }

    pub fn soc(&self) -> f64 {
        (1.0 - self.state.used / self.params.capacity).clamp(0.0, 1.0)
    }

    /// Open-circuit voltage at the current state of charge.
    pub fn open_circuit_voltage(&self) -> f64 {
        if self.state.discharged {
            0.0
        } else {
            self.params.v_nominal * (0.85 + 0.15 * self.soc())
        }
    }
}

impl DeviceModel for Battery {
    fn kind_name(&self) -> &'static str {
        "battery"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(0, -2), (0, 2)]
    }

    fn extra_vars(&self) -> usize {
        1
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let br = ctx.extra.expect("battery owns one extra row");
        if let Some(p) = ctx.node(0) {
            mna.stamp(p, br, 1.0);
            mna.stamp(br, p, 1.0);
        }
        if let Some(n) = ctx.node(1) {
            mna.stamp(n, br, -1.0);
            mna.stamp(br, n, -1.0);
        }
        if self.state.discharged {
            // A dead cell looks like a high-impedance branch at 0 V.
            mna.stamp(br, br, -1e6);
            return;
        }
        if !self.params.ideal {
            mna.stamp(br, br, -self.params.internal_resistance);
        }
        mna.stamp_rhs(br, self.open_circuit_voltage());
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        if self.params.ideal || self.state.discharged {
            return;
        }
        let i = ctx.extra_value(0);
        self.state.used += i.abs() * ctx.dt;
        if self.open_circuit_voltage() < self.params.v_cutoff {
            self.state.discharged = true;
            ctx.events.push(DeviceEvent::BatteryDischarged);
        }
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(0))
    }

    fn reset_state(&mut self) {
        self.state = BatteryState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "v_nominal" => self.params.v_nominal = positive(value, "v_nominal")?,
            "capacity" => self.params.capacity = positive(value, "capacity")?,
            "internal_resistance" => {
                self.params.internal_resistance = positive(value, "internal_resistance")?
            }
            "v_cutoff" => self.params.v_cutoff = positive(value, "v_cutoff")?,
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "v_nominal" => Some(self.params.v_nominal),
            "capacity" => Some(self.params.capacity),
            "internal_resistance" => Some(self.params.internal_resistance),
            "v_cutoff" => Some(self.params.v_cutoff),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}

/// Shared by-name parameter access for waveform-driven sources.
fn set_waveform_field(wf: &mut Waveform, field: &str, value: f64) -> Result<(), FieldError> {
    match (wf, field) {
        (Waveform::Dc { value: v }, "value" | "amplitude") => *v = value,
        (
            Waveform::Sine { amplitude, .. }
            | Waveform::Square { amplitude, .. }
            | Waveform::Triangle { amplitude, .. }
            | Waveform::Sawtooth { amplitude, .. }
            | Waveform::Expression { amplitude, .. }
            | Waveform::Noise { amplitude, .. },
            "amplitude",
        ) => *amplitude = value,
        (
            Waveform::Sine { offset, .. }
            | Waveform::Square { offset, .. }
            | Waveform::Triangle { offset, .. }
            | Waveform::Sawtooth { offset, .. }
            | Waveform::Expression { offset, .. },
            "offset",
        ) => *offset = value,
        (
            Waveform::Sine { phase_deg, .. }
            | Waveform::Square { phase_deg, .. }
            | Waveform::Triangle { phase_deg, .. }
            | Waveform::Sawtooth { phase_deg, .. },
            "phase",
        ) => *phase_deg = value,
        (Waveform::Clock { duty, .. } | Waveform::Pwm { duty, .. }, "duty") => {
            if !(0.0..=1.0).contains(&value) {
                return Err(FieldError::OutOfRange {
                    reason: "duty must lie in [0, 1]".into(),
                });
            }
            *duty = value;
        }
        (
            Waveform::Clock { v_low, .. } | Waveform::Pwm { v_low, .. } | Waveform::Pulse { v_low, .. },
            "v_low",
        ) => *v_low = value,
        (
            Waveform::Clock { v_high, .. }
            | Waveform::Pwm { v_high, .. }
            | Waveform::Pulse { v_high, .. },
            "v_high",
        ) => *v_high = value,
        (Waveform::Pulse { delay, .. }, "delay") => *delay = value.max(0.0),
        (Waveform::Pulse { width, .. }, "width") => *width = positive(value, "width")?,
        (Waveform::Pulse { period, .. }, "period") => *period = value.max(0.0),
        (Waveform::Expression { noise, .. }, "noise") => *noise = value.abs(),
        (wf, "frequency") => {
            let f = positive(value, "frequency")?;
            if wf.base_frequency().is_none() {
                return Err(FieldError::Unknown);
            }
            wf.set_frequency(f);
        }
        _ => return Err(FieldError::Unknown),
    }
    Ok(())
}

fn get_waveform_field(wf: &Waveform, field: &str) -> Option<f64> {
    match (wf, field) {
        (Waveform::Dc { value }, "value" | "amplitude") => Some(*value),
        (_, "amplitude") => wf.base_amplitude(),
        (_, "frequency") => wf.base_frequency(),
        (
            Waveform::Sine { offset, .. }
            | Waveform::Square { offset, .. }
            | Waveform::Triangle { offset, .. }
            | Waveform::Sawtooth { offset, .. }
            | Waveform::Expression { offset, .. },
            "offset",
        ) => Some(*offset),
        (Waveform::Clock { duty, .. } | Waveform::Pwm { duty, .. }, "duty") => Some(*duty),
        _ => None,
    }
}
