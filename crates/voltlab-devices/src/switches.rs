//! Mechanical switches, the analog switch, and the relay.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;
use crate::passive::G_OFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchKind {
    Spst,
    Spdt,
    Dpdt,
    /// Momentary contact, closed while pressed.
    PushButton,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchParams {
    pub kind: SwitchKind,
    pub r_closed: f64,
    /// Throw position: 0 selects the first throw, 1 the second.
    pub position: u8,
    /// Push-button state, editor-driven.
    pub pressed: bool,
}

impl SwitchParams {
    pub fn new(kind: SwitchKind) -> Self {
        Self {
            kind,
            r_closed: 1e-3,
            position: 0,
            pressed: false,
        }
    }
}

/// Terminals: SPST/push-button `[a, b]`; SPDT `[com, t0, t1]`;
/// DPDT `[com0, t00, t01, com1, t10, t11]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub params: SwitchParams,
}

impl Switch {
    pub fn new(kind: SwitchKind) -> Self {
        Self {
            params: SwitchParams::new(kind),
        }
    }

    fn g_closed(&self) -> f64 {
        1.0 / self.params.r_closed
    }

    /// Closed terminal pairs in the current position.
    fn contacts(&self) -> Vec<(usize, usize, bool)> {
        let sel = self.params.position != 0;
        match self.params.kind {
            SwitchKind::Spst => vec![(0, 1, !sel)],
            SwitchKind::PushButton => vec![(0, 1, self.params.pressed)],
            SwitchKind::Spdt => vec![(0, 1, !sel), (0, 2, sel)],
            SwitchKind::Dpdt => vec![
                (0, 1, !sel),
                (0, 2, sel),
                (3, 4, !sel),
                (3, 5, sel),
            ],
        }
    }
}

impl DeviceModel for Switch {
    fn kind_name(&self) -> &'static str {
        match self.params.kind {
            SwitchKind::Spst => "switch_spst",
            SwitchKind::Spdt => "switch_spdt",
            SwitchKind::Dpdt => "switch_dpdt",
            SwitchKind::PushButton => "push_button",
        }
    }

    fn terminal_count(&self) -> usize {
        match self.params.kind {
            SwitchKind::Spst | SwitchKind::PushButton => 2,
            SwitchKind::Spdt => 3,
            SwitchKind::Dpdt => 6,
        }
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        match self.params.kind {
            SwitchKind::Spst | SwitchKind::PushButton => vec![(-2, 0), (2, 0)],
            SwitchKind::Spdt => vec![(-2, 0), (2, -1), (2, 1)],
            SwitchKind::Dpdt => {
                vec![(-2, -2), (2, -3), (2, -1), (-2, 2), (2, 1), (2, 3)]
            }
        }
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        for (a, b, closed) in self.contacts() {
            let g = if closed { self.g_closed() } else { G_OFF };
            mna.stamp_conductance(ctx.node(a), ctx.node(b), g);
        }
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_closed" => self.params.r_closed = positive(value, "r_closed")?,
            "position" => self.params.position = (value != 0.0) as u8,
            "pressed" => self.params.pressed = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_closed" => Some(self.params.r_closed),
            "position" => Some(self.params.position as f64),
            "pressed" => Some(self.params.pressed as u8 as f64),
            _ => None,
        }
    }
}

// ────────────────────── Analog switch ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogSwitchParams {
    pub r_on: f64,
    pub threshold: f64,
}

impl Default for AnalogSwitchParams {
    fn default() -> Self {
        Self {
            r_on: 100.0,
            threshold: 2.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalogSwitchState {
    pub on: bool,
}

/// Voltage-controlled pass element. Terminals: a, b, control.
/// The control is sampled against ground at commit, so the switch state
/// lags the control by one step like the other behavioural devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalogSwitch {
    pub params: AnalogSwitchParams,
    pub state: AnalogSwitchState,
}

impl DeviceModel for AnalogSwitch {
    fn kind_name(&self) -> &'static str {
        "analog_switch"
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0), (0, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let g = if self.state.on {
            1.0 / self.params.r_on
        } else {
            G_OFF
        };
        mna.stamp_conductance(ctx.node(0), ctx.node(1), g);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        self.state.on = ctx.v(2) > self.params.threshold;
    }

    fn reset_state(&mut self) {
        self.state = AnalogSwitchState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_on" => self.params.r_on = positive(value, "r_on")?,
            "threshold" => self.params.threshold = value,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_on" => Some(self.params.r_on),
            "threshold" => Some(self.params.threshold),
            _ => None,
        }
    }
}

// ────────────────────── Relay ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayParams {
    pub coil_resistance: f64,
    pub coil_inductance: f64,
    /// Coil current that pulls the armature in.
    pub pickup_current: f64,
    /// Coil current below which the armature releases.
    pub dropout_current: f64,
    pub r_contact: f64,
}

impl Default for RelayParams {
    fn default() -> Self {
        Self {
            coil_resistance: 500.0,
            coil_inductance: 0.1,
            pickup_current: 10e-3,
            dropout_current: 4e-3,
            r_contact: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayState {
    pub coil_current: f64,
    pub energized: bool,
}

/// Electromechanical relay with an SPDT contact set.
///
/// Terminals: coil+, coil−, common, normally-open, normally-closed. The
/// coil is a series R-L folded into one backward-Euler companion; the
/// pick-up/drop-out hysteresis is re-evaluated after each commit from the
/// fresh coil current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    pub params: RelayParams,
    pub state: RelayState,
}

impl Relay {
    /// Series R-L companion: i = g·v + ieq with g = 1/(R + L/Δt).
    fn coil_companion(&self, dt: f64) -> (f64, f64) {
        let l_dt = self.params.coil_inductance / dt;
        let g = 1.0 / (self.params.coil_resistance + l_dt);
        let ieq = g * l_dt * self.state.coil_current;
        (g, ieq)
    }
}

impl DeviceModel for Relay {
    fn kind_name(&self) -> &'static str {
        "relay"
    }

    fn terminal_count(&self) -> usize {
        5
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // coil+, coil−, com, no, nc
        vec![(-2, -1), (-2, 1), (2, -2), (2, 0), (2, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let (g, ieq) = self.coil_companion(ctx.dt);
        mna.stamp_conductance(ctx.node(0), ctx.node(1), g);
        mna.stamp_current_source(ctx.node(0), ctx.node(1), ieq);

        let g_no = if self.state.energized {
            1.0 / self.params.r_contact
        } else {
            G_OFF
        };
        let g_nc = if self.state.energized {
            G_OFF
        } else {
            1.0 / self.params.r_contact
        };
        mna.stamp_conductance(ctx.node(2), ctx.node(3), g_no);
        mna.stamp_conductance(ctx.node(2), ctx.node(4), g_nc);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let (g, ieq) = self.coil_companion(ctx.dt);
        let i = g * ctx.v_diff(0, 1) + ieq;
        self.state.coil_current = i;

        if self.state.energized {
            if i.abs() <= self.params.dropout_current {
                self.state.energized = false;
            }
        } else if i.abs() >= self.params.pickup_current {
            self.state.energized = true;
        }
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.coil_current)
    }

    fn reset_state(&mut self) {
        self.state = RelayState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "coil_resistance" => self.params.coil_resistance = positive(value, "coil_resistance")?,
            "coil_inductance" => self.params.coil_inductance = positive(value, "coil_inductance")?,
            "pickup_current" => self.params.pickup_current = positive(value, "pickup_current")?,
            "dropout_current" => self.params.dropout_current = positive(value, "dropout_current")?,
            "r_contact" => self.params.r_contact = positive(value, "r_contact")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "coil_resistance" => Some(self.params.coil_resistance),
            "coil_inductance" => Some(self.params.coil_inductance),
            "pickup_current" => Some(self.params.pickup_current),
            "dropout_current" => Some(self.params.dropout_current),
            "r_contact" => Some(self.params.r_contact),
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
    fn test_spdt_contacts() {
        let mut sw = Switch::new(SwitchKind::Spdt);
        assert_eq!(sw.contacts(), vec![(0, 1, true), (0, 2, false)]);
        sw.params.position = 1;
        assert_eq!(sw.contacts(), vec![(0, 1, false), (0, 2, true)]);
    }

    #[test]
    fn test_push_button() {
        let mut sw = Switch::new(SwitchKind::PushButton);
        assert_eq!(sw.contacts(), vec![(0, 1, false)]);
        sw.params.pressed = true;
        assert_eq!(sw.contacts(), vec![(0, 1, true)]);
    }

    #[test]
    fn test_relay_hysteresis() {
        let mut relay = Relay::default();
        let mut env = Environment::default();
        let mut events = Vec::new();
        let nodes = [Some(0), None, Some(1), Some(2), Some(3)];

        // Drive the coil hard enough to pick up. Steady state current is
        // v / R_coil once the inductor settles.
        let mut commit = |relay: &mut Relay, v_coil: f64, env: &mut Environment| {
            let x = DVector::from_vec(vec![v_coil, 0.0, 0.0, 0.0]);
            let mut ctx = CommitCtx {
                nodes: &nodes,
                extra: None,
                dt: 1e-3,
                time: 1e-3,
                x: &x,
                env,
                events: &mut events,
            };
            relay.commit(&mut ctx);
        };

        // 12 V on a 500 Ω coil → 24 mA eventually; several steps for the
        // inductor companion to settle past pickup.
        for _ in 0..1000 {
            commit(&mut relay, 12.0, &mut env);
        }
        assert!(relay.state.energized);
        assert!((relay.state.coil_current - 24e-3).abs() < 1e-3);

        // Between dropout (4 mA) and pickup (10 mA) the armature holds.
        for _ in 0..1000 {
            commit(&mut relay, 3.0, &mut env); // 6 mA steady
        }
        assert!(relay.state.energized);

        // Below dropout the armature releases.
        for _ in 0..1000 {
            commit(&mut relay, 1.0, &mut env); // 2 mA steady
        }
        assert!(!relay.state.energized);
    }
}
