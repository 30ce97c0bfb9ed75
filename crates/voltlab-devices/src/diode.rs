//! The Shockley diode family: silicon, Schottky, zener, LED, photodiode,
//! varactor, tunnel.
//!
//! All variants share the same linearised companion around the Newton
//! guess; they differ in parameters and post-processing (breakdown branch,
//! photocurrent, glow tracking).

use serde::{Deserialize, Serialize};
use voltlab_core::{Environment, MnaSystem};

use crate::ctx::{positive, CommitCtx, DeviceEvent, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;
use crate::passive::G_OFF;

/// Linearisation of `I = Is·(exp(V/nVt) − 1)` around `v`.
///
/// The voltage is clamped to `[-5·nVt, 40·nVt]` so the exponential can
/// never overflow during a wild Newton excursion.
pub(crate) struct JunctionStamp {
    pub g: f64,
    /// Constant term: total current is `g·v + ieq`.
    pub ieq: f64,
    pub i: f64,
}

pub(crate) fn linearize_junction(v: f64, is: f64, n_vt: f64) -> JunctionStamp {
    let v = v.clamp(-5.0 * n_vt, 40.0 * n_vt);
    let e = (v / n_vt).exp();
    let i = is * (e - 1.0);
    let g = is / n_vt * e;
    JunctionStamp { g, ieq: i - g * v, i }
}

/// Junction current at a solved voltage: exponential inside the clamp
/// window, linear extrapolation beyond it. This matches the companion the
/// solver stamped, so committed currents agree with the MNA solution.
pub(crate) fn junction_current(v: f64, is: f64, n_vt: f64) -> f64 {
    let j = linearize_junction(v, is, n_vt);
    j.g * v + j.ieq
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiodeKind {
    Silicon,
    Schottky,
    Zener,
    Led,
    Photodiode,
    Varactor,
    Tunnel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiodeParams {
    pub kind: DiodeKind,
    /// Saturation current.
    pub is: f64,
    /// Emission coefficient.
    pub n: f64,
    /// Reverse breakdown voltage (zener voltage for zeners); 0 disables.
    pub breakdown_v: f64,
    /// Continuous current rating; LEDs fail past twice this.
    pub i_max: f64,
    /// Full-scale photocurrent at light = 1 (photodiode only).
    pub i_light: f64,
    /// Ideal diodes skip the reverse-breakdown branch.
    pub ideal: bool,
}

impl DiodeParams {
    pub fn for_kind(kind: DiodeKind) -> Self {
        match kind {
            DiodeKind::Silicon => Self {
                kind,
                is: 1e-12,
                n: 1.0,
                breakdown_v: 100.0,
                i_max: 1.0,
                i_light: 0.0,
                ideal: true,
            },
            DiodeKind::Schottky => Self {
                kind,
                is: 1e-8,
                n: 1.05,
                breakdown_v: 40.0,
                i_max: 1.0,
                i_light: 0.0,
                ideal: true,
            },
            DiodeKind::Zener => Self {
                kind,
                is: 1e-12,
                n: 1.0,
                breakdown_v: 5.1,
                i_max: 0.5,
                i_light: 0.0,
                ideal: false,
            },
            DiodeKind::Led => Self {
                kind,
                is: 1e-20,
                n: 2.0,
                breakdown_v: 5.0,
                i_max: 0.02,
                i_light: 0.0,
                ideal: true,
            },
            DiodeKind::Photodiode => Self {
                kind,
                is: 1e-12,
                n: 1.0,
                breakdown_v: 30.0,
                i_max: 0.05,
                i_light: 50e-6,
                ideal: true,
            },
            DiodeKind::Varactor => Self {
                kind,
                is: 1e-12,
                n: 1.1,
                breakdown_v: 30.0,
                i_max: 0.1,
                i_light: 0.0,
                ideal: true,
            },
            DiodeKind::Tunnel => Self {
                kind,
                is: 1e-9,
                n: 1.1,
                breakdown_v: 10.0,
                i_max: 0.1,
                i_light: 0.0,
                ideal: true,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiodeState {
    pub v_prev: f64,
    /// Diode current of the last committed step (glow source for LEDs).
    pub current: f64,
    pub power: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diode {
    pub params: DiodeParams,
    pub state: DiodeState,
}

impl Diode {
    pub fn new(kind: DiodeKind) -> Self {
        Self {
            params: DiodeParams::for_kind(kind),
            state: DiodeState::default(),
        }
    }

    fn breakdown_active(&self, v: f64) -> bool {
        let vbr = self.params.breakdown_v;
        let enabled = self.params.kind == DiodeKind::Zener || !self.params.ideal;
        enabled && vbr > 0.0 && v < -vbr
    }

    /// Total device current (anode → cathode) at a solved voltage.
    fn current_at(&self, v: f64, env: &Environment) -> f64 {
        let n_vt = self.params.n * env.thermal_voltage();
        let mut i = junction_current(v, self.params.is, n_vt);
        if self.breakdown_active(v) {
            i += v + self.params.breakdown_v;
        }
        if self.params.kind == DiodeKind::Photodiode {
            i -= self.params.i_light * env.light;
        }
        i
    }

    /// Normalised brightness in [0, 1] for LED rendering.
    pub fn glow(&self) -> f64 {
        if self.state.failed {
            0.0
        } else {
            (self.state.current / self.params.i_max).clamp(0.0, 1.0)
        }
    }
}

impl DeviceModel for Diode {
    fn kind_name(&self) -> &'static str {
        match self.params.kind {
            DiodeKind::Silicon => "diode",
            DiodeKind::Schottky => "schottky",
            DiodeKind::Zener => "zener",
            DiodeKind::Led => "led",
            DiodeKind::Photodiode => "photodiode",
            DiodeKind::Varactor => "varactor",
            DiodeKind::Tunnel => "tunnel_diode",
        }
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let (a, k) = (ctx.node(0), ctx.node(1));
        if self.state.failed {
            mna.stamp_conductance(a, k, G_OFF);
            return;
        }

        let v = ctx.v_diff(0, 1);
        let n_vt = self.params.n * ctx.env.thermal_voltage();
        let j = linearize_junction(v, self.params.is, n_vt);

        mna.stamp_conductance(a, k, j.g);
        mna.stamp_current_source(a, k, j.ieq);

        if self.breakdown_active(v) {
            // Unit conductance pinning the device near -V_br.
            mna.stamp_conductance(a, k, 1.0);
            mna.stamp_current_source(a, k, self.params.breakdown_v);
        }

        if self.params.kind == DiodeKind::Photodiode {
            // Light-generated current flows cathode → anode.
            mna.stamp_current_source(a, k, -self.params.i_light * ctx.env.light);
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        if self.state.failed {
            self.state.current = 0.0;
            self.state.power = 0.0;
            return;
        }
        let v = ctx.v_diff(0, 1);
        let i = self.current_at(v, ctx.env);
        self.state.v_prev = v;
        self.state.current = i;
        self.state.power = (v * i).abs();

        if self.params.kind == DiodeKind::Led && i > 2.0 * self.params.i_max {
            self.state.failed = true;
            ctx.events.push(DeviceEvent::LedBurnedOut);
        }
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.current)
    }

    fn dissipated_power(&self) -> f64 {
        self.state.power
    }

    fn reset_state(&mut self) {
        self.state = DiodeState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "is" => self.params.is = positive(value, "is")?,
            "n" => self.params.n = positive(value, "n")?,
            "breakdown_v" => self.params.breakdown_v = value.max(0.0),
            "i_max" => self.params.i_max = positive(value, "i_max")?,
            "i_light" => self.params.i_light = value.max(0.0),
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "is" => Some(self.params.is),
            "n" => Some(self.params.n),
            "breakdown_v" => Some(self.params.breakdown_v),
            "i_max" => Some(self.params.i_max),
            "i_light" => Some(self.params.i_light),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}
