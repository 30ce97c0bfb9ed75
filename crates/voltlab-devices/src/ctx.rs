//! Contexts handed to device stamps and commits.

use nalgebra::DVector;
use voltlab_core::Environment;

/// Read-only view a device gets while stamping.
///
/// `x_prev` is the current Newton linearisation point (the committed
/// solution on the first iteration). `nodes` holds the matrix row of each
/// terminal in terminal order, `None` for ground.
pub struct StampCtx<'a> {
    pub nodes: &'a [Option<usize>],
    /// First extra-variable row owned by this device, if any.
    pub extra: Option<usize>,
    pub dt: f64,
    /// Time at the end of the step being assembled.
    pub time: f64,
    pub x_prev: &'a DVector<f64>,
    pub env: &'a Environment,
}

impl StampCtx<'_> {
    pub fn node(&self, terminal: usize) -> Option<usize> {
        self.nodes[terminal]
    }

    /// Linearisation-point voltage at a terminal (0 for ground).
    pub fn v(&self, terminal: usize) -> f64 {
        self.nodes[terminal].map(|i| self.x_prev[i]).unwrap_or(0.0)
    }

    /// Linearisation-point voltage between two terminals.
    pub fn v_diff(&self, a: usize, b: usize) -> f64 {
        self.v(a) - self.v(b)
    }
}

/// View a device gets when a converged step commits.
pub struct CommitCtx<'a> {
    pub nodes: &'a [Option<usize>],
    pub extra: Option<usize>,
    pub dt: f64,
    /// Time at the end of the committed step.
    pub time: f64,
    pub x: &'a DVector<f64>,
    pub env: &'a mut Environment,
    /// Device-state events raised by this commit (engine tags them with
    /// the component id).
    pub events: &'a mut Vec<DeviceEvent>,
}

impl CommitCtx<'_> {
    pub fn v(&self, terminal: usize) -> f64 {
        self.nodes[terminal].map(|i| self.x[i]).unwrap_or(0.0)
    }

    pub fn v_diff(&self, a: usize, b: usize) -> f64 {
        self.v(a) - self.v(b)
    }

    /// Solved value of the device's `offset`-th extra variable.
    pub fn extra_value(&self, offset: usize) -> f64 {
        match self.extra {
            Some(base) => self.x[base + offset],
            None => 0.0,
        }
    }
}

/// Read-only view for observation queries after a step.
pub struct ReadCtx<'a> {
    pub nodes: &'a [Option<usize>],
    pub extra: Option<usize>,
    pub x: &'a DVector<f64>,
}

impl ReadCtx<'_> {
    pub fn v(&self, terminal: usize) -> f64 {
        self.nodes[terminal].map(|i| self.x[i]).unwrap_or(0.0)
    }

    pub fn v_diff(&self, a: usize, b: usize) -> f64 {
        self.v(a) - self.v(b)
    }

    pub fn extra_value(&self, offset: usize) -> f64 {
        match self.extra {
            Some(base) => self.x[base + offset],
            None => 0.0,
        }
    }
}

/// Physical-device damage events.
///
/// These are state transitions, not solver failures: they are appended to
/// the engine's event log and never halt the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceEvent {
    FuseBlown,
    ResistorBurned,
    ElectrolyticOvervoltage,
    LedBurnedOut,
    /// One segment of a bar/matrix display burned out.
    SegmentBurnedOut { segment: usize },
    BatteryDischarged,
}

/// Outcome of a by-name parameter edit on a device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The device kind has no field with this name.
    #[error("unknown field")]
    Unknown,
    /// The value violates a model invariant; the device is unchanged.
    #[error("{reason}")]
    OutOfRange { reason: String },
}

/// Stamp a linearised multi-terminal current model.
///
/// `jac[r][c]` is the derivative of the current into terminal `r` with
/// respect to the voltage at terminal `c`, and `i0[r]` the current at the
/// linearisation point (the ctx guess). The RHS gets the usual Newton
/// constant `J·v_guess − i0` so that the converged solution satisfies the
/// nonlinear KCL.
pub(crate) fn stamp_linearized<const N: usize>(
    mna: &mut voltlab_core::MnaSystem,
    ctx: &StampCtx,
    terminals: &[usize; N],
    jac: &[[f64; N]; N],
    i0: &[f64; N],
) {
    for r in 0..N {
        let Some(row) = ctx.node(terminals[r]) else {
            continue;
        };
        let mut rhs = -i0[r];
        for c in 0..N {
            rhs += jac[r][c] * ctx.v(terminals[c]);
            if let Some(col) = ctx.node(terminals[c]) {
                mna.stamp(row, col, jac[r][c]);
            }
        }
        mna.stamp_rhs(row, rhs);
    }
}

/// Validate that a field value is strictly positive.
pub(crate) fn positive(value: f64, what: &str) -> Result<f64, FieldError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(FieldError::OutOfRange {
            reason: format!("{what} must be positive"),
        })
    }
}

/// Validate that a field value lies in `[0, 1]`.
pub(crate) fn unit_range(value: f64, what: &str) -> Result<f64, FieldError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(FieldError::OutOfRange {
            reason: format!("{what} must lie in [0, 1]"),
        })
    }
}
