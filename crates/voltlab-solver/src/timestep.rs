//! Adaptive step-size control.
//!
//! The engine estimates local truncation error by comparing a full step of
//! size Δt against two half steps; the controller turns that estimate into
//! accept/reject decisions and the next Δt. Scaling follows the classic
//! half-order rule for a first-order integrator: ratio = √(tol/E).

use nalgebra::DVector;

/// Controller limits and tolerance.
#[derive(Debug, Clone, Copy)]
pub struct StepControllerConfig {
    /// Target scaled error per step.
    pub tol: f64,
    pub dt_min: f64,
    pub dt_max: f64,
}

impl Default for StepControllerConfig {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            dt_min: 1e-9,
            dt_max: 1e-2,
        }
    }
}

/// Step-size controller state.
#[derive(Debug, Clone)]
pub struct StepController {
    cfg: StepControllerConfig,
    base_dt: f64,
    dt: f64,
    rejections: u64,
    last_error: f64,
}

/// Snapshot for user display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveStatus {
    /// Current Δt relative to the configured base timestep.
    pub factor: f64,
    pub rejection_count: u64,
    pub last_error_estimate: f64,
}

impl StepController {
    pub fn new(base_dt: f64, cfg: StepControllerConfig) -> Self {
        Self {
            cfg,
            base_dt,
            dt: base_dt.clamp(cfg.dt_min, cfg.dt_max),
            rejections: 0,
            last_error: 0.0,
        }
    }

    /// The Δt to attempt next.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn tolerance(&self) -> f64 {
        self.cfg.tol
    }

    /// Reset to the base timestep, keeping configuration.
    pub fn reset(&mut self) {
        self.dt = self.base_dt.clamp(self.cfg.dt_min, self.cfg.dt_max);
        self.rejections = 0;
        self.last_error = 0.0;
    }

    /// Whether an error estimate is acceptable at the current tolerance.
    pub fn should_accept(&self, error: f64) -> bool {
        error <= self.cfg.tol || self.dt <= self.cfg.dt_min
    }

    /// Record an accepted step and grow Δt for the next one.
    pub fn accept(&mut self, error: f64) {
        self.last_error = error;
        let ratio = (self.cfg.tol / error.max(1e-20)).sqrt();
        self.dt = (self.dt * (0.9 * ratio).min(2.0)).clamp(self.cfg.dt_min, self.cfg.dt_max);
    }

    /// Record a rejected step and shrink Δt for the retry.
    pub fn reject(&mut self, error: f64) {
        self.rejections += 1;
        self.last_error = error;
        let ratio = (self.cfg.tol / error.max(1e-20)).sqrt();
        self.dt = (self.dt * (0.9 * ratio).max(0.1)).max(self.cfg.dt_min);
    }

    pub fn status(&self) -> AdaptiveStatus {
        AdaptiveStatus {
            factor: self.dt / self.base_dt,
            rejection_count: self.rejections,
            last_error_estimate: self.last_error,
        }
    }
}

/// Scaled infinity norm of the difference between the full-step and
/// half-step solutions.
pub fn error_estimate(full: &DVector<f64>, halved: &DVector<f64>) -> f64 {
    debug_assert_eq!(full.len(), halved.len());
    let mut e = 0.0_f64;
    for i in 0..full.len() {
        let scale = 1.0 + halved[i].abs();
        e = e.max((full[i] - halved[i]).abs() / scale);
    }
    e
}
