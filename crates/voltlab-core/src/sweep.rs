//! Time-driven parameter sweeps.
//!
//! A parameter may carry a [`SweepConfig`]; while enabled, the evaluated
//! sweep value replaces the parameter each step. Evaluation is a pure
//! function of the config and the simulation time, so swept runs stay
//! deterministic.

use serde::{Deserialize, Serialize};

/// Interpolation mode of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepMode {
    /// Linear interpolation between `start` and `end`.
    #[default]
    Linear,
    /// Interpolation in log10 space. Both endpoints must be positive.
    Log,
    /// Quantised to `num_steps` discrete levels.
    Step,
}

/// Sweep annotation attached to a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub enabled: bool,
    pub start: f64,
    pub end: f64,
    /// Time to traverse from `start` to `end`, in seconds.
    pub sweep_time: f64,
    pub mode: SweepMode,
    /// Number of discrete levels in [`SweepMode::Step`].
    pub num_steps: u32,
    pub repeat: bool,
    /// Sweep back down after reaching `end` (triangle instead of sawtooth).
    pub bidirectional: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: 0.0,
            end: 1.0,
            sweep_time: 1.0,
            mode: SweepMode::Linear,
            num_steps: 10,
            repeat: false,
            bidirectional: false,
        }
    }
}

/// Evaluate a sweep at time `t`, falling back to `base` while disabled.
///
/// Shapes:
/// - unidirectional, repeat: sawtooth with period `sweep_time`
/// - bidirectional, repeat: triangle with period `2·sweep_time`
/// - unidirectional, non-repeat: holds `end` after `sweep_time`
/// - bidirectional, non-repeat: back at `start` from `2·sweep_time` on
pub fn sweep_value(cfg: &SweepConfig, base: f64, t: f64) -> f64 {
    if !cfg.enabled {
        return base;
    }
    if cfg.sweep_time <= 0.0 {
        return value_at(cfg, 1.0);
    }

    let u = t / cfg.sweep_time;
    let f = match (cfg.repeat, cfg.bidirectional) {
        (false, false) => u.clamp(0.0, 1.0),
        (false, true) => {
            if u >= 2.0 {
                0.0
            } else if u > 1.0 {
                2.0 - u
            } else {
                u.max(0.0)
            }
        }
        (true, false) => u.rem_euclid(1.0),
        (true, true) => {
            let p = u.rem_euclid(2.0);
            if p <= 1.0 {
                p
            } else {
                2.0 - p
            }
        }
    };

    value_at(cfg, f)
}

fn value_at(cfg: &SweepConfig, f: f64) -> f64 {
    let f = match cfg.mode {
        SweepMode::Step if cfg.num_steps >= 2 => {
            let n = cfg.num_steps as f64;
            let level = (f * n).floor().min(n - 1.0);
            level / (n - 1.0)
        }
        _ => f,
    };

    match cfg.mode {
        SweepMode::Log => {
            // Endpoints validated positive at the API boundary.
            let ls = cfg.start.log10();
            let le = cfg.end.log10();
            10f64.powf(ls + (le - ls) * f)
        }
        _ => cfg.start + (cfg.end - cfg.start) * f,
    }
}
