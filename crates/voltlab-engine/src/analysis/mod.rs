//! Analyses built on top of transient runs.
//!
//! Each driver clones the engine per trial, so trials are independent and
//! run in parallel through rayon without touching the live circuit.
//! Results come back in deterministic order; cancellation is checked
//! between trials, never inside a step.

pub mod bode;
pub mod monte;
pub mod spectrum;
pub mod sweep;

pub use bode::{run_bode, BodePoint};
pub use monte::{run_monte_carlo, MonteCarloStats};
pub use spectrum::{spectrum, WindowFunction};
pub use sweep::{run_sweep, SweepPoint};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag the driver can raise to stop an analysis between trials.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
