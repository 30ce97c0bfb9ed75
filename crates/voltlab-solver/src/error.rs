//! Solver error types.

use thiserror::Error;

/// Numeric failures of one simulation step.
///
/// These are recovered locally by the engine's step-size reduction policy;
/// persistent failures pause the engine with the error surfaced in its
/// last-error slot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// LU factorisation hit a pivot below tolerance.
    #[error("singular system: matrix is not invertible")]
    SingularSystem,

    /// Matrix/vector dimensions do not agree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Newton-Raphson exceeded its iteration cap without converging.
    #[error("newton iteration failed to converge after {iterations} iterations")]
    NewtonFailed { iterations: usize },

    /// A solution entry exceeded the physical sanity bound.
    #[error("solution diverged: |x| reached {value:.3e}")]
    Diverged { value: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;
