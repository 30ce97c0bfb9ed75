//! Engine-level error type.

use thiserror::Error;

/// Anything the engine API can fail with.
///
/// Circuit errors are rejected at the API boundary without mutating the
/// circuit; solver errors are first handled by the step retry policy and
/// only surface here once the engine has paused.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Circuit(#[from] voltlab_core::Error),

    #[error(transparent)]
    Solver(#[from] voltlab_solver::Error),

    /// An analysis run was cancelled between trials.
    #[error("analysis cancelled")]
    Cancelled,

    /// Netlist (de)serialisation failed.
    #[error("persistence error: {0}")]
    Persist(String),
}

pub type Result<T> = std::result::Result<T, Error>;
