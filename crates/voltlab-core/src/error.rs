//! Error types for circuit representation and editing.

use thiserror::Error;

/// Errors raised at the circuit/editing boundary.
///
/// Numeric solver failures live in `voltlab-solver`; these cover topology
/// and parameter validation, which are rejected without mutating the
/// circuit.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The netlist cannot be turned into a solvable system.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A parameter edit would violate a model invariant.
    #[error("parameter {field} out of range ({value}): {reason}")]
    ParameterOutOfRange {
        field: String,
        value: f64,
        reason: String,
    },

    /// Referenced node id does not exist in the current topology.
    #[error("unknown node {0}")]
    UnknownNode(u32),

    /// Referenced component id does not exist.
    #[error("unknown component {0}")]
    UnknownComponent(u64),

    /// Referenced wire id does not exist.
    #[error("unknown wire {0}")]
    UnknownWire(u64),

    /// Referenced probe id does not exist.
    #[error("unknown probe {0}")]
    UnknownProbe(u64),

    /// Unknown parameter field name for the component kind.
    #[error("component {component} has no parameter field `{field}`")]
    UnknownField { component: u64, field: String },
}

pub type Result<T> = std::result::Result<T, Error>;
