//! The Voltlab simulation engine.
//!
//! This crate owns the circuit graph (components, wires, probes), the
//! topology rebuild that turns it into an MNA layout, the transient
//! stepping driver with its failure policy and adaptive mode, and the
//! analyses built on top of transient runs (Bode, Monte-Carlo, parameter
//! sweeps, spectra). The UI, renderer and persistence layers are
//! consumers of this API.

pub mod analysis;
pub mod circuit;
pub mod engine;
pub mod error;
pub mod persist;

pub use analysis::{
    run_bode, run_monte_carlo, run_sweep, BodePoint, CancelToken, MonteCarloStats, SweepPoint,
};
pub use circuit::{Circuit, Component, ComponentId, Endpoint, Probe, ProbeId, Wire, WireId};
pub use engine::{Engine, EventRecord, SimState};
pub use error::{Error, Result};
