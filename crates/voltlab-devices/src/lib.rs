//! Device models and MNA stamps for Voltlab.
//!
//! Every device kind the playground knows is a variant of the closed
//! [`Device`] sum type. Each variant owns its parameter record and its
//! dynamic state; stamping and commit are dispatched by match. State is
//! written only at step commit, never mid-Newton.
//!
//! The library covers:
//! - Linear passives: R, C, L, potentiometer, photoresistor, thermistor, fuse
//! - Sources: V/I with time-varying waveforms, battery
//! - Nonlinear junction devices: the diode family, BJT, MOSFET, JFET
//! - Analog blocks: op-amp, OTA, controlled sources, thyristors
//! - Switches, relays, behavioural digital gates, flip-flops, the 555
//! - Transformers, displays, DC motor, abstract RF antennas
//! - Hierarchical sub-circuits

pub mod bjt;
pub mod controlled;
pub mod ctx;
pub mod device;
pub mod digital;
pub mod diode;
pub mod display;
pub mod jfet;
pub mod mosfet;
pub mod motor;
pub mod opamp;
pub mod passive;
pub mod sources;
pub mod subcircuit;
pub mod switches;
pub mod thyristor;
pub mod transformer;
pub mod waveform;
pub mod wireless;

pub use bjt::BjtPolarity;
pub use ctx::{CommitCtx, DeviceEvent, FieldError, ReadCtx, StampCtx};
pub use device::Device;
pub use digital::GateKind;
pub use diode::DiodeKind;
pub use jfet::JfetPolarity;
pub use mosfet::MosPolarity;
pub use subcircuit::{DefId, SubcircuitDef, SubcircuitLibrary, SubcircuitPin};
pub use switches::SwitchKind;
pub use waveform::Waveform;
