//! Hierarchical sub-circuits.
//!
//! A definition is a saved mini-circuit with labelled pin nodes; an
//! instance owns private copies of the internal devices (so state is
//! per-instance) and maps internal nodes onto the parent's matrix through
//! a remap table built at stamp time: pins share rows with the parent's
//! terminal nodes, remaining internal nodes live in the instance's extra
//! rows. Nesting is depth-limited and checked when a definition is added.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use voltlab_core::error::{Error, Result as CoreResult};
use voltlab_core::{Environment, MnaSystem, GMIN};

use crate::ctx::{CommitCtx, FieldError, StampCtx};
use crate::device::{Device, DeviceModel};

pub type DefId = u64;

/// Maximum nesting depth of sub-circuit definitions.
pub const MAX_DEPTH: usize = 8;

/// A labelled pin exposing one internal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcircuitPin {
    pub name: String,
    /// Internal node id the pin exposes (never 0: ground is global).
    pub node: u32,
}

/// A reusable mini-circuit. Internal node ids run 1..=num_nodes with 0
/// meaning the global ground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcircuitDef {
    pub name: String,
    /// Internal devices with their terminal → internal-node wiring.
    pub devices: Vec<(Device, Vec<u32>)>,
    pub pins: Vec<SubcircuitPin>,
    pub num_nodes: u32,
}

impl SubcircuitDef {
    fn is_pin(&self, node: u32) -> bool {
        self.pins.iter().any(|p| p.node == node)
    }

    /// Internal nodes that need rows of their own.
    fn hidden_nodes(&self) -> Vec<u32> {
        (1..=self.num_nodes).filter(|&n| !self.is_pin(n)).collect()
    }
}

/// Registry of definitions, keyed by id in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubcircuitLibrary {
    defs: IndexMap<DefId, Arc<SubcircuitDef>>,
    next_id: DefId,
}

impl SubcircuitLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, validating wiring, pins, and nesting.
    pub fn define(&mut self, def: SubcircuitDef) -> CoreResult<DefId> {
        for pin in &def.pins {
            if pin.node == 0 || pin.node > def.num_nodes {
                return Err(Error::InvalidTopology(format!(
                    "pin `{}` references node {} outside 1..={}",
                    pin.name, pin.node, def.num_nodes
                )));
            }
        }
        for (device, wiring) in &def.devices {
            if wiring.len() != device.terminal_count() {
                return Err(Error::InvalidTopology(format!(
                    "{} wired with {} terminals, expected {}",
                    device.kind_name(),
                    wiring.len(),
                    device.terminal_count()
                )));
            }
            if wiring.iter().any(|&n| n > def.num_nodes) {
                return Err(Error::InvalidTopology(format!(
                    "{} wired to a node outside the definition",
                    device.kind_name()
                )));
            }
        }

        let depth = self.nesting_depth(&def.devices)?;
        if depth >= MAX_DEPTH {
            return Err(Error::InvalidTopology(format!(
                "sub-circuit `{}` nests {} levels deep (limit {})",
                def.name, depth, MAX_DEPTH
            )));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.defs.insert(id, Arc::new(def));
        Ok(id)
    }

    pub fn get(&self, id: DefId) -> Option<&Arc<SubcircuitDef>> {
        self.defs.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefId, &Arc<SubcircuitDef>)> {
        self.defs.iter().map(|(&id, def)| (id, def))
    }

    /// Depth of the deepest instance chain under `devices`. Unknown
    /// definition references are topology errors, which also rules out
    /// cycles: a definition can only reference ids registered before it.
    fn nesting_depth(&self, devices: &[(Device, Vec<u32>)]) -> CoreResult<usize> {
        let mut depth = 0;
        for (device, _) in devices {
            if let Device::Subcircuit(inst) = device {
                let def = self.get(inst.def_id).ok_or_else(|| {
                    Error::InvalidTopology(format!("unknown sub-circuit definition {}", inst.def_id))
                })?;
                depth = depth.max(1 + self.nesting_depth(&def.devices)?);
            }
        }
        Ok(depth)
    }
}

/// One placed instance of a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcircuitInstance {
    pub def_id: DefId,
    /// Private copies of the internal devices, so each instance keeps its
    /// own dynamic state.
    pub devices: Vec<Device>,
    wiring: Vec<Vec<u32>>,
    pins: Vec<SubcircuitPin>,
    hidden: Vec<u32>,
    num_nodes: u32,
}

impl SubcircuitInstance {
    pub fn instantiate(lib: &SubcircuitLibrary, def_id: DefId) -> CoreResult<Self> {
        let def = lib
            .get(def_id)
            .ok_or_else(|| Error::InvalidTopology(format!("unknown sub-circuit definition {def_id}")))?;
        Ok(Self {
            def_id,
            devices: def.devices.iter().map(|(d, _)| d.clone()).collect(),
            wiring: def.devices.iter().map(|(_, w)| w.clone()).collect(),
            pins: def.pins.clone(),
            hidden: def.hidden_nodes(),
            num_nodes: def.num_nodes,
        })
    }

    /// Matrix row for each internal node id, given this instance's
    /// terminal rows and extra base row.
    fn build_remap(&self, ctx_nodes: &[Option<usize>], extra_base: usize) -> Vec<Option<usize>> {
        let mut remap: Vec<Option<usize>> = vec![None; self.num_nodes as usize + 1];
        for (terminal, pin) in self.pins.iter().enumerate() {
            remap[pin.node as usize] = ctx_nodes[terminal];
        }
        for (k, &node) in self.hidden.iter().enumerate() {
            remap[node as usize] = Some(extra_base + k);
        }
        remap
    }

    /// Per-device extra row base, after the hidden-node rows.
    fn device_extra_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.devices.len());
        let mut next = self.hidden.len();
        for device in &self.devices {
            offsets.push(next);
            next += device.extra_vars();
        }
        offsets
    }
}

impl DeviceModel for SubcircuitInstance {
    fn kind_name(&self) -> &'static str {
        "subcircuit"
    }

    fn terminal_count(&self) -> usize {
        self.pins.len()
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // Pins down the left edge, overflowing to the right edge.
        let half = self.pins.len().div_ceil(2) as i32;
        (0..self.pins.len() as i32)
            .map(|i| {
                if i < half {
                    (-2, 2 * i - half)
                } else {
                    (2, 2 * (i - half) - half)
                }
            })
            .collect()
    }

    fn extra_vars(&self) -> usize {
        self.hidden.len() + self.devices.iter().map(|d| d.extra_vars()).sum::<usize>()
    }

    fn nonlinear(&self) -> bool {
        self.devices.iter().any(|d| d.nonlinear())
    }

    fn begin_step(&mut self, env: &Environment) {
        for device in &mut self.devices {
            device.begin_step(env);
        }
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let base = ctx.extra.expect("subcircuit owns its internal rows");
        let remap = self.build_remap(ctx.nodes, base);
        let offsets = self.device_extra_offsets();

        // Hidden internal nodes get the same singularity pad as top-level
        // nodes.
        for k in 0..self.hidden.len() {
            mna.stamp(base + k, base + k, GMIN);
        }

        for (idx, device) in self.devices.iter().enumerate() {
            let nodes: Vec<Option<usize>> = self.wiring[idx]
                .iter()
                .map(|&n| remap[n as usize])
                .collect();
            let extra = (device.extra_vars() > 0).then(|| base + offsets[idx]);
            let child = StampCtx {
                nodes: &nodes,
                extra,
                dt: ctx.dt,
                time: ctx.time,
                x_prev: ctx.x_prev,
                env: ctx.env,
            };
            device.stamp(mna, &child);
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let base = ctx.extra.expect("subcircuit owns its internal rows");
        let remap = self.build_remap(ctx.nodes, base);
        let offsets = self.device_extra_offsets();

        for (idx, device) in self.devices.iter_mut().enumerate() {
            let nodes: Vec<Option<usize>> = self.wiring[idx]
                .iter()
                .map(|&n| remap[n as usize])
                .collect();
            let extra = (device.extra_vars() > 0).then(|| base + offsets[idx]);
            let mut child = CommitCtx {
                nodes: &nodes,
                extra,
                dt: ctx.dt,
                time: ctx.time,
                x: ctx.x,
                env: &mut *ctx.env,
                events: &mut *ctx.events,
            };
            device.commit(&mut child);
        }
    }

    fn dissipated_power(&self) -> f64 {
        self.devices.iter().map(|d| d.dissipated_power()).sum()
    }

    fn reset_state(&mut self) {
        for device in &mut self.devices {
            device.reset_state();
        }
    }

    fn perturb(&mut self, factor: f64) {
        for device in &mut self.devices {
            device.perturb(factor);
        }
    }

    fn set_field(&mut self, _field: &str, _value: f64) -> Result<(), FieldError> {
        Err(FieldError::Unknown)
    }
}
