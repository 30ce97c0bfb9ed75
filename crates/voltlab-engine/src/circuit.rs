//! The circuit graph and its topology rebuild.
//!
//! Components and wires live on an integer grid. Whenever the structure
//! changes, [`Circuit::rebuild_topology`] runs union-find over coincident
//! connection points and wire links, forces grounded classes to node 0,
//! renumbers the surviving classes densely, and assigns each
//! extra-variable owner its offset in component order — so the matrix
//! layout is a pure function of the topology.

use indexmap::IndexMap;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use voltlab_core::error::{Error as CircuitError, Result as CircuitResult};
use voltlab_core::{Environment, MnaSystem, NodeId, UnionFind, GMIN};
use voltlab_devices::ctx::StampCtx;
use voltlab_devices::{Device, SubcircuitLibrary};
use voltlab_solver::AssembleSystem;

pub type ComponentId = u64;
pub type WireId = u64;
pub type ProbeId = u64;

/// Thermal mirror kept on every instance for observation; damage and
/// failure latches live in the device states themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalState {
    pub temperature_c: f64,
    pub power: f64,
}

/// A placed device instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub device: Device,
    pub x: i32,
    pub y: i32,
    /// Rotation in degrees, always a multiple of 90.
    pub rotation: u16,
    /// Node of each terminal, assigned by the last rebuild.
    pub nodes: Vec<NodeId>,
    /// Offset into the extra-variable section, when the device owns any.
    pub extra_index: Option<usize>,
    pub thermal: ThermalState,
}

impl Component {
    /// World-space position of one terminal.
    pub fn terminal_position(&self, terminal: usize) -> (i32, i32) {
        let (dx, dy) = self.device.terminal_offsets()[terminal];
        let (rx, ry) = match self.rotation % 360 {
            90 => (-dy, dx),
            180 => (-dx, -dy),
            270 => (dy, -dx),
            _ => (dx, dy),
        };
        (self.x + rx, self.y + ry)
    }

    /// Matrix row of each terminal, `None` for ground.
    pub fn node_rows(&self) -> Vec<Option<usize>> {
        self.nodes.iter().map(|n| n.matrix_index()).collect()
    }
}

/// A wire endpoint: either a component terminal or a bare grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    Terminal { component: ComponentId, terminal: usize },
    Grid { x: i32, y: i32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    pub id: WireId,
    pub a: Endpoint,
    pub b: Endpoint,
}

/// An observer anchored to a node. The anchor terminal re-derives the
/// node id across rebuilds; a probe whose anchor disappears is orphaned
/// and deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    pub id: ProbeId,
    pub node: NodeId,
    pub channel: usize,
    pub color: u32,
    pub(crate) anchor: Option<(ComponentId, usize)>,
}

/// Matrix layout derived from the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Non-ground node count (dense ids 1..=num_nodes).
    pub num_nodes: usize,
    pub num_extras: usize,
}

impl Topology {
    pub fn size(&self) -> usize {
        self.num_nodes + self.num_extras
    }
}

/// The aggregate the engine simulates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    pub components: IndexMap<ComponentId, Component>,
    pub wires: IndexMap<WireId, Wire>,
    pub probes: IndexMap<ProbeId, Probe>,
    pub library: SubcircuitLibrary,
    next_id: u64,
    topology: Option<Topology>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Current layout, if a rebuild has run since the last mutation.
    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn invalidate_topology(&mut self) {
        self.topology = None;
    }

    // ────────────────────── editing ──────────────────────

    pub fn add_component(&mut self, device: Device, x: i32, y: i32) -> ComponentId {
        let id = self.fresh_id();
        let terminals = device.terminal_count();
        self.components.insert(
            id,
            Component {
                id,
                device,
                x,
                y,
                rotation: 0,
                nodes: vec![NodeId::GROUND; terminals],
                extra_index: None,
                thermal: ThermalState::default(),
            },
        );
        self.invalidate_topology();
        id
    }

    /// Remove a component together with the wires that touch it; probes
    /// anchored on it will be dropped by the next rebuild.
    pub fn remove_component(&mut self, id: ComponentId) -> CircuitResult<()> {
        if self.components.shift_remove(&id).is_none() {
            return Err(CircuitError::UnknownComponent(id));
        }
        self.wires.retain(|_, w| {
            let touches = |e: &Endpoint| matches!(e, Endpoint::Terminal { component, .. } if *component == id);
            !touches(&w.a) && !touches(&w.b)
        });
        self.invalidate_topology();
        Ok(())
    }

    pub fn add_wire(&mut self, a: Endpoint, b: Endpoint) -> CircuitResult<WireId> {
        for e in [&a, &b] {
            if let Endpoint::Terminal {
                component,
                terminal,
            } = e
            {
                let comp = self
                    .components
                    .get(component)
                    .ok_or(CircuitError::UnknownComponent(*component))?;
                if *terminal >= comp.device.terminal_count() {
                    return Err(CircuitError::InvalidTopology(format!(
                        "component {component} has no terminal {terminal}"
                    )));
                }
            }
        }
        let id = self.fresh_id();
        self.wires.insert(id, Wire { id, a, b });
        self.invalidate_topology();
        Ok(id)
    }

    pub fn remove_wire(&mut self, id: WireId) -> CircuitResult<()> {
        if self.wires.shift_remove(&id).is_none() {
            return Err(CircuitError::UnknownWire(id));
        }
        self.invalidate_topology();
        Ok(())
    }

    pub fn set_rotation(&mut self, id: ComponentId, degrees: u16) -> CircuitResult<()> {
        if degrees % 90 != 0 {
            return Err(CircuitError::ParameterOutOfRange {
                field: "rotation".into(),
                value: degrees as f64,
                reason: "rotation must be a multiple of 90 degrees".into(),
            });
        }
        let comp = self
            .components
            .get_mut(&id)
            .ok_or(CircuitError::UnknownComponent(id))?;
        comp.rotation = degrees % 360;
        self.invalidate_topology();
        Ok(())
    }

    /// By-name parameter edit. Rejected values leave the device unchanged
    /// and the matrix layout stays valid.
    pub fn set_parameter(&mut self, id: ComponentId, field: &str, value: f64) -> CircuitResult<()> {
        let comp = self
            .components
            .get_mut(&id)
            .ok_or(CircuitError::UnknownComponent(id))?;
        comp.device
            .set_field(field, value)
            .map_err(|e| match e {
                voltlab_devices::FieldError::Unknown => CircuitError::UnknownField {
                    component: id,
                    field: field.to_string(),
                },
                voltlab_devices::FieldError::OutOfRange { reason } => {
                    CircuitError::ParameterOutOfRange {
                        field: field.to_string(),
                        value,
                        reason,
                    }
                }
            })
    }

    pub fn get_parameter(&self, id: ComponentId, field: &str) -> CircuitResult<f64> {
        let comp = self
            .components
            .get(&id)
            .ok_or(CircuitError::UnknownComponent(id))?;
        comp.device.get_field(field).ok_or(CircuitError::UnknownField {
            component: id,
            field: field.to_string(),
        })
    }

    /// Attach a probe to a node. The probe anchors to some terminal on
    /// that node so it can follow the node across rebuilds.
    pub fn add_probe(&mut self, node: NodeId, channel: usize) -> CircuitResult<ProbeId> {
        let anchor = self
            .components
            .values()
            .flat_map(|c| {
                c.nodes
                    .iter()
                    .enumerate()
                    .map(move |(t, n)| (c.id, t, *n))
            })
            .find(|&(_, _, n)| n == node)
            .map(|(cid, t, _)| (cid, t));
        if anchor.is_none() && !node.is_ground() {
            return Err(CircuitError::UnknownNode(node.as_u32()));
        }
        let id = self.fresh_id();
        self.probes.insert(
            id,
            Probe {
                id,
                node,
                channel,
                color: 0xff_ff_ff,
                anchor,
            },
        );
        Ok(id)
    }

    pub fn remove_probe(&mut self, id: ProbeId) -> CircuitResult<()> {
        if self.probes.shift_remove(&id).is_none() {
            return Err(CircuitError::UnknownProbe(id));
        }
        Ok(())
    }

    // ────────────────────── topology ──────────────────────

    /// Recompute node ids and the matrix layout.
    ///
    /// Connection points are component terminals and wire grid endpoints;
    /// points at the same grid position coincide, wires merge their two
    /// endpoints, and ground components pin their class to node 0.
    pub fn rebuild_topology(&mut self) -> CircuitResult<&Topology> {
        // Gather connection points, merging coincident positions up front.
        let mut point_of_pos: HashMap<(i32, i32), usize> = HashMap::new();
        let mut term_point: HashMap<(ComponentId, usize), usize> = HashMap::new();
        let mut next_point = 0usize;
        let mut pending_unions: Vec<(usize, usize)> = Vec::new();

        let mut point_at = |pos: (i32, i32), next: &mut usize| -> usize {
            *point_of_pos.entry(pos).or_insert_with(|| {
                let p = *next;
                *next += 1;
                p
            })
        };

        for comp in self.components.values() {
            for t in 0..comp.device.terminal_count() {
                let p = point_at(comp.terminal_position(t), &mut next_point);
                term_point.insert((comp.id, t), p);
            }
        }

        for wire in self.wires.values() {
            let resolve = |e: &Endpoint,
                           next: &mut usize,
                           point_of_pos: &mut HashMap<(i32, i32), usize>|
             -> CircuitResult<usize> {
                match e {
                    Endpoint::Terminal {
                        component,
                        terminal,
                    } => term_point
                        .get(&(*component, *terminal))
                        .copied()
                        .ok_or(CircuitError::UnknownComponent(*component)),
                    Endpoint::Grid { x, y } => Ok(*point_of_pos.entry((*x, *y)).or_insert_with(|| {
                        let p = *next;
                        *next += 1;
                        p
                    })),
                }
            };
            let pa = resolve(&wire.a, &mut next_point, &mut point_of_pos)?;
            let pb = resolve(&wire.b, &mut next_point, &mut point_of_pos)?;
            pending_unions.push((pa, pb));
        }

        let mut uf = UnionFind::new(next_point);
        for (a, b) in pending_unions {
            uf.union(a, b);
        }

        // Ground components force their class to node 0.
        let mut any_ground = false;
        for comp in self.components.values() {
            if comp.device.is_ground() {
                let p = term_point[&(comp.id, 0)];
                uf.ground(p);
                any_ground = true;
            }
        }
        if !any_ground {
            return Err(CircuitError::InvalidTopology(
                "circuit has no ground reference".into(),
            ));
        }

        // Dense renumber: ground classes collapse to 0, others get 1..=N
        // in first-encounter order (component order, terminal order).
        let mut node_of_root: HashMap<usize, NodeId> = HashMap::new();
        let mut num_nodes = 0usize;
        let ids: Vec<ComponentId> = self.components.keys().copied().collect();
        for id in &ids {
            let terminals = self.components[id].device.terminal_count();
            let mut nodes = Vec::with_capacity(terminals);
            for t in 0..terminals {
                let p = term_point[&(*id, t)];
                let root = uf.find(p);
                let node = if uf.is_grounded(p) {
                    NodeId::GROUND
                } else {
                    *node_of_root.entry(root).or_insert_with(|| {
                        num_nodes += 1;
                        NodeId::new(num_nodes as u32)
                    })
                };
                nodes.push(node);
            }
            self.components[id].nodes = nodes;
        }

        // Extra variables in component order.
        let mut num_extras = 0usize;
        for id in &ids {
            let comp = &mut self.components[id];
            let extras = comp.device.extra_vars();
            comp.extra_index = (extras > 0).then_some(num_extras);
            num_extras += extras;
        }

        // Re-derive probe nodes from their anchors; orphans go away.
        let components = &self.components;
        self.probes.retain(|_, probe| match probe.anchor {
            Some((cid, t)) => match components.get(&cid) {
                Some(comp) if t < comp.nodes.len() => {
                    probe.node = comp.nodes[t];
                    true
                }
                _ => false,
            },
            None => probe.node.is_ground(),
        });

        self.topology = Some(Topology {
            num_nodes,
            num_extras,
        });
        Ok(self.topology.as_ref().unwrap())
    }

    /// All node ids currently in use, ground first.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let n = self.topology.as_ref().map(|t| t.num_nodes).unwrap_or(0);
        (0..=n as u32).map(NodeId::new).collect()
    }
}

/// Assembly view handed to the Newton solver: borrows the graph and the
/// environment for the duration of one solve.
pub struct CircuitSystem<'a> {
    pub components: &'a IndexMap<ComponentId, Component>,
    pub env: &'a Environment,
    pub topology: &'a Topology,
    pub dt: f64,
    /// Time at the end of the step being solved.
    pub time: f64,
}

impl AssembleSystem for CircuitSystem<'_> {
    fn num_nodes(&self) -> usize {
        self.topology.num_nodes
    }

    fn num_extras(&self) -> usize {
        self.topology.num_extras
    }

    fn nonlinear(&self) -> bool {
        self.components.values().any(|c| c.device.nonlinear())
    }

    fn assemble(&mut self, guess: &DVector<f64>, mna: &mut MnaSystem) {
        // Pad every node so floating regions stay solvable.
        for row in 0..self.topology.num_nodes {
            mna.stamp(row, row, GMIN);
        }
        for comp in self.components.values() {
            let nodes = comp.node_rows();
            let extra = comp.extra_index.map(|k| self.topology.num_nodes + k);
            let ctx = StampCtx {
                nodes: &nodes,
                extra,
                dt: self.dt,
                time: self.time,
                x_prev: guess,
                env: self.env,
            };
            comp.device.stamp(mna, &ctx);
        }
    }
}
