//! The transient stepping engine.
//!
//! One logical simulation thread owns the circuit, matrix and state; the
//! UI drives it through commands between steps and reads history through
//! snapshot copies. Each step: reset wireless channels, Newton-solve the
//! step, commit device state, advance time, append probe samples. Solver
//! failures shrink the timestep and retry before pausing with a
//! diagnostic.

use indexmap::IndexMap;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use voltlab_core::error::Error as CircuitError;
use voltlab_core::{Environment, NodeId, ProbeHistory};
use voltlab_devices::ctx::{CommitCtx, ReadCtx};
use voltlab_devices::{Device, DeviceEvent, SubcircuitDef};
use voltlab_solver::{
    error::Error as SolverError, newton::solve_system, timestep::error_estimate, AdaptiveStatus,
    NewtonParams, StepController, StepControllerConfig,
};

use crate::circuit::{Circuit, CircuitSystem, Component, ComponentId, Endpoint, ProbeId, WireId};
use crate::error::Result;

/// Simple lumped thermal resistance used for the per-component
/// temperature mirror, °C per watt.
const THERMAL_RESISTANCE: f64 = 40.0;

/// Δt division factor per failure-policy retry.
const RETRY_SHRINK: f64 = 4.0;
const MAX_RETRIES: usize = 3;

/// Upper bound on accept/reject rounds within one adaptive step.
const MAX_ADAPTIVE_ROUNDS: usize = 32;

/// Operational state of the stepping loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    Stopped,
    Running,
    Paused,
    SingleStep,
}

/// A device-state event tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub time: f64,
    pub component: ComponentId,
    pub event: DeviceEvent,
}

#[derive(Clone)]
struct Snapshot {
    components: IndexMap<ComponentId, Component>,
    solution: DVector<f64>,
    time: f64,
    env: Environment,
    events_len: usize,
}

/// The simulation engine.
#[derive(Clone)]
pub struct Engine {
    pub circuit: Circuit,
    env: Environment,
    state: SimState,
    time: f64,
    /// Base (user-set) timestep.
    dt: f64,
    /// Real-time speed multiplier, consumed by the driver loop.
    speed: f64,
    solution: DVector<f64>,
    newton: NewtonParams,
    adaptive: bool,
    controller: StepController,
    histories: IndexMap<ProbeId, ProbeHistory>,
    events: Vec<EventRecord>,
    last_error: Option<SolverError>,
    /// Base seed for per-trial RNG in statistical analyses.
    pub mc_seed: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let dt = 10e-6;
        Self {
            circuit: Circuit::new(),
            env: Environment::default(),
            state: SimState::Stopped,
            time: 0.0,
            dt,
            speed: 1.0,
            solution: DVector::zeros(0),
            newton: NewtonParams::default(),
            adaptive: false,
            controller: StepController::new(dt, StepControllerConfig::default()),
            histories: IndexMap::new(),
            events: Vec::new(),
            last_error: None,
            mc_seed: 0x5eed_cafe,
        }
    }

    // ────────────────────── editing ──────────────────────

    pub fn add_component(&mut self, device: Device, x: i32, y: i32) -> ComponentId {
        self.circuit.add_component(device, x, y)
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Result<()> {
        self.circuit.remove_component(id)?;
        Ok(())
    }

    pub fn add_wire(&mut self, a: Endpoint, b: Endpoint) -> Result<WireId> {
        Ok(self.circuit.add_wire(a, b)?)
    }

    pub fn remove_wire(&mut self, id: WireId) -> Result<()> {
        self.circuit.remove_wire(id)?;
        Ok(())
    }

    pub fn set_parameter(&mut self, id: ComponentId, field: &str, value: f64) -> Result<()> {
        self.circuit.set_parameter(id, field, value)?;
        Ok(())
    }

    pub fn set_rotation(&mut self, id: ComponentId, degrees: u16) -> Result<()> {
        self.circuit.set_rotation(id, degrees)?;
        Ok(())
    }

    pub fn add_probe(&mut self, node: NodeId, channel: usize) -> Result<ProbeId> {
        self.ensure_topology()?;
        let id = self.circuit.add_probe(node, channel)?;
        self.histories.insert(id, ProbeHistory::new());
        Ok(id)
    }

    pub fn define_subcircuit(&mut self, def: SubcircuitDef) -> Result<voltlab_devices::DefId> {
        Ok(self.circuit.library.define(def)?)
    }

    pub fn instantiate_subcircuit(
        &mut self,
        def_id: voltlab_devices::DefId,
        x: i32,
        y: i32,
    ) -> Result<ComponentId> {
        let inst =
            voltlab_devices::subcircuit::SubcircuitInstance::instantiate(&self.circuit.library, def_id)?;
        Ok(self.add_component(Device::Subcircuit(inst), x, y))
    }

    // ────────────────────── control ──────────────────────

    pub fn run(&mut self) {
        self.state = SimState::Running;
    }

    pub fn pause(&mut self) {
        self.state = SimState::Paused;
    }

    /// Arm a single step; the next [`Engine::tick`] executes it and pauses.
    pub fn single_step(&mut self) {
        self.state = SimState::SingleStep;
    }

    /// Rewind to t = 0: clear device state, histories and events; the
    /// netlist itself is untouched.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.state = SimState::Stopped;
        self.last_error = None;
        self.events.clear();
        self.controller.reset();
        for comp in self.circuit.components.values_mut() {
            comp.device.reset_state();
            comp.thermal = Default::default();
        }
        for history in self.histories.values_mut() {
            history.clear();
        }
        let size = self.circuit.topology().map(|t| t.size()).unwrap_or(0);
        self.solution = DVector::zeros(size);
        self.env.reset_channels();
    }

    pub fn set_timestep(&mut self, dt: f64) -> Result<()> {
        if dt <= 0.0 || !dt.is_finite() {
            return Err(CircuitError::ParameterOutOfRange {
                field: "timestep".into(),
                value: dt,
                reason: "timestep must be positive".into(),
            }
            .into());
        }
        self.dt = dt;
        self.rebuild_controller(self.controller.tolerance());
        Ok(())
    }

    pub fn set_adaptive(&mut self, enabled: bool, tol: f64) {
        self.adaptive = enabled;
        self.rebuild_controller(tol.max(1e-12));
    }

    fn rebuild_controller(&mut self, tol: f64) {
        self.controller = StepController::new(
            self.dt,
            StepControllerConfig {
                tol,
                dt_min: self.dt / 4096.0,
                dt_max: self.dt * 16.0,
            },
        );
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        self.speed = multiplier.clamp(1e-3, 1e3);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_environment(&mut self, temperature_c: f64, light: f64) {
        self.env.temperature_c = temperature_c;
        self.env.light = light.clamp(0.0, 1.0);
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Driver-loop entry point: advances when running, honours
    /// single-step. Returns whether a step was taken.
    pub fn tick(&mut self) -> Result<bool> {
        match self.state {
            SimState::Running => {
                self.step()?;
                Ok(true)
            }
            SimState::SingleStep => {
                let r = self.step();
                self.state = SimState::Paused;
                r.map(|_| true)
            }
            SimState::Stopped | SimState::Paused => Ok(false),
        }
    }

    /// Advance simulated time by at least `seconds`.
    pub fn run_for(&mut self, seconds: f64) -> Result<()> {
        let target = self.time + seconds;
        while self.time < target - 1e-15 {
            self.step()?;
        }
        Ok(())
    }

    // ────────────────────── stepping ──────────────────────

    /// Execute one simulation step with the failure policy applied.
    pub fn step(&mut self) -> Result<()> {
        self.ensure_topology()?;

        // Begin-of-step phase: receivers latch their channels, then the
        // channels reset for this step's transmitters. Retries below must
        // not repeat this.
        for comp in self.circuit.components.values_mut() {
            comp.device.begin_step(&self.env);
        }
        self.env.reset_channels();

        if self.adaptive {
            self.adaptive_step()
        } else {
            self.fixed_step()
        }
    }

    fn fixed_step(&mut self) -> Result<()> {
        let mut dt = self.dt;
        for attempt in 0..=MAX_RETRIES {
            match self.solve_once(dt) {
                Ok(x) => {
                    if attempt > 0 {
                        log::debug!("step recovered at dt = {dt:.3e} after {attempt} retries");
                    }
                    self.commit_solution(&x, dt);
                    self.record_probes();
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    log::warn!("step failed ({e}); retrying with dt/{RETRY_SHRINK}");
                    dt /= RETRY_SHRINK;
                }
                Err(e) => {
                    log::warn!("step failed after {MAX_RETRIES} retries: {e}; pausing");
                    self.last_error = Some(e.clone());
                    self.state = SimState::Paused;
                    return Err(e.into());
                }
            }
        }
        unreachable!("retry loop always returns");
    }

    fn adaptive_step(&mut self) -> Result<()> {
        let mut solver_failures = 0usize;

        for _ in 0..MAX_ADAPTIVE_ROUNDS {
            let dt = self.controller.dt();
            let saved = self.snapshot();

            // Full step, then the same interval as two half steps; the
            // scaled difference estimates the local truncation error.
            let trial = (|| -> std::result::Result<DVector<f64>, SolverError> {
                let x = self.solve_once(dt)?;
                self.commit_solution(&x, dt);
                let x_full = self.solution.clone();
                self.restore(saved.clone());
                self.advance_unrecorded(dt / 2.0)?;
                self.advance_unrecorded(dt / 2.0)?;
                Ok(x_full)
            })();

            let x_full = match trial {
                Ok(x_full) => x_full,
                Err(_) => {
                    self.restore(saved);
                    solver_failures += 1;
                    if solver_failures > MAX_RETRIES {
                        let e = self
                            .last_error
                            .clone()
                            .unwrap_or(SolverError::NewtonFailed { iterations: 0 });
                        self.state = SimState::Paused;
                        return Err(e.into());
                    }
                    self.controller.reject(1e6 * self.controller.tolerance());
                    continue;
                }
            };

            let estimate = error_estimate(&x_full, &self.solution);
            if self.controller.should_accept(estimate) {
                self.controller.accept(estimate);
                self.record_probes();
                return Ok(());
            }
            self.controller.reject(estimate);
            self.restore(saved);
        }

        log::warn!("adaptive controller failed to find an acceptable step; pausing");
        self.state = SimState::Paused;
        Err(SolverError::NewtonFailed { iterations: 0 }.into())
    }

    fn advance_unrecorded(&mut self, dt: f64) -> std::result::Result<(), SolverError> {
        let x = self.solve_once(dt)?;
        self.commit_solution(&x, dt);
        Ok(())
    }

    fn solve_once(&mut self, dt: f64) -> std::result::Result<DVector<f64>, SolverError> {
        let topology = self
            .circuit
            .topology()
            .expect("topology is built before stepping")
            .clone();
        let mut sys = CircuitSystem {
            components: &self.circuit.components,
            env: &self.env,
            topology: &topology,
            dt,
            time: self.time + dt,
        };
        let out = solve_system(&mut sys, &self.solution, &self.newton);
        match out {
            Ok(out) => Ok(out.x),
            Err(e) => {
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Write solved state into the devices and advance time. Probe
    /// recording is separate so adaptive trial steps stay invisible.
    fn commit_solution(&mut self, x: &DVector<f64>, dt: f64) {
        self.time += dt;
        let time = self.time;
        let num_nodes = self
            .circuit
            .topology()
            .expect("topology is built before stepping")
            .num_nodes;
        let ambient = self.env.temperature_c;

        let mut raised: Vec<(ComponentId, DeviceEvent)> = Vec::new();
        for comp in self.circuit.components.values_mut() {
            let nodes = comp.node_rows();
            let extra = comp.extra_index.map(|k| num_nodes + k);
            let mut events = Vec::new();
            let mut ctx = CommitCtx {
                nodes: &nodes,
                extra,
                dt,
                time,
                x,
                env: &mut self.env,
                events: &mut events,
            };
            comp.device.commit(&mut ctx);
            comp.thermal.power = comp.device.dissipated_power();
            comp.thermal.temperature_c = ambient + comp.thermal.power * THERMAL_RESISTANCE;
            raised.extend(events.into_iter().map(|e| (comp.id, e)));
        }
        for (component, event) in raised {
            log::debug!("device event at t = {time:.6e}: {event:?} on component {component}");
            self.events.push(EventRecord {
                time,
                component,
                event,
            });
        }
        self.solution = x.clone();
    }

    fn record_probes(&mut self) {
        let time = self.time;
        for probe in self.circuit.probes.values() {
            let v = probe
                .node
                .matrix_index()
                .map(|i| self.solution[i])
                .unwrap_or(0.0);
            self.histories.entry(probe.id).or_default().push(time, v);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            components: self.circuit.components.clone(),
            solution: self.solution.clone(),
            time: self.time,
            env: self.env.clone(),
            events_len: self.events.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.circuit.components = snapshot.components;
        self.solution = snapshot.solution;
        self.time = snapshot.time;
        self.env = snapshot.env;
        self.events.truncate(snapshot.events_len);
    }

    /// Build the matrix layout if a structural edit invalidated it.
    /// History does not survive a rebuild.
    pub fn ensure_topology(&mut self) -> Result<()> {
        if self.circuit.topology().is_some() {
            return Ok(());
        }
        self.circuit.rebuild_topology()?;
        let size = self.circuit.topology().map(|t| t.size()).unwrap_or(0);
        self.solution = DVector::zeros(size);
        // Stale probe buffers go with the old layout.
        let live: Vec<ProbeId> = self.circuit.probes.keys().copied().collect();
        self.histories.retain(|id, _| live.contains(id));
        for history in self.histories.values_mut() {
            history.clear();
        }
        Ok(())
    }

    // ────────────────────── observation ──────────────────────

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn timestep(&self) -> f64 {
        self.dt
    }

    pub fn node_voltage(&self, node: NodeId) -> Result<f64> {
        let topo = self
            .circuit
            .topology()
            .ok_or_else(|| CircuitError::InvalidTopology("topology not built".into()))?;
        match node.matrix_index() {
            None => Ok(0.0),
            Some(i) if i < topo.num_nodes => Ok(self.solution[i]),
            Some(_) => Err(CircuitError::UnknownNode(node.as_u32()).into()),
        }
    }

    pub fn branch_current(&self, id: ComponentId) -> Result<f64> {
        let comp = self
            .circuit
            .components
            .get(&id)
            .ok_or(CircuitError::UnknownComponent(id))?;
        let num_nodes = self.circuit.topology().map(|t| t.num_nodes).unwrap_or(0);
        let nodes = comp.node_rows();
        let ctx = ReadCtx {
            nodes: &nodes,
            extra: comp.extra_index.map(|k| num_nodes + k),
            x: &self.solution,
        };
        Ok(comp.device.branch_current(&ctx).unwrap_or(0.0))
    }

    pub fn history(&self, probe: ProbeId, max_samples: usize) -> Result<Vec<(f64, f64)>> {
        let history = self
            .histories
            .get(&probe)
            .ok_or(CircuitError::UnknownProbe(probe))?;
        Ok(history.last_n(max_samples))
    }

    pub fn adaptive_status(&self) -> AdaptiveStatus {
        self.controller.status()
    }

    pub fn last_error(&self) -> Option<&SolverError> {
        self.last_error.as_ref()
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Latest solution vector, `[V₁ … V_N, extra₁ … extra_M]`.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }
}
