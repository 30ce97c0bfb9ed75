//! Linear passive elements: resistor, capacitor, inductor, potentiometer,
//! photoresistor, thermistor, fuse.
//!
//! Reactive elements use backward-Euler companion models: the capacitor
//! becomes `G_eq = C/Δt` in parallel with `I_eq = G_eq·V_prev`, the
//! inductor keeps its current as an extra MNA variable with the branch
//! equation `V − (L/Δt)·I = −(L/Δt)·I_prev`.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, unit_range, CommitCtx, DeviceEvent, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;

/// Conductance of an open contact or blown element.
pub(crate) const G_OFF: f64 = 1e-9;

// ────────────────────── Resistor ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResistorParams {
    pub resistance: f64,
    /// Linear temperature coefficient (1/°C), applied in non-ideal mode.
    pub tempco: f64,
    /// Power rating in watts; 0 disables damage tracking.
    pub power_rating: f64,
    pub ideal: bool,
}

impl Default for ResistorParams {
    fn default() -> Self {
        Self {
            resistance: 1e3,
            tempco: 0.0,
            power_rating: 0.25,
            ideal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResistorState {
    pub power: f64,
    /// Accumulated overload, 1.0 burns the part.
    pub damage: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resistor {
    pub params: ResistorParams,
    pub state: ResistorState,
}

impl Resistor {
    pub fn new(resistance: f64) -> Self {
        Self {
            params: ResistorParams {
                resistance,
                ..Default::default()
            },
            state: ResistorState::default(),
        }
    }

    fn effective_resistance(&self, temperature_c: f64) -> f64 {
        if self.params.ideal {
            self.params.resistance
        } else {
            let r = self.params.resistance * (1.0 + self.params.tempco * (temperature_c - 25.0));
            r.max(1e-9)
        }
    }
}

impl DeviceModel for Resistor {
    fn kind_name(&self) -> &'static str {
        "resistor"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let g = if self.state.failed {
            G_OFF
        } else {
            1.0 / self.effective_resistance(ctx.env.temperature_c)
        };
        mna.stamp_conductance(ctx.node(0), ctx.node(1), g);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        if self.state.failed {
            self.state.power = 0.0;
            return;
        }
        let v = ctx.v_diff(0, 1);
        let r = self.effective_resistance(ctx.env.temperature_c);
        self.state.power = v * v / r;

        let rating = self.params.power_rating;
        if !self.params.ideal && rating > 0.0 && self.state.power > rating {
            self.state.damage += (self.state.power / rating - 1.0) * ctx.dt;
            if self.state.damage >= 1.0 {
                self.state.failed = true;
                ctx.events.push(DeviceEvent::ResistorBurned);
            }
        }
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        if self.state.failed {
            return Some(0.0);
        }
        Some(ctx.v_diff(0, 1) / self.params.resistance)
    }

    fn dissipated_power(&self) -> f64 {
        self.state.power
    }

    fn reset_state(&mut self) {
        self.state = ResistorState::default();
    }

    fn perturb(&mut self, factor: f64) {
        self.params.resistance *= factor;
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "resistance" => self.params.resistance = positive(value, "resistance")?,
            "tempco" => self.params.tempco = value,
            "power_rating" => self.params.power_rating = value.max(0.0),
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "resistance" => Some(self.params.resistance),
            "tempco" => Some(self.params.tempco),
            "power_rating" => Some(self.params.power_rating),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}

// ────────────────────── Capacitor ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitorParams {
    pub capacitance: f64,
    /// Electrolytic parts are polarised and have a voltage ceiling.
    pub electrolytic: bool,
    pub max_voltage: f64,
}

impl Default for CapacitorParams {
    fn default() -> Self {
        Self {
            capacitance: 1e-6,
            electrolytic: false,
            max_voltage: 25.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacitorState {
    /// Voltage across the terminals at the last commit.
    pub v_prev: f64,
    /// Charging current of the last committed step.
    pub i_prev: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacitor {
    pub params: CapacitorParams,
    pub state: CapacitorState,
}

impl Capacitor {
    pub fn new(capacitance: f64) -> Self {
        Self {
            params: CapacitorParams {
                capacitance,
                ..Default::default()
            },
            state: CapacitorState::default(),
        }
    }
}

impl DeviceModel for Capacitor {
    fn kind_name(&self) -> &'static str {
        "capacitor"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        if self.state.failed {
            // A punched-through electrolytic is close to a short.
            mna.stamp_conductance(ctx.node(0), ctx.node(1), 1.0);
            return;
        }
        let geq = self.params.capacitance / ctx.dt;
        let ieq = geq * self.state.v_prev;

        mna.stamp_conductance(ctx.node(0), ctx.node(1), geq);
        // Equivalent source charges the positive terminal.
        mna.stamp_current_source(ctx.node(1), ctx.node(0), ieq);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let v = ctx.v_diff(0, 1);
        if self.params.electrolytic
            && !self.state.failed
            && (v > self.params.max_voltage || v < -1.0)
        {
            self.state.failed = true;
            ctx.events.push(DeviceEvent::ElectrolyticOvervoltage);
        }
        self.state.i_prev = self.params.capacitance / ctx.dt * (v - self.state.v_prev);
        self.state.v_prev = v;
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.i_prev)
    }

    fn reset_state(&mut self) {
        self.state = CapacitorState::default();
    }

    fn perturb(&mut self, factor: f64) {
        self.params.capacitance *= factor;
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "capacitance" => self.params.capacitance = positive(value, "capacitance")?,
            "electrolytic" => self.params.electrolytic = value != 0.0,
            "max_voltage" => self.params.max_voltage = positive(value, "max_voltage")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "capacitance" => Some(self.params.capacitance),
            "electrolytic" => Some(self.params.electrolytic as u8 as f64),
            "max_voltage" => Some(self.params.max_voltage),
            _ => None,
        }
    }
}

// ────────────────────── Inductor ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InductorParams {
    pub inductance: f64,
}

impl Default for InductorParams {
    fn default() -> Self {
        Self { inductance: 1e-3 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InductorState {
    /// Branch current at the last commit, positive from terminal 0 to 1.
    pub i_prev: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inductor {
    pub params: InductorParams,
    pub state: InductorState,
}

impl Inductor {
    pub fn new(inductance: f64) -> Self {
        Self {
            params: InductorParams { inductance },
            state: InductorState::default(),
        }
    }
}

impl DeviceModel for Inductor {
    fn kind_name(&self) -> &'static str {
        "inductor"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn extra_vars(&self) -> usize {
        1
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let br = ctx.extra.expect("inductor owns one extra row");
        let l_dt = self.params.inductance / ctx.dt;

        // Branch current enters the node equations.
        if let Some(p) = ctx.node(0) {
            mna.stamp(p, br, 1.0);
            mna.stamp(br, p, 1.0);
        }
        if let Some(n) = ctx.node(1) {
            mna.stamp(n, br, -1.0);
            mna.stamp(br, n, -1.0);
        }
        // V − (L/Δt)·I = −(L/Δt)·I_prev
        mna.stamp(br, br, -l_dt);
        mna.stamp_rhs(br, -l_dt * self.state.i_prev);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        self.state.i_prev = ctx.extra_value(0);
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(0))
    }

    fn reset_state(&mut self) {
        self.state = InductorState::default();
    }

    fn perturb(&mut self, factor: f64) {
        self.params.inductance *= factor;
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "inductance" => self.params.inductance = positive(value, "inductance")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "inductance" => Some(self.params.inductance),
            _ => None,
        }
    }
}

// ────────────────────── Potentiometer ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentiometerParams {
    pub resistance: f64,
    /// Wiper position in [0, 1]; 0 puts the wiper at terminal 0.
    pub position: f64,
}

impl Default for PotentiometerParams {
    fn default() -> Self {
        Self {
            resistance: 10e3,
            position: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Potentiometer {
    pub params: PotentiometerParams,
}

impl DeviceModel for Potentiometer {
    fn kind_name(&self) -> &'static str {
        "potentiometer"
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // end, end, wiper
        vec![(-2, 0), (2, 0), (0, 2)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let pos = self.params.position.clamp(0.0, 1.0);
        // Keep both halves finite at the track ends.
        let r1 = (self.params.resistance * pos).max(1e-6);
        let r2 = (self.params.resistance * (1.0 - pos)).max(1e-6);
        mna.stamp_conductance(ctx.node(0), ctx.node(2), 1.0 / r1);
        mna.stamp_conductance(ctx.node(2), ctx.node(1), 1.0 / r2);
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "resistance" => self.params.resistance = positive(value, "resistance")?,
            "position" => self.params.position = unit_range(value, "position")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "resistance" => Some(self.params.resistance),
            "position" => Some(self.params.position),
            _ => None,
        }
    }
}

// ────────────────────── Photoresistor ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoresistorParams {
    pub r_dark: f64,
    pub r_light: f64,
    /// Response curvature; higher gamma concentrates the swing near full
    /// illumination.
    pub gamma: f64,
}

impl Default for PhotoresistorParams {
    fn default() -> Self {
        Self {
            r_dark: 1e6,
            r_light: 1e3,
            gamma: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photoresistor {
    pub params: PhotoresistorParams,
}

impl Photoresistor {
    pub fn resistance_at(&self, light: f64) -> f64 {
        let ratio = self.params.r_light / self.params.r_dark;
        self.params.r_dark * ratio.powf(light.clamp(0.0, 1.0).powf(self.params.gamma))
    }
}

impl DeviceModel for Photoresistor {
    fn kind_name(&self) -> &'static str {
        "photoresistor"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let r = self.resistance_at(ctx.env.light);
        mna.stamp_conductance(ctx.node(0), ctx.node(1), 1.0 / r);
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_dark" => self.params.r_dark = positive(value, "r_dark")?,
            "r_light" => self.params.r_light = positive(value, "r_light")?,
            "gamma" => self.params.gamma = positive(value, "gamma")?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_dark" => Some(self.params.r_dark),
            "r_light" => Some(self.params.r_light),
            "gamma" => Some(self.params.gamma),
            _ => None,
        }
    }
}

// ────────────────────── Thermistor ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermistorParams {
    /// Resistance at 25 °C.
    pub r25: f64,
    /// Beta constant in kelvin.
    pub beta: f64,
    /// NTC drops with temperature, PTC rises.
    pub ntc: bool,
}

impl Default for ThermistorParams {
    fn default() -> Self {
        Self {
            r25: 10e3,
            beta: 3950.0,
            ntc: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thermistor {
    pub params: ThermistorParams,
}

impl Thermistor {
    pub fn resistance_at(&self, temperature_c: f64) -> f64 {
        const T25: f64 = 298.15;
        let t = temperature_c + 273.15;
        let exponent = self.params.beta * (1.0 / t - 1.0 / T25);
        let sign = if self.params.ntc { 1.0 } else { -1.0 };
        self.params.r25 * (sign * exponent).exp()
    }
}

impl DeviceModel for Thermistor {
    fn kind_name(&self) -> &'static str {
        "thermistor"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let r = self.resistance_at(ctx.env.temperature_c).max(1e-9);
        mna.stamp_conductance(ctx.node(0), ctx.node(1), 1.0 / r);
    }

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r25" => self.params.r25 = positive(value, "r25")?,
            "beta" => self.params.beta = positive(value, "beta")?,
            "ntc" => self.params.ntc = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r25" => Some(self.params.r25),
            "beta" => Some(self.params.beta),
            "ntc" => Some(self.params.ntc as u8 as f64),
            _ => None,
        }
    }
}

// ────────────────────── Fuse ──────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuseParams {
    /// Cold element resistance.
    pub resistance: f64,
    pub current_rating: f64,
    /// Melt integral rating in A²·s; only used in non-ideal mode.
    pub i2t_rating: f64,
    /// Ideal fuses blow the instant the rating is exceeded.
    pub ideal: bool,
}

impl Default for FuseParams {
    fn default() -> Self {
        Self {
            resistance: 0.05,
            current_rating: 1.0,
            i2t_rating: 0.1,
            ideal: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuseState {
    /// Accumulated ∫i²dt while above the rating.
    pub i2t: f64,
    pub blown: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fuse {
    pub params: FuseParams,
    pub state: FuseState,
}

impl DeviceModel for Fuse {
    fn kind_name(&self) -> &'static str {
        "fuse"
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, 0)]
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let g = if self.state.blown {
            G_OFF
        } else {
            1.0 / self.params.resistance
        };
        mna.stamp_conductance(ctx.node(0), ctx.node(1), g);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        if self.state.blown {
            return;
        }
        let i = ctx.v_diff(0, 1) / self.params.resistance;
        if i.abs() <= self.params.current_rating {
            return;
        }
        if self.params.ideal {
            self.state.blown = true;
            ctx.events.push(DeviceEvent::FuseBlown);
            return;
        }
        self.state.i2t += i * i * ctx.dt;
        if self.state.i2t >= self.params.i2t_rating {
            self.state.blown = true;
            ctx.events.push(DeviceEvent::FuseBlown);
        }
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        let g = if self.state.blown {
            G_OFF
        } else {
            1.0 / self.params.resistance
        };
        Some(ctx.v_diff(0, 1) * g)
    }

    fn reset_state(&mut self) {
        self.state = FuseState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "resistance" => self.params.resistance = positive(value, "resistance")?,
            "current_rating" => self.params.current_rating = positive(value, "current_rating")?,
            "i2t_rating" => self.params.i2t_rating = positive(value, "i2t_rating")?,
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "resistance" => Some(self.params.resistance),
            "current_rating" => Some(self.params.current_rating),
            "i2t_rating" => Some(self.params.i2t_rating),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}

// ────────────────────── Ground marker ──────────────────────

/// Topology marker pinning its node to ground. Stamps nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ground;

impl DeviceModel for Ground {
    fn kind_name(&self) -> &'static str {
        "ground"
    }

    fn terminal_count(&self) -> usize {
        1
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(0, 0)]
    }

    fn is_ground(&self) -> bool {
        true
    }

    fn stamp(&self, _mna: &mut MnaSystem, _ctx: &StampCtx) {}

    fn reset_state(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use voltlab_core::Environment;

    fn stamp_two_terminal(dev: &impl DeviceModel, dt: f64) -> MnaSystem {
        let mut mna = MnaSystem::new(2, dev.extra_vars());
        let env = Environment::default();
        let x = DVector::zeros(2 + dev.extra_vars());
        let nodes = [Some(0), Some(1)];
        let ctx = StampCtx {
            nodes: &nodes,
            extra: if dev.extra_vars() > 0 { Some(2) } else { None },
            dt,
            time: dt,
            x_prev: &x,
            env: &env,
        };
        dev.stamp(&mut mna, &ctx);
        mna
    }

    #[test]
    fn test_resistor_stamp() {
        let r = Resistor::new(100.0);
        let mna = stamp_two_terminal(&r, 1e-6);
        let a = mna.to_dense_matrix();
        assert!((a[(0, 0)] - 0.01).abs() < 1e-15);
        assert!((a[(0, 1)] + 0.01).abs() < 1e-15);
    }

    #[test]
    fn test_resistor_tempco() {
        let mut r = Resistor::new(1000.0);
        r.params.ideal = false;
        r.params.tempco = 0.004;
        // +25 °C above nominal raises R by 10%.
        assert!((r.effective_resistance(50.0) - 1100.0).abs() < 1e-9);
        assert!((r.effective_resistance(25.0) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_capacitor_companion() {
        let mut c = Capacitor::new(1e-6);
        c.state.v_prev = 2.0;
        let mna = stamp_two_terminal(&c, 1e-5);
        let a = mna.to_dense_matrix();
        let geq = 1e-6 / 1e-5;
        assert!((a[(0, 0)] - geq).abs() < 1e-12);
        // Equivalent source pushes geq * v_prev into the positive node.
        assert!((mna.rhs()[0] - geq * 2.0).abs() < 1e-12);
        assert!((mna.rhs()[1] + geq * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_inductor_branch_equation() {
        let mut l = Inductor::new(1e-3);
        l.state.i_prev = 0.5;
        let mna = stamp_two_terminal(&l, 1e-6);
        let a = mna.to_dense_matrix();
        let l_dt = 1e-3 / 1e-6;
        assert_eq!(a[(0, 2)], 1.0);
        assert_eq!(a[(1, 2)], -1.0);
        assert_eq!(a[(2, 0)], 1.0);
        assert_eq!(a[(2, 1)], -1.0);
        assert!((a[(2, 2)] + l_dt).abs() < 1e-9);
        assert!((mna.rhs()[2] + l_dt * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_photoresistor_endpoints() {
        let p = Photoresistor::default();
        assert!((p.resistance_at(0.0) - 1e6).abs() < 1.0);
        assert!((p.resistance_at(1.0) - 1e3).abs() < 1e-6);
        // Monotone in between.
        assert!(p.resistance_at(0.3) > p.resistance_at(0.7));
    }

    #[test]
    fn test_thermistor_ntc_direction() {
        let t = Thermistor::default();
        assert!((t.resistance_at(25.0) - 10e3).abs() < 1e-6);
        assert!(t.resistance_at(50.0) < 10e3);
        assert!(t.resistance_at(0.0) > 10e3);

        let ptc = Thermistor {
            params: ThermistorParams {
                ntc: false,
                ..Default::default()
            },
        };
        assert!(ptc.resistance_at(50.0) > 10e3);
    }

    #[test]
    fn test_fuse_blows_on_i2t() {
        let mut fuse = Fuse::default();
        // 10 A through 0.05 Ω: v = 0.5 V.
        let mut env = Environment::default();
        let mut events = Vec::new();
        let x = DVector::from_vec(vec![0.5, 0.0]);
        let nodes = [Some(0), Some(1)];
        // i²·dt = 100 · 1e-3 = 0.1 per commit, rating is 0.1.
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: None,
            dt: 1e-3,
            time: 1e-3,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        fuse.commit(&mut ctx);
        assert!(fuse.state.blown);
        assert_eq!(events, vec![DeviceEvent::FuseBlown]);
    }

    #[test]
    fn test_fuse_under_rating_accumulates_nothing() {
        let mut fuse = Fuse::default();
        let mut env = Environment::default();
        let mut events = Vec::new();
        let x = DVector::from_vec(vec![0.02, 0.0]); // 0.4 A
        let nodes = [Some(0), Some(1)];
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: None,
            dt: 1.0,
            time: 1.0,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        fuse.commit(&mut ctx);
        assert!(!fuse.state.blown);
        assert_eq!(fuse.state.i2t, 0.0);
    }
}
