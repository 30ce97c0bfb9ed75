//! Brushed DC motor.
//!
//! Electrically the armature is a series R-L branch carried as one extra
//! MNA variable, with the back-EMF `K_v·ω` entering the branch equation
//! as an offset. The rotor is integrated with forward Euler at commit and
//! the speed is clamped at zero (the playground motor has no reverse
//! ratchet).

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcMotorParams {
    pub r_armature: f64,
    pub l_armature: f64,
    /// Back-EMF constant, V·s/rad.
    pub k_v: f64,
    /// Torque constant, N·m/A.
    pub k_t: f64,
    /// Rotor inertia, kg·m².
    pub inertia: f64,
    /// Viscous friction, N·m·s/rad.
    pub friction: f64,
    /// External load torque, N·m.
    pub torque_load: f64,
}

impl Default for DcMotorParams {
    fn default() -> Self {
        Self {
            r_armature: 2.0,
            l_armature: 5e-3,
            k_v: 0.05,
            k_t: 0.05,
            inertia: 1e-4,
            friction: 1e-5,
            torque_load: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcMotorState {
    pub current: f64,
    /// Rotor speed in rad/s, never negative.
    pub omega: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcMotor {
    pub params: DcMotorParams,
    pub state: DcMotorState,
}

impl DeviceModel for DcMotor {
    fn kind_name(&self) -> &'static str {
        "dc_motor"
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
        let br = ctx.extra.expect("motor owns one extra row");
        let p = &self.params;
        let l_dt = p.l_armature / ctx.dt;

        if let Some(n) = ctx.node(0) {
            mna.stamp(n, br, 1.0);
            mna.stamp(br, n, 1.0);
        }
        if let Some(n) = ctx.node(1) {
            mna.stamp(n, br, -1.0);
            mna.stamp(br, n, -1.0);
        }
        // V − (R + L/Δt)·I = K_v·ω − (L/Δt)·I_prev
        mna.stamp(br, br, -(p.r_armature + l_dt));
        mna.stamp_rhs(br, p.k_v * self.state.omega - l_dt * self.state.current);
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let p = &self.params;
        let i = ctx.extra_value(0);
        self.state.current = i;

        let torque = p.k_t * i - p.friction * self.state.omega - p.torque_load;
        self.state.omega = (self.state.omega + torque / p.inertia * ctx.dt).max(0.0);
        self.state.power = (ctx.v_diff(0, 1) * i).abs();
    }

    fn branch_current(&self, ctx: &ReadCtx) -> Option<f64> {
        Some(ctx.extra_value(0))
    }

    fn dissipated_power(&self) -> f64 {
        self.state.power
    }

    fn reset_state(&mut self) {
        self.state = DcMotorState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "r_armature" => self.params.r_armature = positive(value, "r_armature")?,
            "l_armature" => self.params.l_armature = positive(value, "l_armature")?,
            "k_v" => self.params.k_v = positive(value, "k_v")?,
            "k_t" => self.params.k_t = positive(value, "k_t")?,
            "inertia" => self.params.inertia = positive(value, "inertia")?,
            "friction" => self.params.friction = value.max(0.0),
            "torque_load" => self.params.torque_load = value.max(0.0),
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "r_armature" => Some(self.params.r_armature),
            "l_armature" => Some(self.params.l_armature),
            "k_v" => Some(self.params.k_v),
            "k_t" => Some(self.params.k_t),
            "inertia" => Some(self.params.inertia),
            "friction" => Some(self.params.friction),
            "torque_load" => Some(self.params.torque_load),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use voltlab_core::Environment;

    #[test]
    fn test_spin_up_and_back_emf() {
        let mut motor = DcMotor::default();
        let mut env = Environment::default();
        let mut events = Vec::new();
        let nodes = [Some(0), None];
        let dt = 1e-3;

        // Feed a constant armature current; ω should rise towards the
        // steady state where friction torque balances.
        for step in 1..=100_000 {
            let x = DVector::from_vec(vec![6.0, 0.5]);
            let mut ctx = CommitCtx {
                nodes: &nodes,
                extra: Some(1),
                dt,
                time: step as f64 * dt,
                x: &x,
                env: &mut env,
                events: &mut events,
            };
            motor.commit(&mut ctx);
        }
        // Steady state: ω = K_t·I / friction = 0.05·0.5 / 1e-5
        assert!((motor.state.omega - 2500.0).abs() / 2500.0 < 0.01);
    }

    #[test]
    fn test_omega_clamped_non_negative() {
        let mut motor = DcMotor::default();
        motor.params.torque_load = 1.0;
        let mut env = Environment::default();
        let mut events = Vec::new();
        let nodes = [Some(0), None];
        let x = DVector::from_vec(vec![0.0, 0.0]);
        let mut ctx = CommitCtx {
            nodes: &nodes,
            extra: Some(1),
            dt: 1e-3,
            time: 1e-3,
            x: &x,
            env: &mut env,
            events: &mut events,
        };
        motor.commit(&mut ctx);
        assert_eq!(motor.state.omega, 0.0);
    }

    #[test]
    fn test_branch_equation_includes_back_emf() {
        let mut motor = DcMotor::default();
        motor.state.omega = 100.0;
        let mut mna = MnaSystem::new(2, 1);
        let env = Environment::default();
        let x = DVector::zeros(3);
        let nodes = [Some(0), Some(1)];
        let ctx = StampCtx {
            nodes: &nodes,
            extra: Some(2),
            dt: 1e-3,
            time: 0.0,
            x_prev: &x,
            env: &env,
        };
        motor.stamp(&mut mna, &ctx);
        // rhs = K_v·ω = 5 with zero prior current.
        assert!((mna.rhs()[2] - 5.0).abs() < 1e-12);
    }
}
