//! Bipolar junction transistors.
//!
//! Ideal mode is the textbook forward model: B-E junction plus a
//! transconductance feeding the collector. Non-ideal mode is a compact
//! Gummel-Poon: both junctions, Early effect on the transport current, and
//! junction leakage. PNP devices run the same equations on sign-flipped
//! junction voltages.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, stamp_linearized, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;
use crate::diode::linearize_junction;

const TERM_B: usize = 0;
const TERM_C: usize = 1;
const TERM_E: usize = 2;

/// Junction leakage conductance in non-ideal mode.
const G_LEAK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BjtPolarity {
    Npn,
    Pnp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BjtParams {
    pub polarity: BjtPolarity,
    pub is: f64,
    pub beta_f: f64,
    pub beta_r: f64,
    /// Forward Early voltage; 0 disables the Early effect.
    pub vaf: f64,
    pub ideal: bool,
}

impl BjtParams {
    pub fn new(polarity: BjtPolarity) -> Self {
        Self {
            polarity,
            is: 1e-14,
            beta_f: 100.0,
            beta_r: 2.0,
            vaf: 100.0,
            ideal: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BjtState {
    pub vbe: f64,
    pub vbc: f64,
    pub ic: f64,
    pub ib: f64,
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bjt {
    pub params: BjtParams,
    pub state: BjtState,
}

/// Model currents and their derivatives in the sign-normalised frame.
struct BjtOperatingPoint {
    ib: f64,
    ic: f64,
    gib_be: f64,
    gib_bc: f64,
    gic_be: f64,
    gic_bc: f64,
}

impl Bjt {
    pub fn new(polarity: BjtPolarity) -> Self {
        Self {
            params: BjtParams::new(polarity),
            state: BjtState::default(),
        }
    }

    fn sign(&self) -> f64 {
        match self.params.polarity {
            BjtPolarity::Npn => 1.0,
            BjtPolarity::Pnp => -1.0,
        }
    }

    /// Evaluate the model at sign-normalised junction voltages.
    fn operating_point(&self, vbe: f64, vbc: f64, vt: f64) -> BjtOperatingPoint {
        let p = &self.params;
        let jf = linearize_junction(vbe, p.is, vt);

        if p.ideal {
            return BjtOperatingPoint {
                ib: jf.i / p.beta_f,
                ic: jf.i,
                gib_be: jf.g / p.beta_f,
                gib_bc: 0.0,
                gic_be: jf.g,
                gic_bc: 0.0,
            };
        }

        let jr = linearize_junction(vbc, p.is, vt);
        // Early effect scales the transport current; q > 1 in the normal
        // active region where vbc < 0.
        let (q, dq_dvbc) = if p.vaf > 0.0 {
            ((1.0 - vbc / p.vaf).max(0.1), -1.0 / p.vaf)
        } else {
            (1.0, 0.0)
        };

        let it = (jf.i - jr.i) * q;
        let ib = jf.i / p.beta_f + jr.i / p.beta_r;
        let ic = it - jr.i / p.beta_r;

        BjtOperatingPoint {
            ib,
            ic,
            gib_be: jf.g / p.beta_f,
            gib_bc: jr.g / p.beta_r,
            gic_be: jf.g * q,
            gic_bc: -jr.g * q + (jf.i - jr.i) * dq_dvbc - jr.g / p.beta_r,
        }
    }
}

impl DeviceModel for Bjt {
    fn kind_name(&self) -> &'static str {
        match self.params.polarity {
            BjtPolarity::Npn => "bjt_npn",
            BjtPolarity::Pnp => "bjt_pnp",
        }
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // base, collector, emitter
        vec![(-2, 0), (2, -2), (2, 2)]
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let p = self.sign();
        let vt = ctx.env.thermal_voltage();
        let vbe = p * ctx.v_diff(TERM_B, TERM_E);
        let vbc = p * ctx.v_diff(TERM_B, TERM_C);
        let op = self.operating_point(vbe, vbc, vt);

        // Currents into the physical terminals.
        let i_b = p * op.ib;
        let i_c = p * op.ic;
        let i_e = -(i_b + i_c);

        // Chain rule through the sign flip: the p factors cancel in the
        // Jacobian, only the constants keep the polarity sign.
        let jb = [op.gib_be + op.gib_bc, -op.gib_bc, -op.gib_be];
        let jc = [op.gic_be + op.gic_bc, -op.gic_bc, -op.gic_be];
        let je = [-(jb[0] + jc[0]), -(jb[1] + jc[1]), -(jb[2] + jc[2])];

        stamp_linearized(
            mna,
            ctx,
            &[TERM_B, TERM_C, TERM_E],
            &[jb, jc, je],
            &[i_b, i_c, i_e],
        );

        if !self.params.ideal {
            mna.stamp_conductance(ctx.node(TERM_B), ctx.node(TERM_E), G_LEAK);
            mna.stamp_conductance(ctx.node(TERM_B), ctx.node(TERM_C), G_LEAK);
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let p = self.sign();
        let vt = ctx.env.thermal_voltage();
        let vbe = p * ctx.v_diff(TERM_B, TERM_E);
        let vbc = p * ctx.v_diff(TERM_B, TERM_C);
        let op = self.operating_point(vbe, vbc, vt);

        self.state.vbe = vbe;
        self.state.vbc = vbc;
        self.state.ic = p * op.ic;
        self.state.ib = p * op.ib;
        let vce = ctx.v_diff(TERM_C, TERM_E);
        self.state.power = (vce * self.state.ic).abs() + (ctx.v_diff(TERM_B, TERM_E) * self.state.ib).abs();
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.ic)
    }

    fn dissipated_power(&self) -> f64 {
        self.state.power
    }

    fn reset_state(&mut self) {
        self.state = BjtState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "is" => self.params.is = positive(value, "is")?,
            "beta_f" => self.params.beta_f = positive(value, "beta_f")?,
            "beta_r" => self.params.beta_r = positive(value, "beta_r")?,
            "vaf" => self.params.vaf = value.max(0.0),
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "is" => Some(self.params.is),
            "beta_f" => Some(self.params.beta_f),
            "beta_r" => Some(self.params.beta_r),
            "vaf" => Some(self.params.vaf),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltlab_core::Environment;

    #[test]
    fn test_ideal_beta_relation() {
        let q = Bjt::new(BjtPolarity::Npn);
        let env = Environment::default();
        let vt = env.thermal_voltage();
        let op = q.operating_point(0.65, -4.0, vt);
        assert!(op.ic > 0.0);
        assert!((op.ic / op.ib - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_early_effect_raises_ic() {
        let mut q = Bjt::new(BjtPolarity::Npn);
        q.params.ideal = false;
        let env = Environment::default();
        let vt = env.thermal_voltage();
        // Same vbe, deeper reverse vbc (larger vce) gives more collector
        // current.
        let lo = q.operating_point(0.65, -2.0, vt);
        let hi = q.operating_point(0.65, -10.0, vt);
        assert!(hi.ic > lo.ic);
    }

    #[test]
    fn test_cutoff_currents_negligible() {
        let q = Bjt::new(BjtPolarity::Npn);
        let env = Environment::default();
        let op = q.operating_point(0.0, -5.0, env.thermal_voltage());
        assert!(op.ic.abs() < 1e-12);
        assert!(op.ib.abs() < 1e-12);
    }

    #[test]
    fn test_pnp_mirror() {
        let npn = Bjt::new(BjtPolarity::Npn);
        let pnp = Bjt::new(BjtPolarity::Pnp);
        let env = Environment::default();
        let vt = env.thermal_voltage();
        // The pnp sees the same normalised junction drive when its node
        // voltages are mirrored; the physical currents flip sign.
        let op_n = npn.operating_point(0.65, -4.0, vt);
        let op_p = pnp.operating_point(0.65, -4.0, vt);
        assert!((op_n.ic - op_p.ic).abs() < 1e-18);
        assert_eq!(npn.sign(), -pnp.sign());
    }
}
