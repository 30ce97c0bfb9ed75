//! MOSFETs: SPICE Level-1 square-law channel with Meyer gate-capacitance
//! companions.
//!
//! The channel is linearised around the Newton guess each iteration. The
//! gate capacitances use the trapezoidal companion (`G = 2C/Δt`) with a
//! region-dependent Meyer split; the split is re-evaluated at commit so
//! the companion stays consistent within a step.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, stamp_linearized, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;

const TERM_G: usize = 0;
const TERM_D: usize = 1;
const TERM_S: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MosPolarity {
    Nmos,
    Pmos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosfetParams {
    pub polarity: MosPolarity,
    /// Zero-bias threshold voltage (positive for both polarities).
    pub vth: f64,
    /// Transconductance parameter Kp·W/L in A/V².
    pub kp: f64,
    /// Channel-length modulation, non-ideal mode only.
    pub lambda: f64,
    /// Body-effect coefficient (V^0.5); the body is tied to the source.
    pub gamma: f64,
    /// Surface potential for the body effect.
    pub phi: f64,
    /// Total gate-channel oxide capacitance.
    pub c_gate: f64,
    /// Gate-drain/source overlap capacitance.
    pub c_overlap: f64,
    pub ideal: bool,
}

impl MosfetParams {
    pub fn new(polarity: MosPolarity) -> Self {
        Self {
            polarity,
            vth: 1.5,
            kp: 1e-3,
            lambda: 0.01,
            gamma: 0.5,
            phi: 0.6,
            c_gate: 1e-12,
            c_overlap: 0.1e-12,
            ideal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosfetState {
    /// Physical gate-source voltage at the last commit.
    pub vgs: f64,
    /// Physical gate-drain voltage at the last commit.
    pub vgd: f64,
    /// Trapezoidal companion currents of the gate capacitors.
    pub igs: f64,
    pub igd: f64,
    /// Meyer capacitances used for the next step's companions.
    pub cgs: f64,
    pub cgd: f64,
    /// Drain current of the last committed step.
    pub id: f64,
    pub power: f64,
}

impl Default for MosfetState {
    fn default() -> Self {
        Self {
            vgs: 0.0,
            vgd: 0.0,
            igs: 0.0,
            igd: 0.0,
            cgs: 0.0,
            cgd: 0.0,
            id: 0.0,
            power: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mosfet {
    pub params: MosfetParams,
    pub state: MosfetState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Cutoff,
    Triode,
    Saturation,
}

impl Mosfet {
    pub fn new(polarity: MosPolarity) -> Self {
        let params = MosfetParams::new(polarity);
        let cov = params.c_overlap;
        Self {
            params,
            state: MosfetState {
                cgs: cov,
                cgd: cov,
                ..Default::default()
            },
        }
    }

    fn sign(&self) -> f64 {
        match self.params.polarity {
            MosPolarity::Nmos => 1.0,
            MosPolarity::Pmos => -1.0,
        }
    }

    /// Threshold voltage after temperature and body-effect adjustment.
    ///
    /// With the body tied to the source `vsb` is zero in-circuit; the
    /// adjustment formula is still the Level-1 one.
    pub fn effective_vth(&self, vsb: f64, temperature_c: f64) -> f64 {
        let mut vth = self.params.vth;
        if !self.params.ideal {
            vth -= 2e-3 * (temperature_c - 25.0);
            if self.params.gamma > 0.0 {
                let phi = self.params.phi.max(1e-3);
                vth += self.params.gamma * ((phi + vsb.max(0.0)).sqrt() - phi.sqrt());
            }
        }
        vth
    }

    fn effective_kp(&self, temperature_c: f64) -> f64 {
        if self.params.ideal {
            self.params.kp
        } else {
            let t_ratio = (temperature_c + 273.15) / 298.15;
            self.params.kp * t_ratio.powf(-1.5)
        }
    }

    /// Square-law model for `vds >= 0`: returns (ids, gm, gds, region).
    fn level1(&self, vgs: f64, vds: f64, temperature_c: f64) -> (f64, f64, f64, Region) {
        let vth = self.effective_vth(0.0, temperature_c);
        let kp = self.effective_kp(temperature_c);
        let vgst = vgs - vth;

        if vgst <= 0.0 {
            return (0.0, 0.0, 0.0, Region::Cutoff);
        }

        let lam = if self.params.ideal { 0.0 } else { self.params.lambda };
        let clm = 1.0 + lam * vds;

        if vds < vgst {
            let ids = kp * (vgst - 0.5 * vds) * vds * clm;
            let gm = kp * vds * clm;
            let gds = kp * (vgst - vds) * clm + kp * (vgst - 0.5 * vds) * vds * lam;
            (ids, gm, gds, Region::Triode)
        } else {
            let ids = 0.5 * kp * vgst * vgst * clm;
            let gm = kp * vgst * clm;
            let gds = 0.5 * kp * vgst * vgst * lam;
            (ids, gm, gds, Region::Saturation)
        }
    }

    /// Channel evaluation handling reverse conduction by swapping the
    /// drain/source roles. Returns (ids, gm, gds, region) in the
    /// sign-normalised frame.
    fn channel(&self, vgs: f64, vds: f64, temperature_c: f64) -> (f64, f64, f64, Region) {
        if vds >= 0.0 {
            self.level1(vgs, vds, temperature_c)
        } else {
            let vgd = vgs - vds;
            let (i2, gm2, gds2, region) = self.level1(vgd, -vds, temperature_c);
            (-i2, -gm2, gm2 + gds2, region)
        }
    }

    /// Meyer capacitance split for a channel region.
    fn meyer_caps(&self, region: Region) -> (f64, f64) {
        let cox = self.params.c_gate;
        let cov = self.params.c_overlap;
        match region {
            Region::Cutoff => (cov, cov),
            Region::Triode => (0.5 * cox + cov, 0.5 * cox + cov),
            Region::Saturation => (2.0 / 3.0 * cox + cov, cov),
        }
    }
}

impl DeviceModel for Mosfet {
    fn kind_name(&self) -> &'static str {
        match self.params.polarity {
            MosPolarity::Nmos => "nmos",
            MosPolarity::Pmos => "pmos",
        }
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        // gate, drain, source
        vec![(-2, 0), (2, -2), (2, 2)]
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let p = self.sign();
        let vgs = p * ctx.v_diff(TERM_G, TERM_S);
        let vds = p * ctx.v_diff(TERM_D, TERM_S);
        let (ids, gm, gds, _) = self.channel(vgs, vds, ctx.env.temperature_c);

        let i_d = p * ids;
        let jd = [gm, gds, -(gm + gds)];
        let js = [-gm, -gds, gm + gds];
        stamp_linearized(
            mna,
            ctx,
            &[TERM_G, TERM_D, TERM_S],
            &[[0.0; 3], jd, js],
            &[0.0, i_d, -i_d],
        );

        // Gate capacitance companions (trapezoidal), driven entirely by
        // committed state so they stay linear within the step.
        if ctx.dt > 0.0 {
            let g_gs = 2.0 * self.state.cgs / ctx.dt;
            if g_gs > 0.0 {
                let ieq = g_gs * self.state.vgs + self.state.igs;
                mna.stamp_conductance(ctx.node(TERM_G), ctx.node(TERM_S), g_gs);
                mna.stamp_current_source(ctx.node(TERM_S), ctx.node(TERM_G), ieq);
            }
            let g_gd = 2.0 * self.state.cgd / ctx.dt;
            if g_gd > 0.0 {
                let ieq = g_gd * self.state.vgd + self.state.igd;
                mna.stamp_conductance(ctx.node(TERM_G), ctx.node(TERM_D), g_gd);
                mna.stamp_current_source(ctx.node(TERM_D), ctx.node(TERM_G), ieq);
            }
        }
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let p = self.sign();
        let vgs_n = p * ctx.v_diff(TERM_G, TERM_S);
        let vds_n = p * ctx.v_diff(TERM_D, TERM_S);
        let (ids, _, _, region) = self.channel(vgs_n, vds_n, ctx.env.temperature_c);
        self.state.id = p * ids;
        self.state.power = (ctx.v_diff(TERM_D, TERM_S) * self.state.id).abs();

        // Advance the gate-cap companions with the capacitances that were
        // actually stamped, then pick the Meyer split for the next step.
        let vgs_phys = ctx.v_diff(TERM_G, TERM_S);
        let vgd_phys = ctx.v_diff(TERM_G, TERM_D);
        if ctx.dt > 0.0 {
            self.state.igs =
                2.0 * self.state.cgs / ctx.dt * (vgs_phys - self.state.vgs) - self.state.igs;
            self.state.igd =
                2.0 * self.state.cgd / ctx.dt * (vgd_phys - self.state.vgd) - self.state.igd;
        }
        self.state.vgs = vgs_phys;
        self.state.vgd = vgd_phys;
        let (cgs, cgd) = self.meyer_caps(region);
        self.state.cgs = cgs;
        self.state.cgd = cgd;
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.id)
    }

    fn dissipated_power(&self) -> f64 {
        self.state.power
    }

    fn reset_state(&mut self) {
        let cov = self.params.c_overlap;
        self.state = MosfetState {
            cgs: cov,
            cgd: cov,
            ..Default::default()
        };
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "vth" => self.params.vth = value,
            "kp" => self.params.kp = positive(value, "kp")?,
            "lambda" => self.params.lambda = value.max(0.0),
            "gamma" => self.params.gamma = value.max(0.0),
            "phi" => self.params.phi = positive(value, "phi")?,
            "c_gate" => self.params.c_gate = value.max(0.0),
            "c_overlap" => self.params.c_overlap = value.max(0.0),
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "vth" => Some(self.params.vth),
            "kp" => Some(self.params.kp),
            "lambda" => Some(self.params.lambda),
            "gamma" => Some(self.params.gamma),
            "phi" => Some(self.params.phi),
            "c_gate" => Some(self.params.c_gate),
            "c_overlap" => Some(self.params.c_overlap),
            "ideal" => Some(self.params.ideal as u8 as f64),
            _ => None,
        }
    }
}
