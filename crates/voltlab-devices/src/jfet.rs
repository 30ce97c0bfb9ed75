//! Junction FETs, Shichman-Hodges model.
//!
//! The channel is the MOSFET square law with `Kp = 2·Idss/Vp²` and the
//! pinch-off voltage playing the threshold role. P-channel devices run on
//! sign-flipped voltages like PMOS.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, stamp_linearized, CommitCtx, FieldError, ReadCtx, StampCtx};
use crate::device::DeviceModel;

const TERM_G: usize = 0;
const TERM_D: usize = 1;
const TERM_S: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JfetPolarity {
    N,
    P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JfetParams {
    pub polarity: JfetPolarity,
    /// Saturation current at vgs = 0.
    pub idss: f64,
    /// Pinch-off voltage, negative in the sign-normalised frame.
    pub vp: f64,
    pub lambda: f64,
}

impl JfetParams {
    pub fn new(polarity: JfetPolarity) -> Self {
        Self {
            polarity,
            idss: 10e-3,
            vp: -2.0,
            lambda: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JfetState {
    pub id: f64,
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jfet {
    pub params: JfetParams,
    pub state: JfetState,
}

impl Jfet {
    pub fn new(polarity: JfetPolarity) -> Self {
        Self {
            params: JfetParams::new(polarity),
            state: JfetState::default(),
        }
    }

    fn sign(&self) -> f64 {
        match self.params.polarity {
            JfetPolarity::N => 1.0,
            JfetPolarity::P => -1.0,
        }
    }

    /// Square-law channel for `vds >= 0`: returns (ids, gm, gds).
    fn shichman_hodges(&self, vgs: f64, vds: f64) -> (f64, f64, f64) {
        let vp = self.params.vp;
        let beta = self.params.idss / (vp * vp);
        let vgst = vgs - vp;
        if vgst <= 0.0 {
            return (0.0, 0.0, 0.0);
        }
        let clm = 1.0 + self.params.lambda * vds;
        if vds < vgst {
            let ids = beta * (2.0 * vgst - vds) * vds * clm;
            let gm = 2.0 * beta * vds * clm;
            let gds =
                2.0 * beta * (vgst - vds) * clm + beta * (2.0 * vgst - vds) * vds * self.params.lambda;
            (ids, gm, gds)
        } else {
            let ids = beta * vgst * vgst * clm;
            let gm = 2.0 * beta * vgst * clm;
            let gds = beta * vgst * vgst * self.params.lambda;
            (ids, gm, gds)
        }
    }

    fn channel(&self, vgs: f64, vds: f64) -> (f64, f64, f64) {
        if vds >= 0.0 {
            self.shichman_hodges(vgs, vds)
        } else {
            let (i2, gm2, gds2) = self.shichman_hodges(vgs - vds, -vds);
            (-i2, -gm2, gm2 + gds2)
        }
    }
}

impl DeviceModel for Jfet {
    fn kind_name(&self) -> &'static str {
        match self.params.polarity {
            JfetPolarity::N => "njfet",
            JfetPolarity::P => "pjfet",
        }
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        vec![(-2, 0), (2, -2), (2, 2)]
    }

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        let p = self.sign();
        let vgs = p * ctx.v_diff(TERM_G, TERM_S);
        let vds = p * ctx.v_diff(TERM_D, TERM_S);
        let (ids, gm, gds) = self.channel(vgs, vds);

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
    }

    fn commit(&mut self, ctx: &mut CommitCtx) {
        let p = self.sign();
        let vgs = p * ctx.v_diff(TERM_G, TERM_S);
        let vds = p * ctx.v_diff(TERM_D, TERM_S);
        let (ids, _, _) = self.channel(vgs, vds);
        self.state.id = p * ids;
        self.state.power = (ctx.v_diff(TERM_D, TERM_S) * self.state.id).abs();
    }

    fn branch_current(&self, _ctx: &ReadCtx) -> Option<f64> {
        Some(self.state.id)
    }

    fn dissipated_power(&self) -> f64 {
        self.state.power
    }

    fn reset_state(&mut self) {
        self.state = JfetState::default();
    }

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "idss" => self.params.idss = positive(value, "idss")?,
            "vp" => {
                if value >= 0.0 {
                    return Err(FieldError::OutOfRange {
                        reason: "pinch-off voltage must be negative".into(),
                    });
                }
                self.params.vp = value;
            }
            "lambda" => self.params.lambda = value.max(0.0),
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "idss" => Some(self.params.idss),
            "vp" => Some(self.params.vp),
            "lambda" => Some(self.params.lambda),
            _ => None,
        }
    }
}
