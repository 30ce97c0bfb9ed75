//! Transformers.
//!
//! The coupling is a symmetric admittance block: the secondary sees a
//! Thevenin source `N·V_prim` behind `1/G_src`, and the primary carries
//! the reflected current `N·I_sec`, which makes the ideal part lossless.
//! A magnetising resistance across the primary keeps the unloaded port
//! defined; non-ideal mode folds the winding resistances into the series
//! branch.

use serde::{Deserialize, Serialize};
use voltlab_core::MnaSystem;

use crate::ctx::{positive, CommitCtx, FieldError, StampCtx};
use crate::device::DeviceModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerParams {
    /// Secondary/primary turns ratio.
    pub turns_ratio: f64,
    /// Magnetising resistance across the primary.
    pub r_mag: f64,
    /// Series conductance of the coupling branch.
    pub g_src: f64,
    /// Per-winding DC resistances, non-ideal mode.
    pub r_primary: f64,
    pub r_secondary: f64,
    pub center_tapped: bool,
    pub ideal: bool,
}

impl Default for TransformerParams {
    fn default() -> Self {
        Self {
            turns_ratio: 2.0,
            r_mag: 1e5,
            g_src: 10.0,
            r_primary: 0.5,
            r_secondary: 0.5,
            center_tapped: false,
            ideal: true,
        }
    }
}

/// Terminals: `[p+, p−, s+, s−]`, with a centre tap appended as terminal 4
/// when `center_tapped` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub params: TransformerParams,
}

impl Transformer {
    /// Effective series conductance of one coupling branch with ratio `n`.
    fn coupling_g(&self, n: f64) -> f64 {
        if self.params.ideal {
            self.params.g_src
        } else {
            // Winding resistances in series with the branch; the primary
            // one reflects through the turns ratio.
            let r_series =
                1.0 / self.params.g_src + self.params.r_secondary + n * n * self.params.r_primary;
            1.0 / r_series
        }
    }

    /// Stamp one winding coupling enforcing `V(s) ≈ n·V(p)`.
    ///
    /// Admittance block `g·[n², −n; −n, 1]` over the port voltages, which
    /// is symmetric and positive semidefinite.
    fn stamp_coupling(
        &self,
        mna: &mut MnaSystem,
        ctx: &StampCtx,
        n: f64,
        prim: (usize, usize),
        sec: (usize, usize),
    ) {
        let g = self.coupling_g(n);
        let ports = [
            (ctx.node(prim.0), n),
            (ctx.node(prim.1), -n),
            (ctx.node(sec.0), -1.0),
            (ctx.node(sec.1), 1.0),
        ];
        for &(row, wr) in &ports {
            let Some(r) = row else { continue };
            for &(col, wc) in &ports {
                if let Some(c) = col {
                    mna.stamp(r, c, g * wr * wc);
                }
            }
        }
    }
}

impl DeviceModel for Transformer {
    fn kind_name(&self) -> &'static str {
        if self.params.center_tapped {
            "transformer_ct"
        } else {
            "transformer"
        }
    }

    fn terminal_count(&self) -> usize {
        if self.params.center_tapped {
            5
        } else {
            4
        }
    }

    fn terminal_offsets(&self) -> Vec<(i32, i32)> {
        let mut offs = vec![(-2, -1), (-2, 1), (2, -1), (2, 1)];
        if self.params.center_tapped {
            offs.push((2, 0));
        }
        offs
    }

    fn stamp(&self, mna: &mut MnaSystem, ctx: &StampCtx) {
        mna.stamp_conductance(ctx.node(0), ctx.node(1), 1.0 / self.params.r_mag);

        let n = self.params.turns_ratio;
        if self.params.center_tapped {
            // Two half windings of N/2 sharing the centre node.
            self.stamp_coupling(mna, ctx, n / 2.0, (0, 1), (2, 4));
            self.stamp_coupling(mna, ctx, n / 2.0, (0, 1), (4, 3));
        } else {
            self.stamp_coupling(mna, ctx, n, (0, 1), (2, 3));
        }
    }

    fn commit(&mut self, _ctx: &mut CommitCtx) {}

    fn reset_state(&mut self) {}

    fn set_field(&mut self, field: &str, value: f64) -> Result<(), FieldError> {
        match field {
            "turns_ratio" => self.params.turns_ratio = positive(value, "turns_ratio")?,
            "r_mag" => self.params.r_mag = positive(value, "r_mag")?,
            "r_primary" => self.params.r_primary = value.max(0.0),
            "r_secondary" => self.params.r_secondary = value.max(0.0),
            "center_tapped" => self.params.center_tapped = value != 0.0,
            "ideal" => self.params.ideal = value != 0.0,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_field(&self, field: &str) -> Option<f64> {
        match field {
            "turns_ratio" => Some(self.params.turns_ratio),
            "r_mag" => Some(self.params.r_mag),
            "r_primary" => Some(self.params.r_primary),
            "r_secondary" => Some(self.params.r_secondary),
            "center_tapped" => Some(self.params.center_tapped as u8 as f64),
            "ideal" => Some(self.params.ideal as u8 as f64),
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
    fn test_coupling_block_symmetric() {
        let tr = Transformer::default();
        let mut mna = MnaSystem::new(4, 0);
        let env = Environment::default();
        let x = DVector::zeros(4);
        let nodes = [Some(0), Some(1), Some(2), Some(3)];
        let ctx = StampCtx {
            nodes: &nodes,
            extra: None,
            dt: 1e-6,
            time: 0.0,
            x_prev: &x,
            env: &env,
        };
        tr.stamp(&mut mna, &ctx);
        let a = mna.to_dense_matrix();
        for r in 0..4 {
            for c in 0..4 {
                assert!(
                    (a[(r, c)] - a[(c, r)]).abs() < 1e-12,
                    "asymmetric at ({r},{c})"
                );
            }
        }
        // Secondary diagonal carries g_src.
        assert!((a[(2, 2)] - 10.0).abs() < 1e-12);
        // Cross coupling is -n·g.
        assert!((a[(2, 0)] + 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_nonideal_series_resistance_lowers_g() {
        let mut tr = Transformer::default();
        tr.params.ideal = false;
        let g = tr.coupling_g(2.0);
        // 1/g = 0.1 + 0.5 + 4·0.5 = 2.6
        assert!((g - 1.0 / 2.6).abs() < 1e-12);
    }
}
