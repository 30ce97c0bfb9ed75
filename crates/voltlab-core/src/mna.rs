//! MNA (Modified Nodal Analysis) system assembly.
//!
//! The system `A·x = b` is accumulated additively: devices stamp
//! conductances and source terms, and stamping the same `(row, col)` twice
//! is equivalent to one stamp with the summed value. Matrix entries are
//! collected as triplets so the solver can choose a dense or sparse path;
//! the RHS is dense from the start.
//!
//! Solution layout: `[V₁ … V_N, extra₁ … extra_M]` — node voltages for the
//! N non-ground nodes first, then one row per extra variable (voltage
//! sources, inductors, op-amp outputs, ...). Ground has no row; stamps
//! addressed at ground are dropped.

use nalgebra::{DMatrix, DVector};

/// Accumulator for one MNA assembly pass.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// Number of non-ground node rows.
    pub num_nodes: usize,
    /// Number of extra-variable rows.
    pub num_extras: usize,
    /// Matrix entries as `(row, col, value)` triplets. Duplicates sum.
    pub triplets: Vec<(usize, usize, f64)>,
    rhs: DVector<f64>,
}

impl MnaSystem {
    pub fn new(num_nodes: usize, num_extras: usize) -> Self {
        Self {
            num_nodes,
            num_extras,
            triplets: Vec::new(),
            rhs: DVector::zeros(num_nodes + num_extras),
        }
    }

    /// Total number of unknowns (nodes + extra variables).
    pub fn size(&self) -> usize {
        self.num_nodes + self.num_extras
    }

    /// Matrix row of the `k`-th extra variable.
    pub fn extra_row(&self, k: usize) -> usize {
        self.num_nodes + k
    }

    /// Accumulate `value` into `A[row, col]`.
    pub fn stamp(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.size() && col < self.size());
        self.triplets.push((row, col, value));
    }

    /// Accumulate `value` into `b[row]`.
    pub fn stamp_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] += value;
    }

    /// Stamp a conductance `g` between two nodes (`None` = ground).
    pub fn stamp_conductance(&mut self, a: Option<usize>, b: Option<usize>, g: f64) {
        if let Some(i) = a {
            self.stamp(i, i, g);
            if let Some(j) = b {
                self.stamp(i, j, -g);
            }
        }
        if let Some(j) = b {
            self.stamp(j, j, g);
            if let Some(i) = a {
                self.stamp(j, i, -g);
            }
        }
    }

    /// Stamp an independent current source of `i` amps flowing from `from`
    /// to `to` (the current enters `to`).
    pub fn stamp_current_source(&mut self, from: Option<usize>, to: Option<usize>, i: f64) {
        if let Some(n) = to {
            self.rhs[n] += i;
        }
        if let Some(n) = from {
            self.rhs[n] -= i;
        }
    }

    /// Fold the triplets into a dense matrix.
    pub fn to_dense_matrix(&self) -> DMatrix<f64> {
        let n = self.size();
        let mut a = DMatrix::zeros(n, n);
        for &(r, c, v) in &self.triplets {
            a[(r, c)] += v;
        }
        a
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Reset all entries, keeping the layout.
    pub fn clear(&mut self) {
        self.triplets.clear();
        self.rhs.fill(0.0);
    }
}
