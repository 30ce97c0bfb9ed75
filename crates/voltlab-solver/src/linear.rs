//! Linear system solvers.
//!
//! The dense path (nalgebra LU with partial pivoting) is the reference;
//! systems at or above [`SPARSE_THRESHOLD`] unknowns go through faer's
//! sparse LU built from the assembly triplets.

use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use voltlab_core::MnaSystem;

use crate::error::{Error, Result};

/// Systems with this many or more unknowns use the sparse solver path.
pub const SPARSE_THRESHOLD: usize = 50;

/// Solve an assembled MNA system, choosing the dense or sparse path by size.
pub fn solve_mna(mna: &MnaSystem) -> Result<DVector<f64>> {
    if mna.size() >= SPARSE_THRESHOLD {
        solve_sparse(mna.size(), &mna.triplets, mna.rhs())
    } else {
        solve_dense(&mna.to_dense_matrix(), mna.rhs())
    }
}

/// Solve Ax = b by dense LU decomposition with partial pivoting.
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.nrows() != a.ncols() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: a.ncols(),
        });
    }
    if a.nrows() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: b.len(),
        });
    }

    let x = a.clone().lu().solve(b).ok_or(Error::SingularSystem)?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularSystem);
    }
    Ok(x)
}

/// Solve a sparse system built from `(row, col, value)` triplets.
///
/// Duplicate entries at the same position are summed, matching the
/// additive stamp contract of assembly.
pub fn solve_sparse(
    size: usize,
    triplets: &[(usize, usize, f64)],
    rhs: &DVector<f64>,
) -> Result<DVector<f64>> {
    if size != rhs.len() {
        return Err(Error::DimensionMismatch {
            expected: size,
            actual: rhs.len(),
        });
    }

    let faer_triplets: Vec<_> = triplets
        .iter()
        .map(|&(r, c, v)| Triplet::new(r, c, v))
        .collect();

    let sparse_mat = SparseColMat::<usize, f64>::try_new_from_triplets(size, size, &faer_triplets)
        .map_err(|_| Error::SingularSystem)?;

    let lu = sparse_mat.sp_lu().map_err(|_| Error::SingularSystem)?;

    let faer_rhs = Col::<f64>::from_fn(size, |i| rhs[i]);
    let faer_x = lu.solve(&faer_rhs);

    let x = DVector::from_fn(size, |i, _| faer_x[i]);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularSystem);
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_solve_simple() {
        // 2x + y = 5
        // x + 3y = 6
        let a = dmatrix![2.0, 1.0; 1.0, 3.0];
        let b = dvector![5.0, 6.0];

        let x = solve_dense(&a, &b).unwrap();

        assert!((x[0] - 1.8).abs() < 1e-10);
        assert!((x[1] - 1.4).abs() < 1e-10);
    }

    #[test]
    fn test_singular_matrix() {
        let a = dmatrix![1.0, 2.0; 2.0, 4.0];
        let b = dvector![1.0, 2.0];

        let result = solve_dense(&a, &b);
        assert!(matches!(result, Err(Error::SingularSystem)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = dmatrix![1.0, 2.0; 3.0, 4.0];
        let b = dvector![1.0, 2.0, 3.0];

        let result = solve_dense(&a, &b);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_sparse_matches_dense() {
        // Diagonally dominant band system.
        let size = 60;
        let mut triplets = Vec::new();
        for i in 0..size {
            triplets.push((i, i, size as f64 + 1.0));
            for &offset in &[1_usize, 2] {
                if i + offset < size {
                    let v = 1.0 / (offset as f64 + 1.0);
                    triplets.push((i, i + offset, v));
                    triplets.push((i + offset, i, v));
                }
            }
        }
        let b = DVector::from_fn(size, |i, _| (i + 1) as f64);

        let mut a = DMatrix::zeros(size, size);
        for &(r, c, v) in &triplets {
            a[(r, c)] += v;
        }

        let x_dense = solve_dense(&a, &b).unwrap();
        let x_sparse = solve_sparse(size, &triplets, &b).unwrap();

        for i in 0..size {
            assert!(
                (x_dense[i] - x_sparse[i]).abs() < 1e-10,
                "mismatch at [{}]: dense={}, sparse={}",
                i,
                x_dense[i],
                x_sparse[i]
            );
        }
    }

    #[test]
    fn test_duplicate_triplets_sum() {
        // A = [[3,1],[1,3]] with (0,0) split as 2.0 + 1.0; b = [4,4] → x = [1,1]
        let triplets = vec![(0, 0, 2.0), (0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)];
        let b = dvector![4.0, 4.0];

        let x = solve_sparse(2, &triplets, &b).unwrap();

        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!((x[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_solve_mna_dispatch() {
        let mut mna = MnaSystem::new(2, 0);
        mna.stamp_conductance(Some(0), None, 1.0);
        mna.stamp_conductance(Some(0), Some(1), 1.0);
        mna.stamp_conductance(Some(1), None, 1.0);
        mna.stamp_current_source(None, Some(0), 1.0);

        let x = solve_mna(&mna).unwrap();
        // Symmetric ladder: v0 = 2/3, v1 = 1/3.
        assert!((x[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((x[1] - 1.0 / 3.0).abs() < 1e-12);
    }
}
