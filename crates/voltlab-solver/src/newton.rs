//! Newton-Raphson outer loop for one simulation step.
//!
//! The solver owns only the numerics; the circuit side implements
//! [`AssembleSystem`] and re-stamps the MNA system around each iteration's
//! linearisation point. Linear circuits short-circuit to a single solve.

use nalgebra::DVector;
use voltlab_core::{MnaSystem, DIVERGENCE_BOUND};

use crate::error::{Error, Result};
use crate::linear::solve_mna;

/// A circuit that can be assembled into an MNA system around a guess.
pub trait AssembleSystem {
    /// Number of non-ground node rows.
    fn num_nodes(&self) -> usize;
    /// Number of extra-variable rows.
    fn num_extras(&self) -> usize;
    /// Whether any device needs Newton iteration.
    fn nonlinear(&self) -> bool;
    /// Stamp the full system using `guess` as the linearisation point.
    fn assemble(&mut self, guess: &DVector<f64>, mna: &mut MnaSystem);
}

/// Newton-Raphson convergence parameters.
#[derive(Debug, Clone, Copy)]
pub struct NewtonParams {
    pub abstol: f64,
    pub reltol: f64,
    pub max_iterations: usize,
}

impl Default for NewtonParams {
    fn default() -> Self {
        Self {
            abstol: 1e-6,
            reltol: 1e-4,
            max_iterations: 50,
        }
    }
}

/// A converged solve and how much work it took.
#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    pub x: DVector<f64>,
    pub iterations: usize,
}

/// Solve one step of the system, iterating while nonlinear stamps move the
/// solution.
///
/// Convergence: `‖x_new − x_guess‖_∞ ≤ abstol + reltol·‖x_new‖_∞`.
pub fn solve_system(
    sys: &mut dyn AssembleSystem,
    x_prev: &DVector<f64>,
    params: &NewtonParams,
) -> Result<NewtonOutcome> {
    let size = sys.num_nodes() + sys.num_extras();
    let mut x_guess = resize_guess(x_prev, size);

    let mut mna = MnaSystem::new(sys.num_nodes(), sys.num_extras());

    if !sys.nonlinear() {
        sys.assemble(&x_guess, &mut mna);
        let x = solve_mna(&mna)?;
        check_bounds(&x)?;
        return Ok(NewtonOutcome { x, iterations: 1 });
    }

    for iteration in 1..=params.max_iterations {
        mna.clear();
        sys.assemble(&x_guess, &mut mna);
        let x_new = solve_mna(&mna)?;
        check_bounds(&x_new)?;

        let delta = (&x_new - &x_guess).amax();
        let scale = params.abstol + params.reltol * x_new.amax();
        if delta <= scale {
            return Ok(NewtonOutcome {
                x: x_new,
                iterations: iteration,
            });
        }

        x_guess = x_new;
    }

    log::warn!(
        "newton failed to converge after {} iterations",
        params.max_iterations
    );
    Err(Error::NewtonFailed {
        iterations: params.max_iterations,
    })
}

fn check_bounds(x: &DVector<f64>) -> Result<()> {
    let peak = x.amax();
    if peak > DIVERGENCE_BOUND {
        return Err(Error::Diverged { value: peak });
    }
    Ok(())
}

fn resize_guess(x_prev: &DVector<f64>, size: usize) -> DVector<f64> {
    let mut guess = DVector::zeros(size);
    for i in 0..size.min(x_prev.len()) {
        guess[i] = x_prev[i];
    }
    guess
}
