use nalgebra::{DMatrix, DVector};
use num_dual::{jacobian, DualDVec64};
use thiserror::Error;
use tracing::{debug, trace};

use super::Convergence;
use crate::discretization::DiscretizedModel;
use crate::error::ModelError;

/// Dense Newton iteration on the algebraic block of a discretised model,
/// holding the differential states fixed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewtonSolver {
    pub convergence: Convergence,
    pub max_iterations: u32,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self {
            convergence: Convergence::default(),
            max_iterations: 50,
        }
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("linear solve failed")]
    LinearSolveFailed,
    #[error("Newton's method failed to converge after {iterations} iterations (residual {residual:.3e})")]
    NonConvergence { iterations: u32, residual: f64 },
    #[error("event `{0}` is not positive at the initial conditions")]
    EventAtInitialConditions(String),
    #[error("state became non-finite at t = {0}")]
    NonFiniteState(f64),
    #[error("invalid time span: {0}")]
    InvalidTimeSpan(String),
}

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub solution: DVector<f64>,
    pub iterations: u32,
    pub final_residual: f64,
}

impl NewtonSolver {
    /// Make the algebraic states of `y` consistent at time `t`. Models without
    /// algebraic states are returned unchanged.
    pub fn solve_algebraic(
        &self,
        model: &DiscretizedModel,
        t: f64,
        initial_guess: DVector<f64>,
    ) -> Result<SolverResult, SolverError> {
        let n_diff = model.n_differential();
        let n_alg = model.n_algebraic();
        let mut y = initial_guess;
        if n_alg == 0 {
            return Ok(SolverResult {
                solution: y,
                iterations: 0,
                final_residual: 0.0,
            });
        }

        let mut initial_residual = None;
        let mut res_norm = f64::INFINITY;
        for i in 0..self.max_iterations {
            let (residual, jac) = algebraic_residual_and_jacobian(model, t, &y);
            res_norm = self.convergence.norm(&residual);
            let init = *initial_residual.get_or_insert(res_norm);
            trace!(iteration = i, residual = res_norm, "newton");

            if self.convergence.check_tolerance(res_norm, init) {
                debug!(iterations = i, residual = res_norm, t, "algebraic states consistent");
                return Ok(SolverResult {
                    solution: y,
                    iterations: i,
                    final_residual: res_norm,
                });
            }

            let delta = jac
                .lu()
                .solve(&-residual)
                .ok_or(SolverError::LinearSolveFailed)?;
            let mut algebraic = y.rows_mut(n_diff, n_alg);
            algebraic += delta;
        }

        Err(SolverError::NonConvergence {
            iterations: self.max_iterations,
            residual: res_norm,
        })
    }
}

/// Algebraic residual and its Jacobian with respect to the algebraic states only.
pub fn algebraic_residual_and_jacobian(
    model: &DiscretizedModel,
    t: f64,
    y: &DVector<f64>,
) -> (DVector<f64>, DMatrix<f64>) {
    let n_diff = model.n_differential();
    let n_alg = model.n_algebraic();
    let z = y.rows(n_diff, n_alg).into_owned();
    jacobian(
        |z: DVector<DualDVec64>| {
            let full = DVector::from_iterator(
                model.len(),
                y.rows(0, n_diff)
                    .iter()
                    .map(|v| DualDVec64::from(*v))
                    .chain(z.iter().cloned()),
            );
            model.rhs_algebraic(t, &full).rows(n_diff, n_alg).into_owned()
        },
        z,
    )
}
