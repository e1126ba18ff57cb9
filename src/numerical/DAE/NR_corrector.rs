//! # Newton-Raphson corrector of the BDF step
//!
//! At step size `h` and order `k` the BDF formula with a mass matrix reads
//! ```text
//! G(x) = M (psi + d) / c - f(x, t_new) = 0,    c = h / alpha_k,  d = x - x_predict
//! ```
//! where `psi = sum_{m=1..k} gamma_m D_m / alpha_k` collects the step history.
//! Every iteration evaluates `f`, builds the Jacobian `dG/dx = M/c - J` into a fresh
//! sparse matrix and solves
//! ```text
//! (M/c - J) dx = f - M (psi + d) / c
//! ```
//! Convergence is judged on the weighted RMS norm of `dx` and on the convergence rate
//! `rate = ||dx_k|| / ||dx_{k-1}||`.
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::common::scaled_norm;
use crate::numerical::DAE::jacobian_matrix::JacobianMatrix;
use crate::numerical::DAE::rhs::RHS;
use crate::numerical::DAE::solver_options::SolverOptions;
use crate::numerical::DAE::sparse_matrix::SparseMatrix;
use crate::numerical::DAE::statistics::SolverStatistics;
use crate::somelinalg::sparse_direct::LinearSolver;
use log::debug;
use nalgebra::DVector;
use std::time::Instant;

/// Result of one Newton solve.
#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    pub converged: bool,
    /// number of linear solves performed
    pub n_iter: usize,
    /// corrected state
    pub x: DVector<f64>,
    /// total correction `x - x_predict`
    pub d: DVector<f64>,
    /// weighted norms of the Newton updates
    pub dy_norms: Vec<f64>,
}

/// Borrowed collaborators of the corrector.
pub struct NewtonCorrector<'a> {
    pub rhs: &'a dyn RHS<f64>,
    pub jac: &'a mut dyn JacobianMatrix,
    pub linear_solver: &'a mut dyn LinearSolver,
    pub opt: &'a SolverOptions,
    pub stats: &'a mut SolverStatistics,
}

impl<'a> NewtonCorrector<'a> {
    /// Assembles `M/c - J(x, t)` in CSR form.
    fn iteration_matrix(
        &mut self,
        M: &SparseMatrix,
        x: &DVector<f64>,
        t: f64,
        c: f64,
    ) -> Result<nalgebra_sparse::CsrMatrix<f64>, SolverError> {
        let n = x.len();
        let begin = Instant::now();
        let mut J = SparseMatrix::new();
        self.jac.jacobian(&mut J, x.as_slice(), t, self.opt)?;
        self.stats.add_jac_time(begin.elapsed());

        let mut A = SparseMatrix::with_capacity(M.N_elements() + J.N_elements());
        A.extend_scaled(M, 1.0 / c);
        A.extend_scaled(&J, -1.0);
        A.compress(n)
    }

    /// Solves `G(x) = 0` starting from `x_predict`. `M` is the mass matrix at `t_new`,
    /// `scale` the error weights. Linear solver and Jacobian failures are propagated;
    /// slow or diverging iterations return `converged = false`.
    pub fn solve(
        &mut self,
        M: &SparseMatrix,
        t_new: f64,
        x_predict: &DVector<f64>,
        psi: &DVector<f64>,
        c: f64,
        scale: &DVector<f64>,
        tol: f64,
    ) -> Result<NewtonOutcome, SolverError> {
        let n = x_predict.len();
        let max_iter = self.opt.max_Newton_iter;
        let mut x = x_predict.clone();
        let mut d = DVector::zeros(n);
        let mut f = vec![0.0; n];
        let mut dy_norm_old: Option<f64> = None;
        let mut dy_norms = Vec::with_capacity(max_iter);
        let mut converged = false;
        let mut n_iter = 0;

        for k in 0..max_iter {
            let begin = Instant::now();
            self.rhs.rhs(&mut f, x.as_slice(), t_new);
            self.stats.add_rhs_time(begin.elapsed());
            if !f.iter().all(|fi| fi.is_finite()) {
                debug!("non-finite residual at t = {}", t_new);
                break;
            }

            let A = self.iteration_matrix(M, &x, t_new, c)?;
            let b = DVector::from_column_slice(&f) - M.dot(&(psi + &d)) / c;

            let begin = Instant::now();
            let dy = self.linear_solver.solve(&A, &b)?;
            self.stats.add_linear_system_time(begin.elapsed());
            self.stats.newton_iterations += 1;
            n_iter = k + 1;

            let dy_norm = scaled_norm(&dy, scale);
            let rate = dy_norm_old.map(|old| dy_norm / old);
            // too slow or diverging
            if let Some(rate) = rate {
                if rate >= 1.0
                    || rate.powi((max_iter - k) as i32) / (1.0 - rate) * dy_norm > tol
                {
                    break;
                }
            }

            x += &dy;
            d += &dy;
            dy_norms.push(dy_norm);

            if dy_norm == 0.0 || (rate.is_none() && dy_norm < tol) {
                converged = true;
                break;
            }
            if let Some(rate) = rate {
                if rate / (1.0 - rate) * dy_norm < tol {
                    converged = true;
                    break;
                }
            }
            dy_norm_old = Some(dy_norm);
        }

        Ok(NewtonOutcome {
            converged,
            n_iter,
            x,
            d,
            dy_norms,
        })
    }
}
