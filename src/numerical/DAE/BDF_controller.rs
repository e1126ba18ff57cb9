//! # Variable order BDF step controller
//!
//! The step history is kept as an array of modified divided differences `D`
//! (`BDF_MAX_ORDER + 3` rows, one column per unknown):
//!
//! ```text
//! D[0] = x_n                      (last accepted state)
//! D[1] = h x'_n                   (after initialization)
//! D[k] = k-th scaled backward difference
//! ```
//!
//! One step of order `k` and size `h`:
//! 1. **Prediction**: `x_predict = D[0] + ... + D[k]`;
//! 2. **Correction**: Newton iterations on `M (psi + d)/c = f(x, t+h)`, `c = h/alpha_k`,
//!    `psi = (gamma_1 D[1] + ... + gamma_k D[k]) / alpha_k`;
//! 3. **Error estimate**: `E = C_k d` with the error constant `C_k` of order `k`;
//! 4. **Accept/reject**: `||E / (atol + rtol |x|)||_RMS <= 1`;
//! 5. **Order/step selection** after `k + 1` steps of equal size: orders `k-1, k, k+1`
//!    are compared by the step factor each of them would allow.
//!
//! When the step size changes by `factor` the differences are rescaled with
//! `D <- (R(factor) U)^T D` (see [`change_D`]).
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::NR_corrector::NewtonCorrector;
use crate::numerical::DAE::common::{first_step, min_step, scale_func, scaled_norm};
use crate::numerical::DAE::jacobian_matrix::JacobianMatrix;
use crate::numerical::DAE::mass_matrix::MassMatrix;
use crate::numerical::DAE::rhs::RHS;
use crate::numerical::DAE::solver_options::{BDF_MAX_ORDER, SolverOptions};
use crate::numerical::DAE::sparse_matrix::SparseMatrix;
use crate::numerical::DAE::statistics::SolverStatistics;
use crate::somelinalg::sparse_direct::LinearSolver;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use std::ops::AddAssign;
use std::time::Instant;

const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
/// consecutive failures of one kind after which the order is lowered
const FAILURES_BEFORE_ORDER_DROP: usize = 3;

/// Everything a step needs besides the controller state.
pub struct Problem<'a> {
    pub rhs: &'a dyn RHS<f64>,
    pub jac: &'a mut dyn JacobianMatrix,
    pub mass: &'a dyn MassMatrix,
    pub linear_solver: &'a mut dyn LinearSolver,
    pub opt: &'a SolverOptions,
    pub stats: &'a mut SolverStatistics,
}

impl<'a> Problem<'a> {
    fn corrector(&mut self) -> NewtonCorrector<'_> {
        NewtonCorrector {
            rhs: self.rhs,
            jac: &mut *self.jac,
            linear_solver: &mut *self.linear_solver,
            opt: self.opt,
            stats: &mut *self.stats,
        }
    }

    /// `M(t)` checked against the system size.
    fn assemble_mass(&mut self, t: f64, n: usize) -> Result<SparseMatrix, SolverError> {
        let mut M = SparseMatrix::with_capacity(n);
        self.mass.mass_matrix(&mut M, t);
        self.stats.mass_evaluations += 1;
        M.check(n)?;
        Ok(M)
    }
}

/// BDF coefficients for orders `0..=BDF_MAX_ORDER`.
///
/// ```text
/// gamma_k       = sum_{i=1..k} 1/i
/// alpha_k       = (1 - kappa_k) gamma_k
/// error_const_k = kappa_k gamma_k + 1/(k+1)
/// ```
/// `kappa` are the NDF coefficients of Shampine and Reichelt (zero at order 6: plain BDF6).
#[derive(Debug, Clone)]
pub struct BDFCoefficients {
    pub gamma: DVector<f64>,
    pub alpha: DVector<f64>,
    pub error_const: DVector<f64>,
}

impl BDFCoefficients {
    pub fn new() -> Self {
        let kappa = DVector::from_vec(vec![0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0, 0.0]);
        let gamma = {
            let mut g = vec![0.0];
            let mut cumsum = 0.0;
            for i in 1..=BDF_MAX_ORDER {
                cumsum += 1.0 / (i as f64);
                g.push(cumsum);
            }
            DVector::from_vec(g)
        };
        let alpha = (DVector::from_element(BDF_MAX_ORDER + 1, 1.0) - &kappa).component_mul(&gamma);
        let error_const = kappa.component_mul(&gamma)
            + DVector::from_iterator(
                BDF_MAX_ORDER + 1,
                (1..=BDF_MAX_ORDER + 1).map(|i| 1.0 / i as f64),
            );
        BDFCoefficients {
            gamma,
            alpha,
            error_const,
        }
    }
}

impl Default for BDFCoefficients {
    fn default() -> Self {
        Self::new()
    }
}

fn cumulative_product_along_columns(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = matrix.shape();
    let mut result = DMatrix::zeros(rows, cols);
    for col in 0..cols {
        let mut cumprod = 1.0;
        for row in 0..rows {
            cumprod *= matrix[(row, col)];
            result[(row, col)] = cumprod;
        }
    }
    result
}

/// `R[i,j] = prod_{m=1..i} (m - 1 - factor j) / m`, `R[0,j] = 1`
pub fn compute_r(order: usize, factor: f64) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(order + 1, order + 1);
    for i in 1..(order + 1) {
        for j in 1..(order + 1) {
            m[(i, j)] = (i as f64 - 1.0 - factor * j as f64) / i as f64;
        }
    }
    m.row_mut(0).fill(1.0);
    cumulative_product_along_columns(&m)
}

/// Rescales the differences `D[0..=order]` for a step size multiplied by `factor`.
pub fn change_D(D: &mut DMatrix<f64>, order: usize, factor: f64) {
    let r = compute_r(order, factor);
    let u = compute_r(order, 1.0);
    let ru = r * u;
    let temp = ru.transpose() * D.rows(0, order + 1);
    D.rows_mut(0, order + 1).copy_from(&temp);
}

/// State of one integration: time, accepted solution, step history, order and step size.
#[derive(Debug, Clone)]
pub struct BDFController {
    pub t: f64,
    pub x: DVector<f64>,
    pub order: usize,
    pub h_abs: f64,
    D: DMatrix<f64>,
    coeffs: BDFCoefficients,
    max_order: usize,
    newton_tol: f64,
    n_equal_steps: usize,
    newton_failures: usize,
    error_failures: usize,
    mass_cache: Option<SparseMatrix>,
}

impl BDFController {
    /// Sets up the history for an integration starting at `(x0, t0)` towards `t1`.
    ///
    /// `D[1] = h0 x'_0`. For the identity mass matrix `x'_0 = f(x0, t0)`; otherwise
    /// `(M - h0 J) x'_0 = f(x0, t0)` is solved, and if that system is singular the
    /// integration starts from `x'_0 = 0`.
    pub fn new(
        problem: &mut Problem,
        x0: DVector<f64>,
        t0: f64,
        t1: f64,
    ) -> Result<Self, SolverError> {
        let opt = problem.opt;
        let n = x0.len();
        let h0 = first_step(opt.dt_init, opt.dt_max, t0, t1);

        let begin = Instant::now();
        let mut f0 = vec![0.0; n];
        problem.rhs.rhs(&mut f0, x0.as_slice(), t0);
        problem.stats.add_rhs_time(begin.elapsed());
        if !f0.iter().all(|fi| fi.is_finite()) {
            return Err(SolverError::ConfigurationError(format!(
                "right hand side is not finite at the initial state (t = {})",
                t0
            )));
        }
        let f0 = DVector::from_vec(f0);

        let mass_cache = if problem.mass.is_constant() {
            Some(problem.assemble_mass(t0, n)?)
        } else {
            None
        };

        let xp0 = if problem.mass.is_identity() {
            let M0 = match &mass_cache {
                Some(M) => M.clone(),
                None => problem.assemble_mass(t0, n)?,
            };
            if M0.dense(n) != DMatrix::identity(n, n) {
                return Err(SolverError::ConfigurationError(format!(
                    "mass matrix reported as identity is not the {}x{} identity ({} elements)",
                    n,
                    n,
                    M0.N_elements()
                )));
            }
            f0
        } else {
            let M0 = match &mass_cache {
                Some(M) => M.clone(),
                None => problem.assemble_mass(t0, n)?,
            };
            match Self::initial_derivative(problem, &M0, &x0, &f0, t0, h0) {
                Ok(xp0) => xp0,
                Err(e @ SolverError::LinearSolveFailure(_)) => {
                    warn!("initial derivative could not be computed ({}), zero is used", e);
                    DVector::zeros(n)
                }
                Err(e) => return Err(e),
            }
        };

        let mut D = DMatrix::zeros(BDF_MAX_ORDER + 3, n);
        D.set_row(0, &x0.transpose());
        D.set_row(1, &(xp0 * h0).transpose());
        info!("created history matrix of size: {} x {}", D.nrows(), D.ncols());

        Ok(BDFController {
            t: t0,
            x: x0,
            order: 1,
            h_abs: h0,
            D,
            coeffs: BDFCoefficients::new(),
            max_order: opt.bdf_order.clamp(1, BDF_MAX_ORDER),
            newton_tol: opt.newton_tol(),
            n_equal_steps: 0,
            newton_failures: 0,
            error_failures: 0,
            mass_cache,
        })
    }

    /// Solves `(M - h0 J) x' = f0`.
    fn initial_derivative(
        problem: &mut Problem,
        M0: &SparseMatrix,
        x0: &DVector<f64>,
        f0: &DVector<f64>,
        t0: f64,
        h0: f64,
    ) -> Result<DVector<f64>, SolverError> {
        let n = x0.len();
        let begin = Instant::now();
        let mut J = SparseMatrix::new();
        problem.jac.jacobian(&mut J, x0.as_slice(), t0, problem.opt)?;
        problem.stats.add_jac_time(begin.elapsed());
        let mut A = SparseMatrix::with_capacity(M0.N_elements() + J.N_elements());
        A.extend_scaled(M0, 1.0);
        A.extend_scaled(&J, -h0);
        let A = A.compress(n)?;
        let begin = Instant::now();
        let xp0 = problem.linear_solver.solve(&A, f0)?;
        problem.stats.add_linear_system_time(begin.elapsed());
        Ok(xp0)
    }

    pub fn history(&self) -> &DMatrix<f64> {
        &self.D
    }

    /// lowers the order after repeated failures
    fn drop_order(&mut self, order: &mut usize, stats: &mut SolverStatistics, reason: &str) {
        if *order > 1 {
            *order -= 1;
            stats.order_changes += 1;
            warn!("{}: order lowered to {} at t = {}", reason, order, self.t);
        }
    }

    /// Advances the solution by one accepted step, never past `t_stop`. A step that
    /// would cross `t_stop` is shortened so that `t_stop` is hit exactly.
    ///
    /// On error the controller state (time, solution, history) is left as it was after
    /// the last accepted step.
    pub fn step(&mut self, problem: &mut Problem, t_stop: f64) -> Result<(), SolverError> {
        let t = self.t;
        let n = self.x.len();
        let opt = problem.opt;
        let mut D = self.D.clone();
        let mut order = self.order;
        let max_step = opt.dt_max;

        let mut h_abs = if self.h_abs > max_step {
            change_D(&mut D, order, max_step / self.h_abs);
            self.n_equal_steps = 0;
            max_step
        } else {
            self.h_abs
        };

        loop {
            let min_step = min_step(opt.dt_min, t);
            if h_abs < min_step {
                return Err(SolverError::StepSizeUnderflow { t, h: h_abs });
            }

            let mut t_new = t + h_abs;
            // also absorbs a remainder too short to be a step of its own
            if t_new >= t_stop || t_stop - t_new < min_step {
                t_new = t_stop;
                change_D(&mut D, order, (t_new - t) / h_abs);
                self.n_equal_steps = 0;
            }
            let h = t_new - t;
            h_abs = h;

            let alpha = self.coeffs.alpha[order];
            let x_predict: DVector<f64> = D.rows(0, order + 1).row_sum().transpose();
            let scale = scale_func(opt.atol, opt.rtol, &x_predict);
            let psi: DVector<f64> =
                D.rows(1, order).transpose() * self.coeffs.gamma.rows(1, order) / alpha;
            let c = h / alpha;

            let M_at_t_new;
            let M = match &self.mass_cache {
                Some(M) => M,
                None => {
                    M_at_t_new = problem.assemble_mass(t_new, n)?;
                    &M_at_t_new
                }
            };
            let outcome = problem.corrector().solve(
                M,
                t_new,
                &x_predict,
                &psi,
                c,
                &scale,
                self.newton_tol,
            )?;

            if !outcome.converged {
                problem.stats.newton_failures += 1;
                self.newton_failures += 1;
                if self.newton_failures > opt.max_Newton_failures {
                    return Err(SolverError::ConvergenceFailure {
                        t,
                        failures: self.newton_failures,
                    });
                }
                debug!(
                    "Newton failed at t = {}, h = {:e}, order {}: step halved",
                    t_new, h_abs, order
                );
                let factor = 0.5;
                h_abs *= factor;
                change_D(&mut D, order, factor);
                self.n_equal_steps = 0;
                if self.newton_failures % FAILURES_BEFORE_ORDER_DROP == 0 {
                    self.drop_order(&mut order, problem.stats, "repeated Newton failures");
                }
                continue;
            }
            self.newton_failures = 0;

            let max_iter = opt.max_Newton_iter as f64;
            let safety = 0.9 * (2.0 * max_iter + 1.0) / (2.0 * max_iter + outcome.n_iter as f64);
            let scale = scale_func(opt.atol, opt.rtol, &outcome.x);
            let error = self.coeffs.error_const[order] * &outcome.d;
            let error_norm = scaled_norm(&error, &scale);

            if error_norm > 1.0 {
                problem.stats.error_test_failures += 1;
                self.error_failures += 1;
                let factor =
                    (safety * error_norm.powf(-1.0 / (order as f64 + 1.0))).max(MIN_FACTOR);
                warn!(
                    "step rejected at t = {}: error norm {:.3e}, h = {:e} -> {:e}",
                    t_new,
                    error_norm,
                    h_abs,
                    h_abs * factor
                );
                h_abs *= factor;
                change_D(&mut D, order, factor);
                self.n_equal_steps = 0;
                if self.error_failures >= FAILURES_BEFORE_ORDER_DROP {
                    self.drop_order(&mut order, problem.stats, "repeated error test failures");
                    self.error_failures = 0;
                }
                continue;
            }

            // accepted
            self.error_failures = 0;
            self.n_equal_steps += 1;
            self.t = t_new;
            self.x = outcome.x;
            self.h_abs = h_abs;
            self.order = order;
            problem.stats.accepted_steps += 1;
            problem.stats.max_order_used = problem.stats.max_order_used.max(order);
            debug!(
                "step accepted: t = {}, h = {:e}, order {}, {} Newton iterations, error {:.3e}",
                t_new, h_abs, order, outcome.n_iter, error_norm
            );

            let d = outcome.d;
            let d_row = d.transpose();
            let next_row = d_row.clone() - D.row(order + 1);
            D.set_row(order + 2, &next_row);
            D.set_row(order + 1, &d_row);
            for i in (0..order + 1).rev() {
                let row_above = D.row(i + 1).clone_owned();
                D.row_mut(i).add_assign(&row_above);
            }

            if self.n_equal_steps < order + 1 {
                self.D = D;
                return Ok(());
            }

            self.select_order(&mut D, &scale, error_norm, safety, problem.stats);
            self.D = D;
            return Ok(());
        }
    }

    /// Chooses among orders `k-1, k, k+1` the one allowing the largest step and rescales `D`.
    fn select_order(
        &mut self,
        D: &mut DMatrix<f64>,
        scale: &DVector<f64>,
        error_norm: f64,
        safety: f64,
        stats: &mut SolverStatistics,
    ) {
        let order = self.order;
        let error_const = &self.coeffs.error_const;
        let error_m_norm = if order > 1 {
            let error_m = (error_const[order - 1] * D.row(order)).transpose();
            scaled_norm(&error_m, scale)
        } else {
            f64::INFINITY
        };
        let error_p_norm = if order < self.max_order {
            let error_p = (error_const[order + 1] * D.row(order + 2)).transpose();
            scaled_norm(&error_p, scale)
        } else {
            f64::INFINITY
        };

        let factors: Vec<f64> = [error_m_norm, error_norm, error_p_norm]
            .iter()
            .enumerate()
            .map(|(i, e)| e.powf(-1.0 / (order as f64 + i as f64)))
            .map(|f| if f.is_nan() { 0.0 } else { f })
            .collect();
        let (argmax_index, max_factor) = factors
            .iter()
            .enumerate()
            .fold((1, factors[1]), |best, (i, f)| if *f > best.1 { (i, *f) } else { best });
        let delta_order = argmax_index as i64 - 1;
        let new_order = (order as i64 + delta_order).clamp(1, self.max_order as i64) as usize;
        if new_order != order {
            stats.order_changes += 1;
            debug!("order changed {} -> {} at t = {}", order, new_order, self.t);
        }
        self.order = new_order;

        let factor = (safety * max_factor).min(MAX_FACTOR);
        self.h_abs *= factor;
        change_D(D, new_order, factor);
        self.n_equal_steps = 0;
    }
}
