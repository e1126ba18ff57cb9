//! # DAE solver driver
//!
//! Integrates `M dx/dt = f(x, t)` from `t0` to `t1` with the variable order BDF method.
//!
//! ```ignore
//! let rhs = MyRHS;                                  // impl<T: Scalar> RHS<T>
//! let mut jac = JacobianAutomatic::new(&rhs);       // or JacobianMatrixShape / JacobianAnalytic
//! let mass = MassMatrixIdentity::new(2);
//! let opt = SolverOptions::default();
//! let mut sol = Solution::new();
//! let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
//! let report = solver.solve(&x0, 0.0, 1.0, &mut sol)?;
//! ```
//! `solve` returns `Err` only for problems found before the first step is accepted (bad
//! options, inconsistent sizes, a bad Jacobian shape). Any failure after that is reported in
//! [`SolverReport::status`] together with the last accepted state.
use crate::Utils::logging::init_logger;
use crate::numerical::DAE::BDF_controller::{BDFController, Problem};
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::common::min_step;
use crate::numerical::DAE::jacobian_matrix::JacobianMatrix;
use crate::numerical::DAE::mass_matrix::MassMatrix;
use crate::numerical::DAE::rhs::RHS;
use crate::numerical::DAE::solution_manager::SolutionManager;
use crate::numerical::DAE::solver_options::SolverOptions;
use crate::numerical::DAE::statistics::SolverStatistics;
use crate::somelinalg::sparse_direct::{LinearSolver, create_linear_solver};
use log::{error, info};
use nalgebra::DVector;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum SolverStatus {
    /// reached the final time
    Finished,
    /// the solution manager returned a non-zero value
    StoppedByCallback,
    /// integration abandoned; the report holds the last accepted state
    Failed(SolverError),
}

#[derive(Debug, Clone)]
pub struct SolverReport {
    pub status: SolverStatus,
    /// time of the last accepted step
    pub t: f64,
    /// solution at `t`
    pub x: DVector<f64>,
    pub stats: SolverStatistics,
}

impl SolverReport {
    pub fn is_success(&self) -> bool {
        self.status == SolverStatus::Finished
    }

    /// the failure, if any
    pub fn error(&self) -> Option<&SolverError> {
        match &self.status {
            SolverStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

pub struct DAESolver<'a> {
    rhs: &'a dyn RHS<f64>,
    jac: &'a mut dyn JacobianMatrix,
    mass: &'a dyn MassMatrix,
    opt: SolverOptions,
    linear_solver: Option<Box<dyn LinearSolver + 'a>>,
}

impl<'a> DAESolver<'a> {
    /// The options are copied; out of range soft settings (BDF order) are corrected.
    pub fn new(
        rhs: &'a dyn RHS<f64>,
        jac: &'a mut dyn JacobianMatrix,
        mass: &'a dyn MassMatrix,
        opt: &SolverOptions,
    ) -> Self {
        let mut opt = opt.clone();
        opt.check_options();
        DAESolver {
            rhs,
            jac,
            mass,
            opt,
            linear_solver: None,
        }
    }

    /// Replaces the linear solver selected by `opt.linear_solver`.
    pub fn set_linear_solver(&mut self, linear_solver: Box<dyn LinearSolver + 'a>) {
        self.linear_solver = Some(linear_solver);
    }

    /// options actually used
    pub fn options(&self) -> &SolverOptions {
        &self.opt
    }

    /// Integrates from `(x0, t0)` to `t1`. The manager receives the initial state and every
    /// accepted step.
    pub fn solve(
        &mut self,
        x0: &DVector<f64>,
        t0: f64,
        t1: f64,
        mgr: &mut dyn SolutionManager,
    ) -> Result<SolverReport, SolverError> {
        if !(t1 > t0) {
            return Err(SolverError::ConfigurationError(format!(
                "final time t1 = {} must be greater than t0 = {}",
                t1, t0
            )));
        }
        self.integrate(x0, t0, vec![t1], mgr)
    }

    /// Integrates from `(x0, t0)` to the largest of `t_output`, landing exactly on every
    /// output time. Steps in between are passed to the manager as well; use
    /// `Solution::with_output_times` to keep only the output times.
    pub fn solve_with_output(
        &mut self,
        x0: &DVector<f64>,
        t0: f64,
        t_output: &[f64],
        mgr: &mut dyn SolutionManager,
    ) -> Result<SolverReport, SolverError> {
        if t_output.iter().any(|t| !t.is_finite()) {
            return Err(SolverError::ConfigurationError(
                "output times must be finite".to_string(),
            ));
        }
        let mut stops: Vec<f64> = t_output.iter().copied().filter(|t| *t > t0).collect();
        stops.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        stops.dedup();
        if stops.is_empty() {
            return Err(SolverError::ConfigurationError(format!(
                "no output time is greater than t0 = {}",
                t0
            )));
        }
        self.integrate(x0, t0, stops, mgr)
    }

    fn check_problem(&self, x0: &DVector<f64>, t0: f64) -> Result<(), SolverError> {
        self.opt.validate()?;
        if x0.is_empty() {
            return Err(SolverError::ConfigurationError(
                "initial state is empty".to_string(),
            ));
        }
        if !t0.is_finite() || x0.iter().any(|xi| !xi.is_finite()) {
            return Err(SolverError::ConfigurationError(
                "initial time and state must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// `stops` is sorted, above `t0`, and ends with the final time.
    fn integrate(
        &mut self,
        x0: &DVector<f64>,
        t0: f64,
        stops: Vec<f64>,
        mgr: &mut dyn SolutionManager,
    ) -> Result<SolverReport, SolverError> {
        if let Some(level) = self.opt.log_level {
            init_logger(level, self.opt.log_file.as_deref());
        }
        self.check_problem(x0, t0)?;
        let t1 = stops.last().copied().unwrap_or(t0);
        info!(
            "DAE solver started: {} equations, t in [{}, {}], BDF order <= {}, linear solver: {}",
            x0.len(),
            t0,
            t1,
            self.opt.bdf_order,
            self.opt.linear_solver
        );

        let mut linear_solver = match self.linear_solver.take() {
            Some(ls) => ls,
            None => create_linear_solver(&self.opt),
        };
        let mut stats = SolverStatistics::new();
        let opt = &self.opt;
        let mut problem = Problem {
            rhs: self.rhs,
            jac: &mut *self.jac,
            mass: self.mass,
            linear_solver: linear_solver.as_mut(),
            opt,
            stats: &mut stats,
        };

        let init = BDFController::new(&mut problem, x0.clone(), t0, t1);
        let mut ctrl = match init {
            Ok(ctrl) => ctrl,
            Err(e) => {
                drop(problem);
                self.linear_solver = Some(linear_solver);
                return Err(e);
            }
        };

        let mut status = SolverStatus::Finished;
        let mut setup_error = None;
        let mut accepted = 0usize;
        if mgr.call(&ctrl.x, ctrl.t) != 0 {
            status = SolverStatus::StoppedByCallback;
        }
        'stops: for stop in stops.iter() {
            if status != SolverStatus::Finished {
                break;
            }
            while stop - ctrl.t > min_step(opt.dt_min, ctrl.t) {
                match ctrl.step(&mut problem, *stop) {
                    Ok(()) => {
                        accepted += 1;
                        if mgr.call(&ctrl.x, ctrl.t) != 0 {
                            info!("stopped by the solution manager at t = {}", ctrl.t);
                            status = SolverStatus::StoppedByCallback;
                            break 'stops;
                        }
                    }
                    Err(e) if accepted == 0 && !e.is_fatal_runtime() => {
                        setup_error = Some(e);
                        break 'stops;
                    }
                    Err(e) => {
                        error!("integration failed at t = {}: {}", ctrl.t, e);
                        status = SolverStatus::Failed(e);
                        break 'stops;
                    }
                }
            }
        }
        drop(problem);
        self.linear_solver = Some(linear_solver);
        if let Some(e) = setup_error {
            error!("DAE solver stopped: {}", e);
            return Err(e);
        }

        stats.finish();
        stats.calc_statistics();
        info!(
            "DAE solver finished at t = {} with status {:?} after {} steps",
            ctrl.t, status, stats.accepted_steps
        );
        Ok(SolverReport {
            status,
            t: ctrl.t,
            x: ctrl.x,
            stats,
        })
    }
}
