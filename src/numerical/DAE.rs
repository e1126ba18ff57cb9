/// sparse matrix in triplet form and conversion to CSR
pub mod sparse_matrix;
/// forward mode dual numbers used by the automatic Jacobians
pub mod autodiff;
/// right hand side f(x, t)
pub mod rhs;
/// mass matrix providers
pub mod mass_matrix;
/// Jacobian strategies: analytic, shape hinted, dense automatic
pub mod jacobian_matrix;
pub mod solver_options;
pub mod DAE_errors;
/// norms, scaling and step size helpers
pub mod common;
pub mod statistics;
/// Newton corrector of the implicit BDF step
pub mod NR_corrector;
/// variable order BDF step control
pub mod BDF_controller;
/// SOLVER OF STIFF DAE: M dx/dt = f(x, t)
pub mod DAE_solver;
/// observers of accepted steps and the solution holder
pub mod solution_manager;

#[cfg(test)]
mod DAE_tests;
