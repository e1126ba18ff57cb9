use crate::Examples::dae_examples::{Diffusion, Growth, Robertson};
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::DAE_solver::{DAESolver, SolverStatus};
use crate::numerical::DAE::autodiff::Scalar;
use crate::numerical::DAE::jacobian_matrix::{
    JacobianAnalytic, JacobianAutomatic, JacobianMatrixShape,
};
use crate::numerical::DAE::mass_matrix::{MassMatrixDiagonal, MassMatrixFn, MassMatrixIdentity};
use crate::numerical::DAE::rhs::{FnRHS, LinearRHS, RHS};
use crate::numerical::DAE::solution_manager::{NoOutput, Solution};
use crate::numerical::DAE::solver_options::SolverOptions;
use crate::numerical::DAE::sparse_matrix::SparseMatrix;
use crate::somelinalg::sparse_direct::{LinearSolverKind, NalgebraDenseLU};
use approx::assert_relative_eq;
use nalgebra::DVector;

/// x0' = -x0, x1' = x0 - 2 x1; with x(0) = [1, 2]: x0 = e^-t, x1 = e^-t + e^-2t
fn triangular() -> LinearRHS {
    LinearRHS::new(vec![vec![-1.0, 0.0], vec![1.0, -2.0]])
}

fn triangular_exact(t: f64) -> [f64; 2] {
    [(-t).exp(), (-t).exp() + (-2.0 * t).exp()]
}

fn triangular_error(opt: &SolverOptions) -> (f64, usize) {
    let rhs = triangular();
    let mut jac = JacobianAutomatic::new(&rhs);
    let mass = MassMatrixIdentity::new(2);
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, opt);
    let x0 = DVector::from_vec(vec![1.0, 2.0]);
    let report = solver.solve(&x0, 0.0, 1.0, &mut NoOutput).unwrap();
    assert!(report.is_success());
    assert_eq!(report.t, 1.0);
    let exact = triangular_exact(1.0);
    let err = (report.x[0] - exact[0]).abs().max((report.x[1] - exact[1]).abs());
    (err, report.stats.max_order_used)
}

#[test]
fn test_growth_problem_against_exact_solution() {
    let opt = SolverOptions::default();
    let mut jac = JacobianAutomatic::new(Growth);
    let mass = MassMatrixIdentity::new(2);
    let mut sol = Solution::new();
    let mut solver = DAESolver::new(&Growth, &mut jac, &mass, &opt);
    let x0 = DVector::from_vec(vec![4.0, 6.0]);
    let report = solver.solve(&x0, 0.0, 1.0, &mut sol).unwrap();

    assert_eq!(report.status, SolverStatus::Finished);
    assert_eq!(report.t, 1.0);
    assert_relative_eq!(report.x[0], 4.0 * 1.0_f64.exp(), max_relative = 1e-3);
    assert_relative_eq!(report.x[1], 6.0 * 0.5_f64.exp(), max_relative = 1e-3);

    // initial state first, then every accepted step, times strictly increasing
    assert_eq!(sol.sol.t[0], 0.0);
    assert_eq!(sol.sol.x[0], x0);
    assert_eq!(sol.sol.len(), report.stats.accepted_steps + 1);
    assert!(sol.sol.t.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(*sol.sol.t.last().unwrap(), 1.0);
    // intermediate points follow the exact solution as well
    for (t, x) in sol.sol.t.iter().zip(sol.sol.x.iter()) {
        assert_relative_eq!(x[0], 4.0 * t.exp(), max_relative = 1e-3);
        assert_relative_eq!(x[1], 6.0 * (t * t / 2.0).exp(), max_relative = 1e-3);
    }
    assert!(report.stats.rhs_evaluations > 0);
    assert!(report.stats.jacobian_evaluations > 0);
    assert!(report.stats.linear_solves > 0);
}

#[test]
fn test_every_bdf_order_converges() {
    for order in 1..=6 {
        let opt = SolverOptions::default()
            .with_tolerances(1e-7, 1e-7)
            .with_bdf_order(order);
        let (err, max_order_used) = triangular_error(&opt);
        assert!(err < 1e-3, "order {}: error {}", order, err);
        assert!(max_order_used <= order, "order {} used {}", order, max_order_used);
        assert!(max_order_used >= 1);
    }
}

#[test]
fn test_tighter_tolerance_gives_smaller_error() {
    for order in 1..=6 {
        let loose_opt = SolverOptions::default()
            .with_tolerances(1e-4, 1e-4)
            .with_bdf_order(order);
        let tight_opt = SolverOptions::default()
            .with_tolerances(1e-9, 1e-9)
            .with_bdf_order(order);
        let (loose, _) = triangular_error(&loose_opt);
        let (tight, _) = triangular_error(&tight_opt);
        assert!(tight < loose, "order {}: tight {} loose {}", order, tight, loose);
        assert!(tight < 5e-4, "order {}: tight {}", order, tight);
    }
}

#[test]
fn test_out_of_range_order_falls_back_to_one() {
    for order in [0, 99] {
        let opt = SolverOptions::default().with_bdf_order(order);
        let rhs = triangular();
        let mut jac = JacobianAutomatic::new(&rhs);
        let mass = MassMatrixIdentity::new(2);
        let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
        assert_eq!(solver.options().bdf_order, 1);
        let report = solver
            .solve(&DVector::from_vec(vec![1.0, 2.0]), 0.0, 0.5, &mut NoOutput)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.stats.max_order_used, 1);
    }
}

#[test]
fn test_output_times_are_hit_exactly() {
    let t_out = [0.25, 0.5, 0.75, 1.0];
    let opt = SolverOptions::default();
    let rhs = triangular();
    let mut jac = JacobianAutomatic::new(&rhs);
    let mass = MassMatrixIdentity::new(2);
    let mut sol = Solution::with_output_times(&t_out);
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let report = solver
        .solve_with_output(&DVector::from_vec(vec![1.0, 2.0]), 0.0, &t_out, &mut sol)
        .unwrap();
    assert!(report.is_success());
    assert_eq!(sol.sol.t, t_out.to_vec());
    for (t, x) in sol.sol.t.iter().zip(sol.sol.x.iter()) {
        let exact = triangular_exact(*t);
        assert_relative_eq!(x[0], exact[0], epsilon = 1e-4);
        assert_relative_eq!(x[1], exact[1], epsilon = 1e-4);
    }
}

#[test]
fn test_callback_stops_integration() {
    let opt = SolverOptions::default();
    let rhs = triangular();
    let mut jac = JacobianAutomatic::new(&rhs);
    let mass = MassMatrixIdentity::new(2);
    let mut calls = 0;
    let mut last_t = f64::NAN;
    let mut mgr = |_x: &DVector<f64>, t: f64| -> i32 {
        calls += 1;
        last_t = t;
        if t >= 0.5 { 1 } else { 0 }
    };
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let report = solver
        .solve_with_output(&DVector::from_vec(vec![1.0, 2.0]), 0.0, &[0.5, 2.0], &mut mgr)
        .unwrap();
    assert_eq!(report.status, SolverStatus::StoppedByCallback);
    assert_eq!(report.t, 0.5);
    assert_eq!(last_t, 0.5);
    assert_eq!(calls, report.stats.accepted_steps + 1);
    let exact = triangular_exact(0.5);
    assert_relative_eq!(report.x[0], exact[0], max_relative = 1e-2);
    assert_relative_eq!(report.x[1], exact[1], max_relative = 1e-2);
}

#[test]
fn test_callback_can_stop_at_initial_state() {
    let opt = SolverOptions::default();
    let mut jac = JacobianAutomatic::new(Growth);
    let mass = MassMatrixIdentity::new(2);
    let mut mgr = |_x: &DVector<f64>, _t: f64| -> i32 { -1 };
    let mut solver = DAESolver::new(&Growth, &mut jac, &mass, &opt);
    let x0 = DVector::from_vec(vec![1.0, 1.0]);
    let report = solver.solve(&x0, 0.0, 1.0, &mut mgr).unwrap();
    assert_eq!(report.status, SolverStatus::StoppedByCallback);
    assert_eq!(report.t, 0.0);
    assert_eq!(report.x, x0);
    assert_eq!(report.stats.accepted_steps, 0);
}

#[test]
fn test_robertson_dae() {
    let opt = SolverOptions::default()
        .with_tolerances(1e-8, 1e-6)
        .with_steps(1e-4, f64::INFINITY, 0.0);
    let mut jac = JacobianAutomatic::new(Robertson);
    let mass = MassMatrixDiagonal::new(vec![1.0, 1.0, 0.0]);
    let mut sol = Solution::new();
    let mut solver = DAESolver::new(&Robertson, &mut jac, &mass, &opt);
    let x0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
    let report = solver.solve(&x0, 0.0, 40.0, &mut sol).unwrap();

    assert!(report.is_success(), "{:?}", report.status);
    assert_eq!(report.t, 40.0);
    assert_relative_eq!(report.x[0], 0.7158270687, epsilon = 1e-4);
    assert_relative_eq!(report.x[2], 0.2841637457, epsilon = 1e-4);
    // the algebraic equation is linear, so every Newton iterate satisfies it
    for x in sol.sol.x.iter() {
        assert_relative_eq!(x.sum(), 1.0, epsilon = 1e-8);
    }
    assert_eq!(report.stats.mass_evaluations, 1);
}

#[test]
fn test_linear_solver_backends_agree() {
    let run = |opt: &SolverOptions, dense_override: bool| {
        let mut jac = JacobianAutomatic::new(Robertson);
        let mass = MassMatrixDiagonal::new(vec![1.0, 1.0, 0.0]);
        let mut solver = DAESolver::new(&Robertson, &mut jac, &mass, opt);
        if dense_override {
            solver.set_linear_solver(Box::new(NalgebraDenseLU));
        }
        let x0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        solver.solve(&x0, 0.0, 1.0, &mut NoOutput).unwrap()
    };
    let opt = SolverOptions::default().with_steps(1e-4, f64::INFINITY, 0.0);
    let faer = run(&opt, false);
    let dense = run(&opt.clone().with_linear_solver(LinearSolverKind::Dense), false);
    let boxed = run(&opt, true);
    assert!(faer.is_success() && dense.is_success() && boxed.is_success());
    for i in 0..3 {
        assert_relative_eq!(faer.x[i], dense.x[i], epsilon = 1e-7);
        assert_relative_eq!(dense.x[i], boxed.x[i], epsilon = 1e-12);
    }
}

fn diffusion_shape(rhs: &Diffusion) -> JacobianMatrixShape<&Diffusion> {
    let mut jac = JacobianMatrixShape::new(rhs);
    for i in 0..rhs.N {
        let cols: Vec<usize> = (i.saturating_sub(1)..(i + 2).min(rhs.N)).collect();
        jac.add_row(i, &cols);
    }
    jac
}

#[test]
fn test_diffusion_with_shape_jacobian() {
    let N = 19;
    let dx = 1.0 / (N as f64 + 1.0);
    let rhs = Diffusion { N, dx };
    let pi = std::f64::consts::PI;
    let x0 = DVector::from_fn(N, |i, _| (pi * (i as f64 + 1.0) * dx).sin());
    // sin(pi x) is an eigenvector of the discrete Laplacian
    let lambda = -4.0 / (dx * dx) * (pi * dx / 2.0).sin().powi(2);
    let t1 = 0.1;

    for parallel in [false, true] {
        let mut opt = SolverOptions::default().with_tolerances(1e-8, 1e-6);
        opt.parallel_jacobian = parallel;
        let mut jac = diffusion_shape(&rhs);
        let mass = MassMatrixIdentity::new(N);
        let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
        let report = solver.solve(&x0, 0.0, t1, &mut NoOutput).unwrap();
        assert!(report.is_success());
        let decay = (lambda * t1).exp();
        for i in 0..N {
            assert_relative_eq!(report.x[i], x0[i] * decay, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_analytic_jacobian_with_closure_rhs() {
    let rhs = FnRHS::new(|f: &mut [f64], x: &[f64], _t: f64| {
        f[0] = -x[0];
        f[1] = x[0] - 2.0 * x[1];
    });
    let mut jac = JacobianAnalytic::new(|J: &mut SparseMatrix, _x: &[f64], _t: f64| {
        J.insert(0, 0, -1.0);
        J.insert(1, 0, 1.0);
        J.insert(1, 1, -2.0);
    });
    let mass = MassMatrixIdentity::new(2);
    let opt = SolverOptions::default();
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let report = solver
        .solve(&DVector::from_vec(vec![1.0, 2.0]), 0.0, 1.0, &mut NoOutput)
        .unwrap();
    let exact = triangular_exact(1.0);
    assert_relative_eq!(report.x[0], exact[0], max_relative = 1e-2);
    assert_relative_eq!(report.x[1], exact[1], max_relative = 1e-2);
    assert_relative_eq!(report.x[1], exact[1], epsilon = 1e-4);
}

#[test]
fn test_setup_errors() {
    let rhs = triangular();
    let mut jac = JacobianAutomatic::new(&rhs);
    let mass = MassMatrixIdentity::new(2);
    let opt = SolverOptions::default();
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let x0 = DVector::from_vec(vec![1.0, 2.0]);

    let reversed = solver.solve(&x0, 1.0, 0.0, &mut NoOutput);
    assert!(matches!(reversed, Err(SolverError::ConfigurationError(_))));
    let empty = solver.solve(&DVector::zeros(0), 0.0, 1.0, &mut NoOutput);
    assert!(matches!(empty, Err(SolverError::ConfigurationError(_))));
    let nan = solver.solve(&DVector::from_vec(vec![f64::NAN, 0.0]), 0.0, 1.0, &mut NoOutput);
    assert!(matches!(nan, Err(SolverError::ConfigurationError(_))));
    let no_output = solver.solve_with_output(&x0, 1.0, &[0.5, 1.0], &mut NoOutput);
    assert!(matches!(no_output, Err(SolverError::ConfigurationError(_))));

    let bad = SolverOptions::default().with_tolerances(-1.0, 1e-6);
    let mut jac = JacobianAutomatic::new(&rhs);
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &bad);
    assert!(solver.solve(&x0, 0.0, 1.0, &mut NoOutput).is_err());
}

#[test]
fn test_bad_shape_is_a_setup_error() {
    let rhs = Diffusion { N: 3, dx: 0.25 };
    let mut jac = JacobianMatrixShape::new(&rhs);
    jac.add_element(0, 7);
    let mass = MassMatrixIdentity::new(3);
    let opt = SolverOptions::default();
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let res = solver.solve(&DVector::from_element(3, 1.0), 0.0, 1.0, &mut NoOutput);
    assert!(matches!(res, Err(SolverError::ConfigurationError(_))));
}

#[test]
fn test_step_size_underflow_is_reported_with_last_state() {
    // finite time blow up: x' = x^2, x(0) = 1, x = 1 / (1 - t)
    struct Blowup;
    impl<T: Scalar> RHS<T> for Blowup {
        fn rhs(&self, f: &mut [T], x: &[T], _t: T) {
            f[0] = x[0] * x[0];
        }
    }
    let opt = SolverOptions::default().with_steps(0.1, f64::INFINITY, 1e-6);
    let mut jac = JacobianAutomatic::new(Blowup);
    let mass = MassMatrixIdentity::new(1);
    let mut solver = DAESolver::new(&Blowup, &mut jac, &mass, &opt);
    let report = solver
        .solve(&DVector::from_element(1, 1.0), 0.0, 2.0, &mut NoOutput)
        .unwrap();
    assert!(!report.is_success());
    assert!(report.error().map(|e| e.is_fatal_runtime()).unwrap_or(false));
    assert!(report.t < 1.0);
    assert!(report.x[0].is_finite());
}

#[test]
fn test_late_mass_matrix_error_keeps_partial_result() {
    // the mass matrix becomes invalid after t = 0.5
    let rhs = triangular();
    let mut jac = JacobianAutomatic::new(&rhs);
    let mass = MassMatrixFn::new(|M: &mut SparseMatrix, t: f64| {
        M.insert(0, 0, 1.0);
        M.insert(1, 1, 1.0);
        if t > 0.5 {
            M.insert(5, 5, 1.0);
        }
    });
    let opt = SolverOptions::default();
    let mut sol = Solution::new();
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let report = solver
        .solve(&DVector::from_vec(vec![1.0, 2.0]), 0.0, 1.0, &mut sol)
        .unwrap();

    assert!(matches!(
        report.status,
        SolverStatus::Failed(SolverError::SparseMatrixError(_))
    ));
    assert!(report.stats.accepted_steps > 0);
    assert!(report.t > 0.0 && report.t <= 0.5);
    assert_eq!(sol.sol.len(), report.stats.accepted_steps + 1);
    let (t_last, x_last) = sol.sol.last().unwrap();
    assert_eq!(t_last, report.t);
    assert_eq!(x_last, &report.x);
    let exact = triangular_exact(report.t);
    assert_relative_eq!(report.x[0], exact[0], max_relative = 1e-2);
    assert_relative_eq!(report.x[1], exact[1], max_relative = 1e-2);
}
