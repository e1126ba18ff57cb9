// Copyright (c)  by Gleb E. Zaslavkiy
//MIT License
#![allow(non_snake_case)]

use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::DAE_solver::{DAESolver, SolverReport};
use crate::numerical::DAE::autodiff::{Scalar, cst};
use crate::numerical::DAE::jacobian_matrix::{
    JacobianAnalytic, JacobianAutomatic, JacobianMatrixShape,
};
use crate::numerical::DAE::mass_matrix::{MassMatrixDiagonal, MassMatrixFn, MassMatrixIdentity};
use crate::numerical::DAE::rhs::{FnRHS, RHS};
use crate::numerical::DAE::solution_manager::Solution;
use crate::numerical::DAE::solver_options::SolverOptions;
use crate::numerical::DAE::sparse_matrix::SparseMatrix;
use log::LevelFilter;
use nalgebra::DVector;

/// x' = x, y' = y t
pub struct Growth;
impl<T: Scalar> RHS<T> for Growth {
    fn rhs(&self, f: &mut [T], x: &[T], t: T) {
        f[0] = x[0];
        f[1] = x[1] * t;
    }
}

/// Robertson stiff chemical kinetics, the third equation is the mass balance
pub struct Robertson;
impl<T: Scalar> RHS<T> for Robertson {
    fn rhs(&self, f: &mut [T], x: &[T], _t: T) {
        let k1: T = cst(0.04);
        let k2: T = cst(1e4);
        let k3: T = cst(3e7);
        f[0] = -k1 * x[0] + k2 * x[1] * x[2];
        f[1] = k1 * x[0] - k2 * x[1] * x[2] - k3 * x[1] * x[1];
        f[2] = x[0] + x[1] + x[2] - T::one();
    }
}

/// Heat equation u_t = u_xx on `N` interior grid points, u = 0 on the boundary.
pub struct Diffusion {
    pub N: usize,
    pub dx: f64,
}

impl<T: Scalar> RHS<T> for Diffusion {
    fn rhs(&self, f: &mut [T], x: &[T], t: T) {
        for (i, fi) in f.iter_mut().enumerate() {
            *fi = self.equation(x, t, i);
        }
    }

    fn equation(&self, x: &[T], _t: T, i: usize) -> T {
        let left = if i == 0 { T::zero() } else { x[i - 1] };
        let right = if i + 1 == self.N { T::zero() } else { x[i + 1] };
        (left - cst::<T>(2.0) * x[i] + right) / cst(self.dx * self.dx)
    }
}

fn growth_example() -> Result<SolverReport, SolverError> {
    let opt = SolverOptions::default().with_logging(LevelFilter::Info, None);
    let mut jac = JacobianAutomatic::new(Growth);
    let mass = MassMatrixIdentity::new(2);
    let mut sol = Solution::new();
    let mut solver = DAESolver::new(&Growth, &mut jac, &mass, &opt);
    let report = solver.solve(&DVector::from_vec(vec![4.0, 6.0]), 0.0, 1.0, &mut sol)?;
    sol.sol.print(&[]);
    println!(
        "x(1) = {:?}, exact = [{}, {}]",
        report.x.as_slice(),
        4.0 * 1.0_f64.exp(),
        6.0 * 0.5_f64.exp()
    );
    Ok(report)
}

fn robertson_example() -> Result<SolverReport, SolverError> {
    let opt = SolverOptions::default()
        .with_tolerances(1e-8, 1e-6)
        .with_steps(1e-4, f64::INFINITY, 0.0)
        .with_logging(LevelFilter::Info, None);
    // logarithmic output grid 1e-4, 4e-4, 1e-3, ... 4e5
    let t_output: Vec<f64> = (-4..=5)
        .flat_map(|p| [1.0, 4.0].map(|m| m * 10f64.powi(p)))
        .collect();
    let mut jac = JacobianAutomatic::new(Robertson);
    let mass = MassMatrixDiagonal::new(vec![1.0, 1.0, 0.0]);
    let mut sol = Solution::with_output_times(&t_output);
    let mut solver = DAESolver::new(&Robertson, &mut jac, &mass, &opt);
    let report = solver.solve_with_output(
        &DVector::from_vec(vec![1.0, 0.0, 0.0]),
        0.0,
        &t_output,
        &mut sol,
    )?;
    sol.sol.print(&[]);
    let headers = vec!["y1".to_string(), "y2".to_string(), "y3".to_string()];
    sol.sol.save_csv("robertson.csv", &headers)?;
    Ok(report)
}

fn diffusion_example() -> Result<SolverReport, SolverError> {
    let N = 99;
    let dx = 1.0 / (N as f64 + 1.0);
    let rhs = Diffusion { N, dx };
    let mut opt = SolverOptions::default()
        .with_tolerances(1e-8, 1e-6)
        .with_logging(LevelFilter::Info, None);
    opt.parallel_jacobian = true;
    // tridiagonal stencil
    let mut jac = JacobianMatrixShape::new(&rhs);
    jac.reserve(3 * N);
    for i in 0..N {
        let cols: Vec<usize> = (i.saturating_sub(1)..(i + 2).min(N)).collect();
        jac.add_row(i, &cols);
    }
    let mass = MassMatrixIdentity::new(N);
    let x0 = DVector::from_fn(N, |i, _| {
        let x = (i as f64 + 1.0) * dx;
        if (0.4..=0.6).contains(&x) { 1.0 } else { 0.0 }
    });
    let mut sol = Solution::with_output_times(&[0.01, 0.05, 0.1]);
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let report = solver.solve_with_output(&x0, 0.0, &[0.01, 0.05, 0.1], &mut sol)?;
    sol.sol.print(&[0, N / 4, N / 2]);
    Ok(report)
}

/// (1 + t) x' = -x, x(0) = 1: x = 1 / (1 + t). Closure RHS with an analytic Jacobian
/// and a time dependent mass matrix.
fn time_dependent_mass_example() -> Result<SolverReport, SolverError> {
    let rhs = FnRHS::new(|f: &mut [f64], x: &[f64], _t: f64| f[0] = -x[0]);
    let mut jac = JacobianAnalytic::new(|J: &mut SparseMatrix, _x: &[f64], _t: f64| {
        J.insert(0, 0, -1.0);
    });
    let mass = MassMatrixFn::new(|M: &mut SparseMatrix, t: f64| M.insert(0, 0, 1.0 + t));
    let opt = SolverOptions::default().with_logging(LevelFilter::Info, None);
    let mut sol = Solution::new();
    let mut solver = DAESolver::new(&rhs, &mut jac, &mass, &opt);
    let report = solver.solve(&DVector::from_vec(vec![1.0]), 0.0, 3.0, &mut sol)?;
    sol.sol.print(&[]);
    println!("x(3) = {}, exact = {}", report.x[0], 0.25);
    Ok(report)
}

/// Runs example number `example` and prints the run statistics.
pub fn dae_examples(example: usize) -> Result<SolverReport, SolverError> {
    let report = match example {
        0 => growth_example()?,
        1 => robertson_example()?,
        2 => diffusion_example()?,
        3 => time_dependent_mass_example()?,
        _ => {
            return Err(SolverError::ConfigurationError(format!(
                "no example number {}",
                example
            )));
        }
    };
    println!("status: {:?}", report.status);
    println!("{}", report.stats.table());
    Ok(report)
}
