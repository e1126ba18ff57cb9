/// Stiff DAE solver `M dx/dt = f(x, t)` with the variable order BDF method.
/// Example#1
/// ```ignore
/// use RustedDAE::numerical::DAE::autodiff::Scalar;
/// use RustedDAE::numerical::DAE::rhs::RHS;
/// use RustedDAE::numerical::DAE::jacobian_matrix::JacobianAutomatic;
/// use RustedDAE::numerical::DAE::mass_matrix::MassMatrixIdentity;
/// use RustedDAE::numerical::DAE::solver_options::SolverOptions;
/// use RustedDAE::numerical::DAE::solution_manager::Solution;
/// use RustedDAE::numerical::DAE::DAE_solver::DAESolver;
/// use nalgebra::DVector;
/// // x' = x, y' = y t
/// struct MyRHS;
/// impl<T: Scalar> RHS<T> for MyRHS {
///     fn rhs(&self, f: &mut [T], x: &[T], t: T) {
///         f[0] = x[0];
///         f[1] = x[1] * t;
///     }
/// }
/// let mut jac = JacobianAutomatic::new(MyRHS);
/// let mass = MassMatrixIdentity::new(2);
/// let opt = SolverOptions::default();
/// let mut sol = Solution::new();
/// let mut solver = DAESolver::new(&MyRHS, &mut jac, &mass, &opt);
/// let report = solver.solve(&DVector::from_vec(vec![4.0, 6.0]), 0.0, 1.0, &mut sol).unwrap();
/// sol.sol.print(&[]);
/// ```
pub mod DAE;
