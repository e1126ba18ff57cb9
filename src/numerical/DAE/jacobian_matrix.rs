//! # Jacobian providers
//!
//! The Newton corrector needs the sparse Jacobian `J = df/dx`. Three strategies are
//! available behind the [`JacobianMatrix`] trait:
//!
//! 1. [`JacobianAnalytic`]: user closure filling `J` directly (or any user `impl JacobianMatrix`);
//! 2. [`JacobianMatrixShape`]: the user declares the structurally non-zero positions once and
//!    every declared element is computed by forward mode differentiation of `RHS::equation`;
//! 3. [`JacobianAutomatic`]: dense Jacobian by dual numbers, one seeded evaluation per
//!    column, then only elements with `|J_ij| > sparse_matrix_element_tolerance` are kept.
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::autodiff::Dual;
use crate::numerical::DAE::rhs::RHS;
use crate::numerical::DAE::solver_options::SolverOptions;
use crate::numerical::DAE::sparse_matrix::SparseMatrix;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub trait JacobianMatrix {
    /// Fills the empty sparse matrix `J` with `df/dx` evaluated at `(x, t)`.
    fn jacobian(
        &mut self,
        J: &mut SparseMatrix,
        x: &[f64],
        t: f64,
        opt: &SolverOptions,
    ) -> Result<(), SolverError>;
}

impl<Jm: JacobianMatrix + ?Sized> JacobianMatrix for &mut Jm {
    fn jacobian(
        &mut self,
        J: &mut SparseMatrix,
        x: &[f64],
        t: f64,
        opt: &SolverOptions,
    ) -> Result<(), SolverError> {
        (**self).jacobian(J, x, t, opt)
    }
}

/// Dual copy of `x` with every derivative part set to zero.
fn dual_state(x: &[f64]) -> Vec<Dual> {
    x.iter().map(|xi| Dual::constant(*xi)).collect()
}

//////////////////////////////////////////////////////////////////////////////////////////
//                         ANALYTIC
//////////////////////////////////////////////////////////////////////////////////////////

/// Jacobian given by a closure `FnMut(J, x, t)`.
pub struct JacobianAnalytic<F> {
    fun: F,
}

impl<F> JacobianAnalytic<F>
where
    F: FnMut(&mut SparseMatrix, &[f64], f64),
{
    pub fn new(fun: F) -> Self {
        JacobianAnalytic { fun }
    }
}

impl<F> JacobianMatrix for JacobianAnalytic<F>
where
    F: FnMut(&mut SparseMatrix, &[f64], f64),
{
    fn jacobian(
        &mut self,
        J: &mut SparseMatrix,
        x: &[f64],
        t: f64,
        _opt: &SolverOptions,
    ) -> Result<(), SolverError> {
        (self.fun)(J, x, t);
        J.check(x.len())
    }
}

//////////////////////////////////////////////////////////////////////////////////////////
//                         SHAPE HINTED
//////////////////////////////////////////////////////////////////////////////////////////

/// Jacobian computed by automatic differentiation on a declared sparsity shape.
///
/// ```ignore
/// let mut jac = JacobianMatrixShape::new(&rhs);
/// jac.add_element(0, 0);
/// jac.add_row(1, &[0, 1, 2]);
/// ```
/// The cost of one build is proportional to the number of declared elements times the
/// cost of one `RHS::equation` call.
pub struct JacobianMatrixShape<R> {
    rhs: R,
    /// declared (row, column) positions
    shape: Vec<(usize, usize)>,
    /// number of elements produced by the last build
    N_elements: usize,
}

impl<R> JacobianMatrixShape<R>
where
    R: RHS<Dual> + Sync,
{
    pub fn new(rhs: R) -> Self {
        JacobianMatrixShape {
            rhs,
            shape: Vec::new(),
            N_elements: 0,
        }
    }

    /// Declares `(i, j)` as a structurally non-zero element.
    pub fn add_element(&mut self, i: usize, j: usize) {
        self.shape.push((i, j));
    }

    /// Declares the non-zero columns `cols` of row `i`.
    pub fn add_row(&mut self, i: usize, cols: &[usize]) {
        self.shape.extend(cols.iter().map(|j| (i, *j)));
    }

    pub fn clear(&mut self) {
        self.shape.clear();
        self.N_elements = 0;
    }

    pub fn reserve(&mut self, N_elements: usize) {
        self.shape.reserve(N_elements);
    }

    pub fn shape(&self) -> &[(usize, usize)] {
        &self.shape
    }

    fn check_shape(&self, N: usize) -> Result<(), SolverError> {
        if self.shape.is_empty() {
            return Err(SolverError::ConfigurationError(
                "Jacobian shape is empty, declare non-zero elements with add_element".to_string(),
            ));
        }
        if let Some((i, j)) = self.shape.iter().find(|(i, j)| *i >= N || *j >= N) {
            return Err(SolverError::ConfigurationError(format!(
                "Jacobian shape element ({}, {}) is out of range for a system of size {}",
                i, j, N
            )));
        }
        Ok(())
    }

    /// rows of the declared shape grouped by column
    fn columns(&self) -> Vec<(usize, Vec<usize>)> {
        let mut by_col: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, j) in self.shape.iter() {
            by_col.entry(*j).or_default().push(*i);
        }
        by_col.into_iter().collect()
    }

    fn column_derivatives(&self, x_dual: &mut [Dual], t: Dual, j: usize, rows: &[usize]) -> Vec<(usize, usize, f64)> {
        x_dual[j].eps = 1.0;
        let res = rows
            .iter()
            .map(|i| (*i, j, self.rhs.equation(x_dual, t, *i).eps))
            .collect();
        x_dual[j].eps = 0.0;
        res
    }
}

impl<R> JacobianMatrix for JacobianMatrixShape<R>
where
    R: RHS<Dual> + Sync,
{
    fn jacobian(
        &mut self,
        J: &mut SparseMatrix,
        x: &[f64],
        t: f64,
        opt: &SolverOptions,
    ) -> Result<(), SolverError> {
        self.check_shape(x.len())?;
        J.reserve(self.N_elements.max(self.shape.len()));
        let columns = self.columns();
        let t_dual = Dual::constant(t);
        let elements: Vec<(usize, usize, f64)> = if opt.parallel_jacobian {
            columns
                .par_iter()
                .map_init(
                    || dual_state(x),
                    |x_dual, (j, rows)| self.column_derivatives(x_dual, t_dual, *j, rows),
                )
                .flatten()
                .collect()
        } else {
            let mut x_dual = dual_state(x);
            columns
                .iter()
                .flat_map(|(j, rows)| self.column_derivatives(&mut x_dual, t_dual, *j, rows))
                .collect()
        };
        for (i, j, v) in elements {
            J.insert(i, j, v);
        }
        self.N_elements = J.N_elements();
        Ok(())
    }
}

//////////////////////////////////////////////////////////////////////////////////////////
//                         DENSE AUTOMATIC
//////////////////////////////////////////////////////////////////////////////////////////

/// Dense Jacobian by dual numbers, sparsified with `opt.sparse_matrix_element_tolerance`.
///
/// Needs `N` full RHS evaluations per build; intended for small systems or as a fallback
/// when the sparsity shape is not known.
pub struct JacobianAutomatic<R> {
    rhs: R,
    N_elements: usize,
}

impl<R> JacobianAutomatic<R>
where
    R: RHS<Dual>,
{
    pub fn new(rhs: R) -> Self {
        JacobianAutomatic { rhs, N_elements: 0 }
    }
}

impl<R> JacobianMatrix for JacobianAutomatic<R>
where
    R: RHS<Dual>,
{
    fn jacobian(
        &mut self,
        J: &mut SparseMatrix,
        x: &[f64],
        t: f64,
        opt: &SolverOptions,
    ) -> Result<(), SolverError> {
        let N = x.len();
        let tol = opt.sparse_matrix_element_tolerance;
        J.reserve(self.N_elements);
        let mut x_dual = dual_state(x);
        let mut f_dual = vec![Dual::constant(0.0); N];
        let t_dual = Dual::constant(t);
        for j in 0..N {
            x_dual[j].eps = 1.0;
            self.rhs.rhs(&mut f_dual, &x_dual, t_dual);
            x_dual[j].eps = 0.0;
            for (i, fi) in f_dual.iter().enumerate() {
                if fi.eps.abs() > tol {
                    J.insert(i, j, fi.eps);
                }
            }
        }
        if self.N_elements != J.N_elements() {
            debug!(
                "automatic Jacobian: {} non-zero elements out of {}",
                J.N_elements(),
                N * N
            );
        }
        self.N_elements = J.N_elements();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::DAE::autodiff::Scalar;
    use approx::assert_relative_eq;

    struct TwoEq;
    impl<T: Scalar> RHS<T> for TwoEq {
        fn rhs(&self, f: &mut [T], x: &[T], t: T) {
            f[0] = x[0];
            f[1] = x[1] * t;
        }
    }

    /// x0' = -x0^2 + sin(x1), x1' = x0 * x1
    struct Nonlinear;
    impl<T: Scalar> RHS<T> for Nonlinear {
        fn rhs(&self, f: &mut [T], x: &[T], _t: T) {
            f[0] = -x[0] * x[0] + x[1].sin();
            f[1] = x[0] * x[1];
        }
    }

    fn sorted(J: &SparseMatrix) -> Vec<(usize, usize, f64)> {
        let mut v: Vec<_> = (0..J.N_elements()).map(|k| (J.i[k], J.j[k], J.A[k])).collect();
        v.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        v
    }

    #[test]
    fn test_shape_jacobian_two_equations() {
        let opt = SolverOptions::default();
        let mut jac = JacobianMatrixShape::new(TwoEq);
        jac.add_element(0, 0);
        jac.add_element(1, 1);
        let mut J = SparseMatrix::new();
        jac.jacobian(&mut J, &[4.0, 6.0], 0.5, &opt).unwrap();
        assert_eq!(sorted(&J), vec![(0, 0, 1.0), (1, 1, 0.5)]);

        // declared elements are kept even when the value is zero
        let mut J = SparseMatrix::new();
        jac.jacobian(&mut J, &[4.0, 6.0], 0.0, &opt).unwrap();
        assert_eq!(sorted(&J), vec![(0, 0, 1.0), (1, 1, 0.0)]);
    }

    #[test]
    fn test_automatic_jacobian_drops_small_entries() {
        let opt = SolverOptions::default();
        let mut jac = JacobianAutomatic::new(TwoEq);
        let mut J = SparseMatrix::new();
        jac.jacobian(&mut J, &[4.0, 6.0], 0.5, &opt).unwrap();
        assert_eq!(sorted(&J), vec![(0, 0, 1.0), (1, 1, 0.5)]);

        let mut J = SparseMatrix::new();
        jac.jacobian(&mut J, &[4.0, 6.0], 0.0, &opt).unwrap();
        assert_eq!(sorted(&J), vec![(0, 0, 1.0)]);
    }

    #[test]
    fn test_strategies_agree_on_nonlinear_problem() {
        let x: [f64; 2] = [0.3, 1.2];
        let exact = vec![
            (0, 0, -2.0 * x[0]),
            (0, 1, x[1].cos()),
            (1, 0, x[1]),
            (1, 1, x[0]),
        ];
        let mut opt = SolverOptions::default();
        let mut automatic = JacobianAutomatic::new(Nonlinear);
        let mut J = SparseMatrix::new();
        automatic.jacobian(&mut J, &x, 0.0, &opt).unwrap();
        for (a, b) in sorted(&J).iter().zip(exact.iter()) {
            assert_eq!((a.0, a.1), (b.0, b.1));
            assert_relative_eq!(a.2, b.2, epsilon = 1e-14);
        }

        for parallel in [false, true] {
            opt.parallel_jacobian = parallel;
            let mut shape = JacobianMatrixShape::new(&Nonlinear);
            shape.reserve(4);
            shape.add_row(0, &[0, 1]);
            shape.add_row(1, &[0, 1]);
            let mut J = SparseMatrix::new();
            shape.jacobian(&mut J, &x, 0.0, &opt).unwrap();
            for (a, b) in sorted(&J).iter().zip(exact.iter()) {
                assert_eq!((a.0, a.1), (b.0, b.1));
                assert_relative_eq!(a.2, b.2, epsilon = 1e-14);
            }
        }

        let mut analytic = JacobianAnalytic::new(|J: &mut SparseMatrix, x: &[f64], _t: f64| {
            J.insert(0, 0, -2.0 * x[0]);
            J.insert(0, 1, x[1].cos());
            J.insert(1, 0, x[1]);
            J.insert(1, 1, x[0]);
        });
        let mut J = SparseMatrix::new();
        analytic.jacobian(&mut J, &x, 0.0, &opt).unwrap();
        assert_eq!(sorted(&J), exact);
    }

    #[test]
    fn test_shape_out_of_range_is_configuration_error() {
        let opt = SolverOptions::default();
        let mut jac = JacobianMatrixShape::new(TwoEq);
        jac.add_element(0, 2);
        let mut J = SparseMatrix::new();
        assert!(matches!(
            jac.jacobian(&mut J, &[4.0, 6.0], 0.0, &opt),
            Err(SolverError::ConfigurationError(_))
        ));
        jac.clear();
        assert!(jac.shape().is_empty());
        assert!(jac.jacobian(&mut J, &[4.0, 6.0], 0.0, &opt).is_err());
    }
}
