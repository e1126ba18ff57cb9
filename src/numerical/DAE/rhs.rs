//! Right hand side of the DAE system `M dx/dt = f(x, t)`.
use crate::numerical::DAE::autodiff::{Scalar, cst};

/// User supplied residual `f(x, t)`.
///
/// The same body is evaluated with `T = f64` by the integrator and with
/// `T = Dual` by the automatic Jacobian strategies, so it should be written
/// generically over `T`:
/// ```ignore
/// struct MyRHS;
/// impl<T: Scalar> RHS<T> for MyRHS {
///     fn rhs(&self, f: &mut [T], x: &[T], t: T) {
///         f[0] = x[0];
///         f[1] = x[1] * t;
///     }
/// }
/// ```
pub trait RHS<T: Scalar> {
    /// Writes `f(x, t)` into `f`, overwriting what was there. `f.len() == x.len()`.
    fn rhs(&self, f: &mut [T], x: &[T], t: T);

    /// Value of a single equation `f_row(x, t)`.
    ///
    /// Default evaluates the whole system and picks the row. Override it when rows are
    /// cheap to compute separately: the shape-hinted Jacobian calls this once per
    /// declared non-zero element.
    fn equation(&self, x: &[T], t: T, row: usize) -> T {
        let mut f = vec![T::zero(); x.len()];
        self.rhs(&mut f, x, t);
        f[row]
    }
}

impl<T: Scalar, R: RHS<T> + ?Sized> RHS<T> for &R {
    fn rhs(&self, f: &mut [T], x: &[T], t: T) {
        (**self).rhs(f, x, t)
    }
    fn equation(&self, x: &[T], t: T, row: usize) -> T {
        (**self).equation(x, t, row)
    }
}

/// Adapter turning a closure `Fn(&mut [f64], &[f64], f64)` into an `RHS<f64>`.
///
/// Closures are monomorphic, so this RHS can be used with an analytic Jacobian
/// only. Use a generic `impl RHS<T>` to enable automatic differentiation.
pub struct FnRHS<F> {
    fun: F,
}

impl<F> FnRHS<F>
where
    F: Fn(&mut [f64], &[f64], f64),
{
    pub fn new(fun: F) -> Self {
        FnRHS { fun }
    }
}

impl<F> RHS<f64> for FnRHS<F>
where
    F: Fn(&mut [f64], &[f64], f64),
{
    fn rhs(&self, f: &mut [f64], x: &[f64], t: f64) {
        (self.fun)(f, x, t)
    }
}

/// Evaluates `f(x, t)` into a freshly allocated vector.
pub fn eval_rhs<T: Scalar, R: RHS<T> + ?Sized>(rhs: &R, x: &[T], t: T) -> Vec<T> {
    let mut f = vec![T::zero(); x.len()];
    rhs.rhs(&mut f, x, t);
    f
}

/// Linear system `f = A x` with a dense coefficient matrix, handy for tests and benches.
#[derive(Debug, Clone)]
pub struct LinearRHS {
    pub A: Vec<Vec<f64>>,
}

impl LinearRHS {
    pub fn new(A: Vec<Vec<f64>>) -> Self {
        LinearRHS { A }
    }
}

impl<T: Scalar> RHS<T> for LinearRHS {
    fn rhs(&self, f: &mut [T], x: &[T], t: T) {
        for (i, fi) in f.iter_mut().enumerate() {
            *fi = self.equation(x, t, i);
        }
    }
    fn equation(&self, x: &[T], _t: T, row: usize) -> T {
        self.A[row]
            .iter()
            .zip(x.iter())
            .fold(T::zero(), |acc, (a, xj)| acc + cst::<T>(*a) * *xj)
    }
}
