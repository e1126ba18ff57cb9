//! Mass matrix `M(t)` of the DAE system `M dx/dt = f(x, t)`.
//!
//! Zero rows of `M` turn the corresponding equations into algebraic constraints.
use crate::numerical::DAE::sparse_matrix::SparseMatrix;

pub trait MassMatrix {
    /// Fills the (empty) sparse matrix `M` for time `t`.
    fn mass_matrix(&self, M: &mut SparseMatrix, t: f64);

    /// `true` if `M` does not depend on `t`: the solver then assembles it once per run.
    fn is_constant(&self) -> bool {
        false
    }

    /// `true` for the identity matrix; enables shortcuts in the initial derivative.
    fn is_identity(&self) -> bool {
        false
    }
}

impl<Mm: MassMatrix + ?Sized> MassMatrix for &Mm {
    fn mass_matrix(&self, M: &mut SparseMatrix, t: f64) {
        (**self).mass_matrix(M, t)
    }
    fn is_constant(&self) -> bool {
        (**self).is_constant()
    }
    fn is_identity(&self) -> bool {
        (**self).is_identity()
    }
}

/// Identity mass matrix of size `N`: the system is an ODE `dx/dt = f(x, t)`.
#[derive(Debug, Clone, Copy)]
pub struct MassMatrixIdentity {
    pub N: usize,
}

impl MassMatrixIdentity {
    pub fn new(N: usize) -> Self {
        MassMatrixIdentity { N }
    }
}

impl MassMatrix for MassMatrixIdentity {
    fn mass_matrix(&self, M: &mut SparseMatrix, _t: f64) {
        M.reserve(self.N);
        for i in 0..self.N {
            M.insert(i, i, 1.0);
        }
    }
    fn is_constant(&self) -> bool {
        true
    }
    fn is_identity(&self) -> bool {
        true
    }
}

/// Diagonal mass matrix, e.g. `diag(1, 1, 0)` for a semi-explicit index-1 DAE.
#[derive(Debug, Clone)]
pub struct MassMatrixDiagonal {
    pub diag: Vec<f64>,
}

impl MassMatrixDiagonal {
    pub fn new(diag: Vec<f64>) -> Self {
        MassMatrixDiagonal { diag }
    }
}

impl MassMatrix for MassMatrixDiagonal {
    fn mass_matrix(&self, M: &mut SparseMatrix, _t: f64) {
        for (i, d) in self.diag.iter().enumerate() {
            if *d != 0.0 {
                M.insert(i, i, *d);
            }
        }
    }
    fn is_constant(&self) -> bool {
        true
    }
    fn is_identity(&self) -> bool {
        self.diag.iter().all(|d| *d == 1.0)
    }
}

/// Time dependent mass matrix given by a closure.
pub struct MassMatrixFn<F> {
    fun: F,
    constant: bool,
}

impl<F> MassMatrixFn<F>
where
    F: Fn(&mut SparseMatrix, f64),
{
    pub fn new(fun: F) -> Self {
        MassMatrixFn {
            fun,
            constant: false,
        }
    }
    /// marks the closure as time independent
    pub fn constant(fun: F) -> Self {
        MassMatrixFn {
            fun,
            constant: true,
        }
    }
}

impl<F> MassMatrix for MassMatrixFn<F>
where
    F: Fn(&mut SparseMatrix, f64),
{
    fn mass_matrix(&self, M: &mut SparseMatrix, t: f64) {
        (self.fun)(M, t)
    }
    fn is_constant(&self) -> bool {
        self.constant
    }
}
