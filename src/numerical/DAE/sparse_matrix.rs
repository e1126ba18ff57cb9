//! # Sparse matrix in triplet form
//!
//! Matrices handed to the DAE solver (Jacobian, mass matrix and their
//! combination in the Newton iteration) are collected as triplets:
//!
//! ```text
//! A[k] - value of the k-th non-zero element
//! i[k] - its row
//! j[k] - its column
//! ```
//!
//! Elements are only appended. When the matrix is complete it is compressed once
//! into CSR form (`nalgebra_sparse::CsrMatrix`) for the linear solver.
//!
//! Inserting the same `(i, j)` position several times is allowed: all the
//! contributions are **summed**. The same policy is used by [`SparseMatrix::compress`],
//! [`SparseMatrix::dot`] and [`SparseMatrix::dense`].
use crate::numerical::DAE::DAE_errors::SolverError;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseMatrix {
    /// non-zero values
    pub A: Vec<f64>,
    /// row indices
    pub i: Vec<usize>,
    /// column indices
    pub j: Vec<usize>,
}

impl SparseMatrix {
    pub fn new() -> Self {
        SparseMatrix {
            A: Vec::new(),
            i: Vec::new(),
            j: Vec::new(),
        }
    }

    pub fn with_capacity(N_elements: usize) -> Self {
        let mut M = SparseMatrix::new();
        M.reserve(N_elements);
        M
    }

    /// Appends element `value` at row `ind_i`, column `ind_j`.
    pub fn insert(&mut self, ind_i: usize, ind_j: usize, value: f64) {
        self.A.push(value);
        self.i.push(ind_i);
        self.j.push(ind_j);
    }

    pub fn reserve(&mut self, N_elements: usize) {
        self.A.reserve(N_elements);
        self.i.reserve(N_elements);
        self.j.reserve(N_elements);
    }

    pub fn clear(&mut self) {
        self.A.clear();
        self.i.clear();
        self.j.clear();
    }

    /// number of stored triplets (duplicates included)
    pub fn N_elements(&self) -> usize {
        self.A.len()
    }

    pub fn is_empty(&self) -> bool {
        self.A.is_empty()
    }

    /// Checks that the three arrays have the same length and every index is inside `[0, n)`.
    pub fn check(&self, n: usize) -> Result<(), SolverError> {
        if self.A.len() != self.i.len() || self.A.len() != self.j.len() {
            return Err(SolverError::SparseMatrixError(format!(
                "inconsistent triplet arrays: A = {}, i = {}, j = {}",
                self.A.len(),
                self.i.len(),
                self.j.len()
            )));
        }
        if let Some(k) = (0..self.A.len()).find(|&k| self.i[k] >= n || self.j[k] >= n) {
            return Err(SolverError::SparseMatrixError(format!(
                "element ({}, {}) is out of range for a {}x{} matrix",
                self.i[k], self.j[k], n, n
            )));
        }
        Ok(())
    }

    /// Appends all elements of `other` multiplied by `factor`.
    pub fn extend_scaled(&mut self, other: &SparseMatrix, factor: f64) {
        self.reserve(other.N_elements());
        for k in 0..other.N_elements() {
            self.insert(other.i[k], other.j[k], factor * other.A[k]);
        }
    }

    /// Converts accumulated triplets into a square `n x n` CSR matrix. Duplicates are summed.
    pub fn compress(&self, n: usize) -> Result<CsrMatrix<f64>, SolverError> {
        self.check(n)?;
        let coo = CooMatrix::try_from_triplets(n, n, self.i.clone(), self.j.clone(), self.A.clone())
            .map_err(|e| SolverError::SparseMatrixError(format!("{:?}", e)))?;
        Ok(CsrMatrix::from(&coo))
    }

    /// Matrix-vector product `M*x` computed straight from the triplets.
    pub fn dot(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut res = DVector::zeros(x.len());
        for k in 0..self.A.len() {
            res[self.i[k]] += self.A[k] * x[self.j[k]];
        }
        res
    }

    /// Dense `n x n` copy, mostly for diagnostics and small systems.
    pub fn dense(&self, n: usize) -> DMatrix<f64> {
        let mut M = DMatrix::zeros(n, n);
        for k in 0..self.A.len() {
            M[(self.i[k], self.j[k])] += self.A[k];
        }
        M
    }
}

/// Dense copy of a compressed matrix.
pub fn csr_to_dense(csr: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut M = DMatrix::zeros(csr.nrows(), csr.ncols());
    for (i, j, v) in csr.triplet_iter() {
        M[(i, j)] += *v;
    }
    M
}

/// Sparse matrix-vector product for a compressed matrix.
pub fn csr_dot(csr: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut res = DVector::zeros(csr.nrows());
    for (i, j, v) in csr.triplet_iter() {
        res[i] += v * x[j];
    }
    res
}
