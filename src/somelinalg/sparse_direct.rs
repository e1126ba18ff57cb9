//! Direct solvers for the sparse linear systems `A x = b` arising in the Newton iterations.
//!
//! The matrix arrives in CSR form (`nalgebra_sparse::CsrMatrix`). [`FaerSparseLU`] converts it
//! to a faer `SparseColMat` and uses the sparse LU factorization; [`NalgebraDenseLU`] densifies
//! it and uses nalgebra's LU, which is faster for very small systems.
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::numerical::DAE::solver_options::SolverOptions;
use crate::numerical::DAE::sparse_matrix::{csr_dot, csr_to_dense};
use faer::col::ColRef;
use faer::linalg::solvers::Solve;
use faer::mat::Mat;
use faer::sparse::{SparseColMat, Triplet};
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

/// Which backend solves the Newton linear systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum LinearSolverKind {
    /// faer sparse LU
    Faer,
    /// nalgebra dense LU
    Dense,
}

pub trait LinearSolver {
    /// Solves `A x = b` for a square `A`.
    fn solve(&mut self, A: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverError>;

    fn name(&self) -> String;
}

fn check_dimensions(A: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<(), SolverError> {
    if A.nrows() != A.ncols() || A.nrows() != b.len() {
        return Err(SolverError::LinearSolveFailure(format!(
            "matrix {}x{} and vector of length {} do not form a square system",
            A.nrows(),
            A.ncols(),
            b.len()
        )));
    }
    Ok(())
}

fn check_finite(x: DVector<f64>) -> Result<DVector<f64>, SolverError> {
    if x.iter().all(|xi| xi.is_finite()) {
        Ok(x)
    } else {
        Err(SolverError::LinearSolveFailure(
            "solution contains non-finite values, the matrix is probably singular".to_string(),
        ))
    }
}

/// Sparse LU from faer with optional iterative refinement.
#[derive(Debug, Clone)]
pub struct FaerSparseLU {
    /// refinement steps `x += A^-1 (b - A x)` after the first solve
    pub refinement_steps: usize,
    /// when false the factorization runs on a single thread
    pub parallel_factorization: bool,
    /// one-thread pool, built on the first sequential solve and reused afterwards
    pool: Option<Arc<ThreadPool>>,
}

impl FaerSparseLU {
    pub fn new(refinement_steps: usize, parallel_factorization: bool) -> Self {
        FaerSparseLU {
            refinement_steps,
            parallel_factorization,
            pool: None,
        }
    }

    fn single_thread_pool(&mut self) -> Result<Arc<ThreadPool>, SolverError> {
        if let Some(pool) = &self.pool {
            return Ok(Arc::clone(pool));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .map_err(|e| SolverError::LinearSolveFailure(e.to_string()))?;
        let pool = Arc::new(pool);
        self.pool = Some(Arc::clone(&pool));
        Ok(pool)
    }

    fn to_faer(A: &CsrMatrix<f64>) -> Result<SparseColMat<usize, f64>, SolverError> {
        let triplets: Vec<Triplet<usize, usize, f64>> = A
            .triplet_iter()
            .map(|(i, j, v)| Triplet::new(i, j, *v))
            .collect();
        SparseColMat::<usize, f64>::try_new_from_triplets(A.nrows(), A.ncols(), &triplets)
            .map_err(|e| SolverError::LinearSolveFailure(format!("{:?}", e)))
    }

    fn factorize_and_solve(
        &self,
        A: &CsrMatrix<f64>,
        b: &DVector<f64>,
    ) -> Result<DVector<f64>, SolverError> {
        let mat = Self::to_faer(A)?;
        let LU = mat
            .sp_lu()
            .map_err(|e| SolverError::LinearSolveFailure(format!("sparse LU failed: {:?}", e)))?;
        let lu_solve = |rhs: &DVector<f64>| -> DVector<f64> {
            let res: Mat<f64> = LU.solve(ColRef::from_slice(rhs.as_slice()).as_mat());
            DVector::from_iterator(rhs.len(), res.row_iter().map(|x| x[0]))
        };
        let mut x = lu_solve(b);
        for _ in 0..self.refinement_steps {
            let r = b - csr_dot(A, &x);
            if r.iter().all(|ri| *ri == 0.0) {
                break;
            }
            x += lu_solve(&r);
        }
        Ok(x)
    }
}

impl Default for FaerSparseLU {
    fn default() -> Self {
        FaerSparseLU::new(2, false)
    }
}

impl LinearSolver for FaerSparseLU {
    fn solve(&mut self, A: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        check_dimensions(A, b)?;
        let x = if self.parallel_factorization {
            self.factorize_and_solve(A, b)?
        } else {
            let pool = self.single_thread_pool()?;
            pool.install(|| self.factorize_and_solve(A, b))?
        };
        check_finite(x)
    }

    fn name(&self) -> String {
        LinearSolverKind::Faer.to_string()
    }
}

/// Dense LU from nalgebra.
#[derive(Debug, Clone, Default)]
pub struct NalgebraDenseLU;

impl LinearSolver for NalgebraDenseLU {
    fn solve(&mut self, A: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        check_dimensions(A, b)?;
        let lu = csr_to_dense(A).lu();
        let x = lu.solve(b).ok_or_else(|| {
            SolverError::LinearSolveFailure("dense LU: matrix is singular".to_string())
        })?;
        check_finite(x)
    }

    fn name(&self) -> String {
        LinearSolverKind::Dense.to_string()
    }
}

/// Backend selected in the options.
pub fn create_linear_solver(opt: &SolverOptions) -> Box<dyn LinearSolver> {
    debug!("linear solver: {}", opt.linear_solver);
    match opt.linear_solver {
        LinearSolverKind::Faer => Box::new(FaerSparseLU::new(
            opt.refinement_steps,
            opt.parallel_factorization,
        )),
        LinearSolverKind::Dense => Box::new(NalgebraDenseLU),
    }
}
