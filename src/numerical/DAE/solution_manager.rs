//! Post-processing of accepted steps.
//!
//! A [`SolutionManager`] is called by the solver with the initial state and then after
//! every accepted step. A non-zero return value stops the integration immediately.
use crate::Utils::logger::{save_solution_to_csv, save_solution_to_file};
use crate::numerical::DAE::DAE_errors::SolverError;
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use std::fmt::Write;
use std::path::Path;

pub trait SolutionManager {
    /// Called with the state `x` at time `t`. Return `0` to continue, anything else to stop.
    fn call(&mut self, x: &DVector<f64>, t: f64) -> i32;
}

impl<F> SolutionManager for F
where
    F: FnMut(&DVector<f64>, f64) -> i32,
{
    fn call(&mut self, x: &DVector<f64>, t: f64) -> i32 {
        self(x, t)
    }
}

/// Manager that does nothing and never stops the solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutput;

impl SolutionManager for NoOutput {
    fn call(&mut self, _x: &DVector<f64>, _t: f64) -> i32 {
        0
    }
}

/// Solution vectors `x` and the corresponding times `t`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionHolder {
    pub x: Vec<DVector<f64>>,
    pub t: Vec<f64>,
}

impl SolutionHolder {
    pub fn new() -> Self {
        SolutionHolder {
            x: Vec::new(),
            t: Vec::new(),
        }
    }

    pub fn push(&mut self, x: &DVector<f64>, t: f64) {
        self.x.push(x.clone());
        self.t.push(t);
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// valid indices from `ind`, or all of them when `ind` is empty
    fn columns(&self, ind: &[usize]) -> Vec<usize> {
        let N = self.x.first().map(|x| x.len()).unwrap_or(0);
        if ind.is_empty() {
            (0..N).collect()
        } else {
            ind.iter().copied().filter(|i| *i < N).collect()
        }
    }

    /// Tab separated table `Time  x[i] ...`. Out of range indices in `ind` are skipped.
    pub fn to_table_string(&self, ind: &[usize]) -> String {
        let mut out = String::new();
        if self.t.is_empty() {
            return out;
        }
        let cols = self.columns(ind);
        out.push_str("Time");
        for i in cols.iter() {
            let _ = write!(out, "\tx[{}]", i);
        }
        out.push('\n');
        for (t, x) in self.t.iter().zip(self.x.iter()) {
            let _ = write!(out, "{}", t);
            for i in cols.iter() {
                let _ = write!(out, "\t{}", x[*i]);
            }
            out.push('\n');
        }
        out
    }

    /// Prints the solution; `ind` selects the components (all if empty).
    pub fn print(&self, ind: &[usize]) {
        print!("{}", self.to_table_string(ind));
    }

    /// Solution as a matrix: one row per time point, one column per component.
    pub fn to_matrix(&self) -> DMatrix<f64> {
        let N = self.x.first().map(|x| x.len()).unwrap_or(0);
        DMatrix::from_fn(self.x.len(), N, |i, j| self.x[i][j])
    }

    /// Last recorded state.
    pub fn last(&self) -> Option<(f64, &DVector<f64>)> {
        match (self.t.last(), self.x.last()) {
            (Some(t), Some(x)) => Some((*t, x)),
            _ => None,
        }
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P, headers: &[String]) -> Result<(), SolverError> {
        save_solution_to_csv(&self.t, &self.x, headers, path, "t")?;
        Ok(())
    }

    pub fn save_txt<P: AsRef<Path>>(&self, path: P, headers: &[String]) -> Result<(), SolverError> {
        save_solution_to_file(&self.t, &self.x, headers, path, "t")?;
        Ok(())
    }
}

/// Records the solution every step, or only at the output times if they are given.
#[derive(Debug, Clone, Default)]
pub struct Solution {
    pub sol: SolutionHolder,
    t_out: Vec<f64>,
}

impl Solution {
    pub fn new() -> Self {
        Solution {
            sol: SolutionHolder::new(),
            t_out: Vec::new(),
        }
    }

    /// Records only the states at exactly these times.
    pub fn with_output_times(t_output: &[f64]) -> Self {
        let mut t_out = t_output.to_vec();
        t_out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        Solution {
            sol: SolutionHolder::new(),
            t_out,
        }
    }

    pub fn output_times(&self) -> &[f64] {
        &self.t_out
    }

    pub fn into_holder(self) -> SolutionHolder {
        self.sol
    }
}

impl SolutionManager for Solution {
    fn call(&mut self, x: &DVector<f64>, t: f64) -> i32 {
        if !self.t_out.is_empty()
            && self
                .t_out
                .binary_search_by(|ti| ti.partial_cmp(&t).unwrap_or(Ordering::Less))
                .is_err()
        {
            return 0;
        }
        self.sol.push(x, t);
        0
    }
}
