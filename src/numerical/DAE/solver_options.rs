//! Solver settings: tolerances, step bounds, Newton parameters and linear solver tuning.
//!
//! Options can be built in code (`SolverOptions::default()` plus setters) or read from
//! a TOML document with a `[solver]` table:
//! ```toml
//! [solver]
//! atol = 1e-8
//! rtol = 1e-8
//! bdf_order = 4
//! linear_solver = "dense"
//! log_level = "info"
//! ```
use crate::numerical::DAE::DAE_errors::SolverError;
use crate::somelinalg::sparse_direct::LinearSolverKind;
use log::{LevelFilter, warn};
use std::path::Path;
use std::str::FromStr;

/// highest supported BDF order
pub const BDF_MAX_ORDER: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// absolute tolerance
    pub atol: f64,
    /// relative tolerance
    pub rtol: f64,
    /// initial time step
    pub dt_init: f64,
    /// maximum time step
    pub dt_max: f64,
    /// minimum time step; 0 means 10*eps*|t|
    pub dt_min: f64,
    /// upper bound on the BDF order, 1..=BDF_MAX_ORDER
    pub bdf_order: usize,
    /// Newton iterations per step attempt
    pub max_Newton_iter: usize,
    /// Newton convergence tolerance; None means max(10 eps / rtol, min(0.03, sqrt(rtol)))
    pub newton_tol: Option<f64>,
    /// consecutive Newton failures before the integration is abandoned
    pub max_Newton_failures: usize,
    /// entries of an automatic dense Jacobian with |J_ij| below this are dropped
    pub sparse_matrix_element_tolerance: f64,
    /// iterative refinement steps after the sparse solve
    pub refinement_steps: usize,
    pub parallel_factorization: bool,
    pub parallel_jacobian: bool,
    pub linear_solver: LinearSolverKind,
    /// installs a terminal (and file) logger at the start of `solve` when set
    pub log_level: Option<LevelFilter>,
    /// log file name or directory
    pub log_file: Option<String>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            atol: 1e-6,
            rtol: 1e-6,
            dt_init: 0.1,
            dt_max: f64::INFINITY,
            dt_min: 0.0,
            bdf_order: 5,
            max_Newton_iter: 4,
            newton_tol: None,
            max_Newton_failures: 10,
            sparse_matrix_element_tolerance: 1e-14,
            refinement_steps: 2,
            parallel_factorization: false,
            parallel_jacobian: false,
            linear_solver: LinearSolverKind::Faer,
            log_level: None,
            log_file: None,
        }
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerances(mut self, atol: f64, rtol: f64) -> Self {
        self.atol = atol;
        self.rtol = rtol;
        self
    }

    pub fn with_bdf_order(mut self, bdf_order: usize) -> Self {
        self.bdf_order = bdf_order;
        self
    }

    pub fn with_steps(mut self, dt_init: f64, dt_max: f64, dt_min: f64) -> Self {
        self.dt_init = dt_init;
        self.dt_max = dt_max;
        self.dt_min = dt_min;
        self
    }

    pub fn with_linear_solver(mut self, kind: LinearSolverKind) -> Self {
        self.linear_solver = kind;
        self
    }

    pub fn with_logging(mut self, level: LevelFilter, file: Option<String>) -> Self {
        self.log_level = Some(level);
        self.log_file = file;
        self
    }

    /// Corrects soft problems in place. A BDF order outside `1..=BDF_MAX_ORDER` becomes 1.
    pub fn check_options(&mut self) {
        if self.bdf_order < 1 || self.bdf_order > BDF_MAX_ORDER {
            warn!(
                "BDF order {} is out of range [1, {}], order 1 will be used",
                self.bdf_order, BDF_MAX_ORDER
            );
            self.bdf_order = 1;
        }
        if self.max_Newton_iter == 0 {
            warn!("max_Newton_iter = 0, one Newton iteration per step will be used");
            self.max_Newton_iter = 1;
        }
    }

    /// Rejects settings the integrator cannot work with.
    pub fn validate(&self) -> Result<(), SolverError> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && !v.is_nan() {
                Ok(())
            } else {
                Err(SolverError::ConfigurationError(format!(
                    "{} must be positive, got {}",
                    name, v
                )))
            }
        };
        positive("atol", self.atol)?;
        positive("rtol", self.rtol)?;
        positive("dt_init", self.dt_init)?;
        positive("dt_max", self.dt_max)?;
        if !(self.dt_min >= 0.0) || self.dt_min > self.dt_max {
            return Err(SolverError::ConfigurationError(format!(
                "dt_min must be within [0, dt_max], got {}",
                self.dt_min
            )));
        }
        if let Some(tol) = self.newton_tol {
            positive("newton_tol", tol)?;
        }
        if !(self.sparse_matrix_element_tolerance >= 0.0) {
            return Err(SolverError::ConfigurationError(
                "sparse_matrix_element_tolerance must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Newton tolerance actually used by the corrector.
    pub fn newton_tol(&self) -> f64 {
        match self.newton_tol {
            Some(tol) => tol,
            None => f64::max(
                10.0 * f64::EPSILON / self.rtol,
                f64::min(0.03, self.rtol.powf(0.5)),
            ),
        }
    }

    /// Reads options from the `[solver]` table of a TOML document. Missing keys keep defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, SolverError> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| SolverError::ConfigurationError(e.to_string()))?;
        let mut opt = SolverOptions::default();
        let Some(solver) = table.get("solver") else {
            return Ok(opt);
        };
        let solver = solver.as_table().ok_or_else(|| {
            SolverError::ConfigurationError("[solver] must be a table".to_string())
        })?;
        for (key, value) in solver.iter() {
            let bad = || {
                SolverError::ConfigurationError(format!("invalid value for {}: {}", key, value))
            };
            let as_f64 = |v: &toml::Value| -> Result<f64, SolverError> {
                v.as_float()
                    .or_else(|| v.as_integer().map(|i| i as f64))
                    .ok_or_else(bad)
            };
            let as_usize = |v: &toml::Value| -> Result<usize, SolverError> {
                v.as_integer()
                    .filter(|i| *i >= 0)
                    .map(|i| i as usize)
                    .ok_or_else(bad)
            };
            let as_str = |v: &toml::Value| -> Result<String, SolverError> {
                v.as_str().map(|s| s.to_string()).ok_or_else(bad)
            };
            match key.as_str() {
                "atol" => opt.atol = as_f64(value)?,
                "rtol" => opt.rtol = as_f64(value)?,
                "dt_init" => opt.dt_init = as_f64(value)?,
                "dt_max" => opt.dt_max = as_f64(value)?,
                "dt_min" => opt.dt_min = as_f64(value)?,
                "bdf_order" => opt.bdf_order = as_usize(value)?,
                "max_Newton_iter" => opt.max_Newton_iter = as_usize(value)?,
                "newton_tol" => opt.newton_tol = Some(as_f64(value)?),
                "max_Newton_failures" => opt.max_Newton_failures = as_usize(value)?,
                "sparse_matrix_element_tolerance" => {
                    opt.sparse_matrix_element_tolerance = as_f64(value)?
                }
                "refinement_steps" => opt.refinement_steps = as_usize(value)?,
                "parallel_factorization" => {
                    opt.parallel_factorization = value.as_bool().ok_or_else(bad)?
                }
                "parallel_jacobian" => opt.parallel_jacobian = value.as_bool().ok_or_else(bad)?,
                "linear_solver" => {
                    opt.linear_solver =
                        LinearSolverKind::from_str(&as_str(value)?).map_err(|_| bad())?
                }
                "log_level" => {
                    opt.log_level = Some(LevelFilter::from_str(&as_str(value)?).map_err(|_| bad())?)
                }
                "log_file" => opt.log_file = Some(as_str(value)?),
                _ => warn!("unknown solver option {} ignored", key),
            }
        }
        opt.validate()?;
        Ok(opt)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let opt = SolverOptions::default();
        assert_eq!(opt.atol, 1e-6);
        assert_eq!(opt.rtol, 1e-6);
        assert_eq!(opt.dt_init, 0.1);
        assert_eq!(opt.bdf_order, 5);
        assert_eq!(opt.max_Newton_iter, 4);
        assert_eq!(opt.sparse_matrix_element_tolerance, 1e-14);
        assert_eq!(opt.linear_solver, LinearSolverKind::Faer);
        assert!(opt.validate().is_ok());
        // sqrt(1e-6) = 1e-3
        assert_relative_eq!(opt.newton_tol(), 1e-3, epsilon = 1e-15);
    }

    #[test]
    fn test_bdf_order_clamp() {
        for bad in [0, 7, 99] {
            let mut opt = SolverOptions::default().with_bdf_order(bad);
            opt.check_options();
            assert_eq!(opt.bdf_order, 1);
        }
        for good in 1..=BDF_MAX_ORDER {
            let mut opt = SolverOptions::default().with_bdf_order(good);
            opt.check_options();
            assert_eq!(opt.bdf_order, good);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let opt = SolverOptions::default().with_tolerances(-1.0, 1e-6);
        assert!(matches!(opt.validate(), Err(SolverError::ConfigurationError(_))));
        let opt = SolverOptions::default().with_steps(0.0, 1.0, 0.0);
        assert!(opt.validate().is_err());
        let opt = SolverOptions::default().with_steps(0.1, 1.0, 2.0);
        assert!(opt.validate().is_err());
    }

    #[test]
    fn test_from_toml_str() {
        let content = r#"
            [solver]
            atol = 1e-8
            rtol = 1e-7
            bdf_order = 3
            dt_max = 2
            linear_solver = "dense"
            parallel_jacobian = true
            log_level = "debug"
        "#;
        let opt = SolverOptions::from_toml_str(content).unwrap();
        assert_eq!(opt.atol, 1e-8);
        assert_eq!(opt.rtol, 1e-7);
        assert_eq!(opt.bdf_order, 3);
        assert_eq!(opt.dt_max, 2.0);
        assert_eq!(opt.linear_solver, LinearSolverKind::Dense);
        assert!(opt.parallel_jacobian);
        assert_eq!(opt.log_level, Some(LevelFilter::Debug));
        // untouched keys keep defaults
        assert_eq!(opt.dt_init, 0.1);
    }

    #[test]
    fn test_from_toml_errors() {
        assert!(SolverOptions::from_toml_str("[solver\natol = 1").is_err());
        assert!(SolverOptions::from_toml_str("[solver]\natol = \"x\"").is_err());
        assert!(SolverOptions::from_toml_str("[solver]\nlinear_solver = \"pardiso\"").is_err());
        assert!(SolverOptions::from_toml_str("[solver]\nrtol = -1.0").is_err());
        assert_eq!(SolverOptions::from_toml_str("").unwrap(), SolverOptions::default());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[solver]\nmax_Newton_iter = 6\nnewton_tol = 1e-4").unwrap();
        let opt = SolverOptions::from_toml_file(file.path()).unwrap();
        assert_eq!(opt.max_Newton_iter, 6);
        assert_eq!(opt.newton_tol(), 1e-4);
        assert!(matches!(
            SolverOptions::from_toml_file("/nonexistent/dir/opts.toml"),
            Err(SolverError::Io(_))
        ));
    }
}
