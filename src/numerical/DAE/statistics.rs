//! Run statistics of one integration: counters and timing of the expensive parts.
use log::info;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Clone)]
pub struct SolverStatistics {
    pub accepted_steps: usize,
    pub error_test_failures: usize,
    pub newton_failures: usize,
    pub newton_iterations: usize,
    pub rhs_evaluations: usize,
    pub jacobian_evaluations: usize,
    pub mass_evaluations: usize,
    pub linear_solves: usize,
    pub order_changes: usize,
    /// highest order reached
    pub max_order_used: usize,
    start: Instant,
    rhs_time: Duration,
    jac_time: Duration,
    linear_system_time: Duration,
    pub elapsed: Duration,
}

impl Default for SolverStatistics {
    fn default() -> Self {
        SolverStatistics::new()
    }
}

impl SolverStatistics {
    pub fn new() -> Self {
        SolverStatistics {
            accepted_steps: 0,
            error_test_failures: 0,
            newton_failures: 0,
            newton_iterations: 0,
            rhs_evaluations: 0,
            jacobian_evaluations: 0,
            mass_evaluations: 0,
            linear_solves: 0,
            order_changes: 0,
            max_order_used: 0,
            start: Instant::now(),
            rhs_time: Duration::ZERO,
            jac_time: Duration::ZERO,
            linear_system_time: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    pub fn add_rhs_time(&mut self, d: Duration) {
        self.rhs_evaluations += 1;
        self.rhs_time += d;
    }

    pub fn add_jac_time(&mut self, d: Duration) {
        self.jacobian_evaluations += 1;
        self.jac_time += d;
    }

    pub fn add_linear_system_time(&mut self, d: Duration) {
        self.linear_solves += 1;
        self.linear_system_time += d;
    }

    pub fn finish(&mut self) {
        self.elapsed = self.start.elapsed();
    }

    fn percent(&self, part: Duration) -> String {
        let total = self.elapsed.as_nanos() as f64;
        if total == 0.0 {
            return "0".to_string();
        }
        format!("{:.3}", 100.0 * part.as_nanos() as f64 / total)
    }

    pub fn get_all(&self) -> HashMap<String, String> {
        let mut stats = HashMap::new();
        stats.insert("accepted steps".to_string(), self.accepted_steps.to_string());
        stats.insert(
            "error test failures".to_string(),
            self.error_test_failures.to_string(),
        );
        stats.insert("Newton failures".to_string(), self.newton_failures.to_string());
        stats.insert(
            "Newton iterations".to_string(),
            self.newton_iterations.to_string(),
        );
        stats.insert("RHS evaluations".to_string(), self.rhs_evaluations.to_string());
        stats.insert(
            "Jacobian evaluations".to_string(),
            self.jacobian_evaluations.to_string(),
        );
        stats.insert(
            "mass matrix evaluations".to_string(),
            self.mass_evaluations.to_string(),
        );
        stats.insert("linear solves".to_string(), self.linear_solves.to_string());
        stats.insert("order changes".to_string(), self.order_changes.to_string());
        stats.insert("max order used".to_string(), self.max_order_used.to_string());
        stats.insert(
            "time elapsed, ms".to_string(),
            format!("{:.3}", self.elapsed.as_secs_f64() * 1e3),
        );
        stats.insert("RHS time %".to_string(), self.percent(self.rhs_time));
        stats.insert("Jacobian time %".to_string(), self.percent(self.jac_time));
        stats.insert(
            "linear system time %".to_string(),
            self.percent(self.linear_system_time),
        );
        stats
    }

    pub fn table(&self) -> String {
        let mut table = Builder::from(self.get_all()).build();
        table.with(Style::modern_rounded());
        table.to_string()
    }

    pub fn calc_statistics(&self) {
        info!("\n \n CALC STATISTICS \n \n {}", self.table());
    }
}
