use log::info;
use nalgebra::DVector;

/// RMS norm `||v|| / sqrt(n)`
pub fn norm(vector: &DVector<f64>) -> f64 {
    if vector.is_empty() {
        return 0.0;
    }
    vector.norm() / (vector.len() as f64).sqrt()
}

/// weights `atol + rtol*|x_i|` of the error norm
pub fn scale_func(atol: f64, rtol: f64, x: &DVector<f64>) -> DVector<f64> {
    x.map(|xi| atol + rtol * xi.abs())
}

/// weighted RMS norm `||v / scale||`
pub fn scaled_norm(v: &DVector<f64>, scale: &DVector<f64>) -> f64 {
    norm(&v.component_div(scale))
}

/// Initial step: `dt_init` clipped to `dt_max` and to the integration interval.
pub fn first_step(dt_init: f64, dt_max: f64, t0: f64, t1: f64) -> f64 {
    let h0 = dt_init.min(dt_max).min((t1 - t0).abs());
    info!("first step: {:e}", h0);
    h0
}

/// Minimal step allowed near `t`.
pub fn min_step(dt_min: f64, t: f64) -> f64 {
    dt_min.max(10.0 * f64::EPSILON * t.abs())
}
