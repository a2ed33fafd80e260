//! Utility functions for crop geometry.

pub mod safe_cast;

/// Fit a square crop inside the unit square.
///
/// The size is clamped to `[min_size, 1]`, then the origin is clamped so
/// the whole square lies inside `[0, 1]`. Non-finite inputs fall back to
/// the full frame origin or size.
#[must_use]
pub fn fit_unit_square(x: f64, y: f64, size: f64, min_size: f64) -> (f64, f64, f64) {
    let min_size = min_size.clamp(f64::EPSILON, 1.0);
    let size = if size.is_finite() { size.clamp(min_size, 1.0) } else { 1.0 };
    let limit = 1.0 - size;
    (clamp_finite(x, limit), clamp_finite(y, limit), size)
}

fn clamp_finite(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}
