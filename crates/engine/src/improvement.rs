//! Percentage-improvement arithmetic shared by validation and measurement.
//!
//! All figures are lower-is-better: a drop from `before` to `after` is a
//! positive improvement.

/// `(before - after) / before * 100`, or `None` when `before` is zero or
/// either value is not finite.
pub fn relative_improvement(before: f64, after: f64) -> Option<f64> {
    if !before.is_finite() || !after.is_finite() || before == 0.0 {
        return None;
    }
    let pct = (before - after) / before * 100.0;
    pct.is_finite().then_some(pct)
}

/// Arithmetic mean of `values`; 0 for an empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
