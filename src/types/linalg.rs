//! Vector helpers for gravity and orientation math
//!
//! Thin aliases over nalgebra so posture code reads in terms of
//! gravity vectors instead of raw tuples.

use nalgebra::Vector3;

/// Gravity estimate or reference orientation, in g-units.
pub type GravityVec = Vector3<f64>;

/// Reference used when no calibration could be established: device z-axis up.
pub fn vertical() -> GravityVec {
    GravityVec::new(0.0, 0.0, 1.0)
}

/// Normalize `v`, or return `None` for a (near) zero vector.
pub fn unit(v: &GravityVec) -> Option<GravityVec> {
    let norm = v.norm();
    if norm.is_finite() && norm > 1e-9 {
        Some(v / norm)
    } else {
        None
    }
}

/// Angle between two vectors in degrees.
///
/// The cosine is clamped to [-1, 1] before `acos` so rounding noise on
/// parallel vectors never produces NaN. Zero vectors yield `None`.
pub fn angle_deg(a: &GravityVec, b: &GravityVec) -> Option<f64> {
    let ua = unit(a)?;
    let ub = unit(b)?;
    let cos = ua.dot(&ub).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// Component-wise median of a set of vectors.
pub fn component_median(vectors: &[GravityVec]) -> Option<GravityVec> {
    if vectors.is_empty() {
        return None;
    }
    let mut out = GravityVec::zeros();
    for axis in 0..3 {
        let mut values: Vec<f64> = vectors.iter().map(|v| v[axis]).collect();
        out[axis] = median(&mut values);
    }
    Some(out)
}

/// Median of a slice (sorted in place). Returns 0.0 for empty input.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
