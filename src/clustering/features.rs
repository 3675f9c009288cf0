use crate::colocation::CoLocationEvent;

/// A point in the 2-D feature space: `[duration_minutes, mean_distance_m]`.
pub type Feature = [f64; 2];

pub fn raw_features(events: &[CoLocationEvent]) -> Vec<Feature> {
    events
        .iter()
        .map(|e| [e.duration_sec as f64 / 60.0, e.avg_dist])
        .collect()
}

/// Min-max scale each dimension to [0, 1] across the whole cohort.
/// A dimension with no spread maps to 0.
pub fn normalize(points: &[Feature]) -> Vec<Feature> {
    let mut lo = [f64::INFINITY; 2];
    let mut hi = [f64::NEG_INFINITY; 2];
    for p in points {
        for d in 0..2 {
            lo[d] = lo[d].min(p[d]);
            hi[d] = hi[d].max(p[d]);
        }
    }
    points
        .iter()
        .map(|p| {
            let mut out = [0.0; 2];
            for d in 0..2 {
                let range = hi[d] - lo[d];
                if range > 0.0 {
                    out[d] = (p[d] - lo[d]) / range;
                }
            }
            out
        })
        .collect()
}

pub fn squared_distance(a: &Feature, b: &Feature) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}
