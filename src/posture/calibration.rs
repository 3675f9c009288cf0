//! Auto-calibration of the "upright" reference vector.
//!
//! Scans the low-passed gravity stream for quiet, level windows (low
//! magnitude variance, mean magnitude close to 1 g) and aggregates their
//! component-wise medians into one unit reference.

use serde::{Deserialize, Serialize};

use crate::config::PostureConfig;
use crate::smoothing::mean_variance;
use crate::types::{component_median, unit, vertical, GravityVec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationStatus {
    /// Enough quiet windows were found; reference is fixed for the run.
    Calibrated,
    /// Data present but too few quiet windows; vertical fallback in use.
    Uncalibrated,
    /// No data to calibrate from.
    Pending,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub status: CalibrationStatus,
    pub reference_vector: [f64; 3],
    /// Samples scanned inside the calibration horizon.
    pub sample_count: usize,
    pub qualifying_windows: usize,
}

impl Calibration {
    fn fallback(status: CalibrationStatus, sample_count: usize, qualifying_windows: usize) -> Self {
        let v = vertical();
        Self {
            status,
            reference_vector: [v.x, v.y, v.z],
            sample_count,
            qualifying_windows,
        }
    }

    pub fn reference(&self) -> GravityVec {
        GravityVec::from(self.reference_vector)
    }

    pub fn is_calibrated(&self) -> bool {
        self.status == CalibrationStatus::Calibrated
    }
}

/// Derive the reference vector from `(epoch_second, filtered gravity)` pairs.
///
/// Windows must be contiguous on the 1 s grid; a window straddling an
/// unfilled gap is skipped.
pub fn calibrate(gravity: &[(i64, GravityVec)], config: &PostureConfig) -> Calibration {
    let Some(&(first_epoch, _)) = gravity.first() else {
        return Calibration::fallback(CalibrationStatus::Pending, 0, 0);
    };

    let horizon_end = first_epoch + config.calibration_horizon_sec;
    let scanned: Vec<&(i64, GravityVec)> = gravity.iter().take_while(|(t, _)| *t < horizon_end).collect();

    let window = config.calibration_window_sec.max(1);
    let step = config.calibration_step_sec.max(1);
    let mut medians: Vec<GravityVec> = Vec::new();

    let mut start = 0;
    while start + window <= scanned.len() {
        let slice = &scanned[start..start + window];
        start += step;

        let span = slice[window - 1].0 - slice[0].0;
        if span != (window - 1) as i64 {
            continue;
        }

        let magnitudes: Vec<f64> = slice.iter().map(|(_, g)| g.norm()).collect();
        let (mean, var) = mean_variance(&magnitudes);
        if var >= config.calibration_variance_max || (mean - 1.0).abs() >= config.calibration_magnitude_band {
            continue;
        }

        let vectors: Vec<GravityVec> = slice.iter().map(|(_, g)| *g).collect();
        if let Some(m) = component_median(&vectors) {
            medians.push(m);
        }
    }

    log::debug!(
        "Calibration scan: {} samples, {} qualifying windows (need {})",
        scanned.len(),
        medians.len(),
        config.calibration_min_windows
    );

    if medians.len() < config.calibration_min_windows {
        return Calibration::fallback(CalibrationStatus::Uncalibrated, scanned.len(), medians.len());
    }

    match component_median(&medians).and_then(|m| unit(&m)) {
        Some(r) => Calibration {
            status: CalibrationStatus::Calibrated,
            reference_vector: [r.x, r.y, r.z],
            sample_count: scanned.len(),
            qualifying_windows: medians.len(),
        },
        None => Calibration::fallback(CalibrationStatus::Uncalibrated, scanned.len(), medians.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn steady(n: usize, g: GravityVec) -> Vec<(i64, GravityVec)> {
        (0..n).map(|i| (i as i64, g)).collect()
    }

    #[test]
    fn test_empty_is_pending() {
        let cal = calibrate(&[], &PostureConfig::default());
        assert_eq!(cal.status, CalibrationStatus::Pending);
        assert_eq!(cal.reference(), vertical());
    }

    #[test]
    fn test_quiet_tilted_collar_calibrates() {
        let tilted = GravityVec::new(0.0, 0.6, 0.8);
        let cal = calibrate(&steady(900, tilted), &PostureConfig::default());
        assert_eq!(cal.status, CalibrationStatus::Calibrated);
        assert_eq!(cal.qualifying_windows, 15);
        let r = cal.reference();
        assert_relative_eq!(r.y, 0.6, epsilon = 1e-9);
        assert_relative_eq!(r.z, 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_too_few_windows_falls_back_to_vertical() {
        let cal = calibrate(&steady(300, GravityVec::new(0.0, 0.6, 0.8)), &PostureConfig::default());
        assert_eq!(cal.status, CalibrationStatus::Uncalibrated);
        assert_eq!(cal.qualifying_windows, 5);
        assert_eq!(cal.reference(), vertical());
    }

    #[test]
    fn test_noisy_or_off_gravity_windows_rejected() {
        // Magnitude 0.5 g is never level rest
        let cal = calibrate(&steady(900, GravityVec::new(0.0, 0.0, 0.5)), &PostureConfig::default());
        assert_eq!(cal.qualifying_windows, 0);

        let noisy: Vec<(i64, GravityVec)> = (0..900)
            .map(|i| (i as i64, GravityVec::new(0.0, 0.0, if i % 2 == 0 { 1.2 } else { 0.8 })))
            .collect();
        let cal = calibrate(&noisy, &PostureConfig::default());
        assert_eq!(cal.qualifying_windows, 0);
        assert_eq!(cal.status, CalibrationStatus::Uncalibrated);
    }

    #[test]
    fn test_windows_across_gaps_are_skipped() {
        let g = GravityVec::new(0.0, 0.0, 1.0);
        // 30 s on, 10 s hole: no contiguous 60 s window exists
        let data: Vec<(i64, GravityVec)> = (0..2000i64).filter(|t| t % 40 < 30).map(|t| (t, g)).collect();
        let cal = calibrate(&data, &PostureConfig::default());
        assert_eq!(cal.qualifying_windows, 0);
    }
}
