//! Tunable parameters for every pipeline stage.
//!
//! All structs deserialize with `#[serde(default)]`, so a JSON file only
//! needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{HerdError, HerdResult};

// ─── Cleaner ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Records more than this many seconds behind the newest epoch seen are retries.
    pub retry_backward_threshold_sec: i64,
    /// A sample later than this time of day...
    pub midnight_late_sec: u32,
    /// ...followed by one earlier than this, on the same nominal date, is a missed rollover.
    pub midnight_early_sec: u32,
    /// Longest silence across midnight still read as a rollover. A larger jump
    /// back in time is a stale retransmission and is left to the retry filter.
    pub midnight_max_jump_sec: i64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            retry_backward_threshold_sec: 300,
            midnight_late_sec: 18 * 3600,
            midnight_early_sec: 6 * 3600,
            midnight_max_jump_sec: 3600,
        }
    }
}

// ─── Resampler ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub max_gap_sec: i64,
    pub standby_min_sec: i64,
    pub standby_max_sec: i64,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            max_gap_sec: 3600,
            standby_min_sec: 60,
            standby_max_sec: 3600,
        }
    }
}

// ─── Gravity / posture ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    // ── Scaling ──
    pub counts_per_g: f64,
    pub sample_rate_hz: f64,

    // ── Low-pass gravity filter ──
    pub lowpass_cutoff_hz: f64,

    // ── Auto-calibration ──
    pub calibration_window_sec: usize,
    pub calibration_step_sec: usize,
    pub calibration_horizon_sec: i64,
    pub calibration_variance_max: f64,
    pub calibration_magnitude_band: f64,
    pub calibration_min_windows: usize,

    // ── Raw classifier ──
    pub variance_window: usize,
    pub transition_variance: f64,
    pub standing_ceiling_deg: f64,
    pub lying_floor_deg: f64,

    // ── Hysteresis ──
    pub min_dwell_sec: i64,

    // ── Summary ──
    pub low_confidence: f64,
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            counts_per_g: 1024.0,
            sample_rate_hz: 1.0,
            lowpass_cutoff_hz: 0.4,
            calibration_window_sec: 60,
            calibration_step_sec: 60,
            calibration_horizon_sec: 86_400,
            calibration_variance_max: 0.0005,
            calibration_magnitude_band: 0.05,
            calibration_min_windows: 10,
            variance_window: 10,
            transition_variance: 0.005,
            standing_ceiling_deg: 35.0,
            lying_floor_deg: 55.0,
            min_dwell_sec: 300,
            low_confidence: 0.6,
        }
    }
}

// ─── Movement classification ─────────────────────────────────────────────────

/// Lower bounds (m/s) of each moving GPS class; below `grazing` is stationary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsThresholds {
    pub grazing: f64,
    pub slow_walk: f64,
    pub normal_walk: f64,
    pub fast_walk: f64,
    pub running: f64,
}

impl Default for GpsThresholds {
    fn default() -> Self {
        Self {
            grazing: 0.1,
            slow_walk: 0.3,
            normal_walk: 0.7,
            fast_walk: 1.2,
            running: 2.0,
        }
    }
}

/// Lower bounds (g of dynamic acceleration) of each accelerometer class.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelThresholds {
    pub ruminating: f64,
    pub grazing: f64,
    pub walking: f64,
    pub fast_walk: f64,
    pub running: f64,
}

impl Default for AccelThresholds {
    fn default() -> Self {
        Self {
            ruminating: 0.05,
            grazing: 0.1,
            walking: 0.2,
            fast_walk: 0.35,
            running: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub gps: GpsThresholds,
    pub accel: AccelThresholds,
    pub standby_confidence: f64,
    /// Correct lying detections outside the rest zone. Facility specific.
    pub enforce_rest_zone: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            gps: GpsThresholds::default(),
            accel: AccelThresholds::default(),
            standby_confidence: 0.85,
            enforce_rest_zone: true,
        }
    }
}

// ─── Dwell zones ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    pub radius_m: f64,
    pub min_dwell_sec: i64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            radius_m: 10.0,
            min_dwell_sec: 180,
        }
    }
}

// ─── Isolation / perimeter outliers ──────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub isolation_distance_m: f64,
    pub min_isolation_sec: i64,
    pub join_gap_sec: i64,
    pub perimeter_percentile: f64,
    pub perimeter_floor_m: f64,
    pub min_outlier_sec: i64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            isolation_distance_m: 50.0,
            min_isolation_sec: 1800,
            join_gap_sec: 60,
            perimeter_percentile: 85.0,
            perimeter_floor_m: 30.0,
            min_outlier_sec: 60,
        }
    }
}

// ─── Co-location ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoLocationConfig {
    pub step_sec: i64,
    pub max_distance_m: f64,
    pub min_duration_sec: i64,
    pub max_interp_gap_sec: i64,
}

impl Default for CoLocationConfig {
    fn default() -> Self {
        Self {
            step_sec: 5,
            max_distance_m: 5.0,
            min_duration_sec: 60,
            max_interp_gap_sec: 300,
        }
    }
}

// ─── Clustering engine ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    KMeans,
    IsolationForest,
    Dbscan,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub algorithm: Algorithm,
    pub k: usize,
    pub max_iterations: usize,
    pub n_trees: usize,
    pub subsample_size: usize,
    pub contamination: f64,
    pub eps: f64,
    pub min_pts: usize,
    /// Fixed seed for reproducible runs; `None` draws from system entropy.
    pub seed: Option<u64>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::KMeans,
            k: 3,
            max_iterations: 20,
            n_trees: 40,
            subsample_size: 64,
            contamination: 0.05,
            eps: 0.6,
            min_pts: 5,
            seed: None,
        }
    }
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cleaner: CleanerConfig,
    pub resample: ResampleConfig,
    pub posture: PostureConfig,
    pub movement: MovementConfig,
    pub dwell: DwellConfig,
    pub isolation: IsolationConfig,
    pub colocation: CoLocationConfig,
    pub clustering: ClusteringConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> HerdResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HerdResult<()> {
        let fail = |msg: &str| Err(HerdError::InvalidConfig(msg.to_string()));

        if self.cleaner.retry_backward_threshold_sec < 0 {
            return fail("retry_backward_threshold_sec must be >= 0");
        }
        if self.cleaner.midnight_max_jump_sec < 1 {
            return fail("midnight_max_jump_sec must be >= 1");
        }
        if self.resample.max_gap_sec < 1 {
            return fail("max_gap_sec must be >= 1");
        }
        if self.resample.standby_min_sec > self.resample.standby_max_sec {
            return fail("standby_min_sec exceeds standby_max_sec");
        }
        let p = &self.posture;
        if p.counts_per_g <= 0.0 || p.sample_rate_hz <= 0.0 || p.lowpass_cutoff_hz <= 0.0 {
            return fail("posture scale, sample rate and cutoff must be positive");
        }
        if p.calibration_window_sec == 0 || p.calibration_step_sec == 0 || p.variance_window == 0 {
            return fail("posture windows must be non-empty");
        }
        if p.standing_ceiling_deg > p.lying_floor_deg {
            return fail("standing_ceiling_deg exceeds lying_floor_deg");
        }
        if self.dwell.radius_m < 0.0 {
            return fail("dwell radius must be >= 0");
        }
        if !(0.0..=100.0).contains(&self.isolation.perimeter_percentile) {
            return fail("perimeter_percentile must lie in [0, 100]");
        }
        if self.colocation.step_sec < 1 {
            return fail("co-location step must be >= 1 second");
        }
        if self.colocation.max_distance_m < 0.0 {
            return fail("co-location distance must be >= 0");
        }
        let c = &self.clustering;
        if c.k == 0 {
            return fail("k must be >= 1");
        }
        if !(0.0..=0.5).contains(&c.contamination) {
            return fail("contamination must lie in [0, 0.5]");
        }
        if c.n_trees == 0 || c.subsample_size < 2 {
            return fail("isolation forest needs trees and a subsample of at least 2");
        }
        if c.min_pts == 0 {
            return fail("min_pts must be >= 1");
        }
        Ok(())
    }
}
