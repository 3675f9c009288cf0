//! Gravity extraction and posture classification.
//!
//! Per sample: low-pass the accelerometer into a gravity estimate, measure
//! tilt against the calibrated reference and the local magnitude variance,
//! label the sample raw standing/lying/transition, then run the hysteresis
//! reducer to get a stable posture. Results are written onto each
//! [`Sample`] and summarized in a [`PostureTimeline`].

pub mod calibration;
pub mod hysteresis;

pub use calibration::{calibrate, Calibration, CalibrationStatus};
pub use hysteresis::{step, HysteresisParams, HysteresisState};

use serde::{Deserialize, Serialize};

use crate::config::PostureConfig;
use crate::filters::GravityFilter;
use crate::smoothing::RollingVariance;
use crate::types::{angle_deg, GravityVec, PostureContext, PostureState, RawPosture, Sample};

/// Tilt distance from the decision boundary that maps to full confidence.
const CONFIDENCE_SPAN_DEG: f64 = 45.0;

/// Variance above this fraction of the transition threshold halves confidence.
const UNSETTLED_VARIANCE_RATIO: f64 = 0.8;

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostureSegment {
    pub state: PostureState,
    pub start_epoch: i64,
    /// Exclusive.
    pub end_epoch: i64,
    pub sample_count: usize,
    pub mean_confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub seconds: i64,
    pub samples: usize,
    pub mean_confidence: f64,
    pub low_confidence_sec: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostureSummary {
    pub standing: StateSummary,
    pub lying: StateSummary,
    pub unknown: StateSummary,
    /// Seconds the raw classifier labeled transition.
    pub transition_sec: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostureTimeline {
    pub calibration: Calibration,
    pub segments: Vec<PostureSegment>,
    pub summary: PostureSummary,
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Raw per-sample label from tilt and local variance.
pub fn classify_raw(tilt_deg: Option<f64>, variance: f64, config: &PostureConfig) -> RawPosture {
    if variance > config.transition_variance {
        return RawPosture::Transition;
    }
    match tilt_deg {
        Some(t) if t < config.standing_ceiling_deg => RawPosture::Standing,
        Some(t) if t > config.lying_floor_deg => RawPosture::Lying,
        _ => RawPosture::Transition,
    }
}

/// How far tilt sits on the assigned state's side of the decision boundary, in [0, 1].
pub fn posture_confidence(state: PostureState, tilt_deg: Option<f64>, variance: f64, config: &PostureConfig) -> f64 {
    let Some(tilt) = tilt_deg else {
        return 0.0;
    };
    let boundary = (config.standing_ceiling_deg + config.lying_floor_deg) / 2.0;
    let signed = match state {
        PostureState::Standing => boundary - tilt,
        PostureState::Lying => tilt - boundary,
        PostureState::Unknown => return 0.0,
    };
    let mut confidence = (0.5 + signed / (2.0 * CONFIDENCE_SPAN_DEG)).clamp(0.0, 1.0);
    if variance > UNSETTLED_VARIANCE_RATIO * config.transition_variance {
        confidence *= 0.5;
    }
    confidence
}

// ─── Extraction ──────────────────────────────────────────────────────────────

struct GravityPoint {
    epoch: i64,
    gravity: GravityVec,
    variance: f64,
}

/// Low-pass each axis and track magnitude variance; both reset at grid gaps.
fn extract_gravity(samples: &[Sample], config: &PostureConfig) -> Vec<GravityPoint> {
    let mut filter = GravityFilter::new(config.lowpass_cutoff_hz, config.sample_rate_hz);
    let mut variance = RollingVariance::new(config.variance_window);
    let mut last_epoch: Option<i64> = None;

    samples
        .iter()
        .map(|s| {
            if last_epoch.is_some_and(|t| s.epoch_second - t > 1) {
                filter.reset();
                variance.clear();
            }
            last_epoch = Some(s.epoch_second);

            let gravity = filter.update(s.accel_g(config.counts_per_g));
            let var = variance.push(gravity.norm());
            GravityPoint {
                epoch: s.epoch_second,
                gravity,
                variance: var,
            }
        })
        .collect()
}

/// Annotate every sample with its posture context and build the timeline.
///
/// `reset_gap_sec` is the longest silence the hysteresis carries state
/// across (the resampler's max fillable gap).
pub fn extract_posture(samples: &mut [Sample], config: &PostureConfig, reset_gap_sec: i64) -> PostureTimeline {
    let points = extract_gravity(samples, config);
    let gravity: Vec<(i64, GravityVec)> = points.iter().map(|p| (p.epoch, p.gravity)).collect();
    let calibration = calibrate(&gravity, config);
    if calibration.status == CalibrationStatus::Uncalibrated {
        log::warn!(
            "Posture uncalibrated ({} of {} windows); using vertical reference",
            calibration.qualifying_windows,
            config.calibration_min_windows
        );
    }
    let reference = calibration.reference();

    let params = HysteresisParams {
        min_dwell_sec: config.min_dwell_sec,
        reset_gap_sec,
    };
    let mut state = HysteresisState::default();

    for (sample, point) in samples.iter_mut().zip(&points) {
        let tilt = angle_deg(&point.gravity, &reference);
        let raw = classify_raw(tilt, point.variance, config);
        state = step(state, point.epoch, raw, &params);
        sample.posture = Some(PostureContext {
            tilt_deg: tilt,
            variance: point.variance,
            raw,
            state: state.stable,
            confidence: posture_confidence(state.stable, tilt, point.variance, config),
        });
    }

    let timeline = PostureTimeline {
        calibration,
        segments: build_segments(samples),
        summary: summarize(samples, config),
    };
    log::debug!(
        "Posture: standing {}s, lying {}s, unknown {}s, {} segments",
        timeline.summary.standing.seconds,
        timeline.summary.lying.seconds,
        timeline.summary.unknown.seconds,
        timeline.segments.len()
    );
    timeline
}

/// Run-length segmentation of the stable state; grid gaps close a segment.
fn build_segments(samples: &[Sample]) -> Vec<PostureSegment> {
    let mut segments: Vec<PostureSegment> = Vec::new();
    let mut confidence_sum = 0.0;

    for s in samples {
        let Some(ctx) = s.posture else { continue };
        let extends = segments
            .last()
            .is_some_and(|seg| seg.state == ctx.state && seg.end_epoch == s.epoch_second);

        if extends {
            if let Some(seg) = segments.last_mut() {
                seg.end_epoch = s.epoch_second + 1;
                seg.sample_count += 1;
            }
            confidence_sum += ctx.confidence;
        } else {
            close_segment(&mut segments, confidence_sum);
            segments.push(PostureSegment {
                state: ctx.state,
                start_epoch: s.epoch_second,
                end_epoch: s.epoch_second + 1,
                sample_count: 1,
                mean_confidence: 0.0,
            });
            confidence_sum = ctx.confidence;
        }
    }
    close_segment(&mut segments, confidence_sum);
    segments
}

fn close_segment(segments: &mut [PostureSegment], confidence_sum: f64) {
    if let Some(seg) = segments.last_mut() {
        seg.mean_confidence = confidence_sum / seg.sample_count.max(1) as f64;
    }
}

/// Per-state time, sample counts and confidence. Each grid sample is one second.
fn summarize(samples: &[Sample], config: &PostureConfig) -> PostureSummary {
    let mut summary = PostureSummary::default();
    let mut sums = [0.0f64; 3];

    for ctx in samples.iter().filter_map(|s| s.posture) {
        if ctx.raw == RawPosture::Transition {
            summary.transition_sec += 1;
        }
        let (entry, idx) = match ctx.state {
            PostureState::Standing => (&mut summary.standing, 0),
            PostureState::Lying => (&mut summary.lying, 1),
            PostureState::Unknown => (&mut summary.unknown, 2),
        };
        entry.seconds += 1;
        entry.samples += 1;
        if ctx.confidence < config.low_confidence {
            entry.low_confidence_sec += 1;
        }
        sums[idx] += ctx.confidence;
    }

    for (entry, sum) in [&mut summary.standing, &mut summary.lying, &mut summary.unknown]
        .into_iter()
        .zip(sums)
    {
        if entry.samples > 0 {
            entry.mean_confidence = sum / entry.samples as f64;
        }
    }
    summary
}
