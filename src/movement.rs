//! Movement classification and GPS / accelerometer / posture fusion.
//!
//! Each adjacent pair of resampled samples becomes an [`Interval`]. GPS
//! speed and dynamic acceleration are classified independently against
//! their threshold ladders, then reconciled with the stable posture into a
//! final behavior and a consistency tag.

use crate::config::{AccelThresholds, GpsThresholds, MovementConfig, PostureConfig, ResampleConfig};
use crate::facility::Facility;
use crate::geo_utils::{bearing_deg, haversine_distance};
use crate::types::{
    is_day_second, AccelMovement, Behavior, Consistency, GpsMovement, Interval, PostureState, RawPosture,
    Sample, SECONDS_PER_DAY,
};

const CONSISTENT_CONFIDENCE: f64 = 0.9;
const GPS_OVERRIDE_CONFIDENCE: f64 = 0.7;
const ZONE_OVERRIDE_CONFIDENCE: f64 = 0.6;
/// Used when no posture context is available for a stationary interval.
const POSTURE_FALLBACK_CONFIDENCE: f64 = 0.5;

// ─── Ladders ─────────────────────────────────────────────────────────────────

pub fn classify_gps(speed_mps: f64, t: &GpsThresholds) -> GpsMovement {
    if speed_mps >= t.running {
        GpsMovement::Running
    } else if speed_mps >= t.fast_walk {
        GpsMovement::FastWalk
    } else if speed_mps >= t.normal_walk {
        GpsMovement::NormalWalk
    } else if speed_mps >= t.slow_walk {
        GpsMovement::SlowWalk
    } else if speed_mps >= t.grazing {
        GpsMovement::Grazing
    } else {
        GpsMovement::Stationary
    }
}

pub fn classify_accel(dynamic_g: f64, t: &AccelThresholds) -> AccelMovement {
    if dynamic_g >= t.running {
        AccelMovement::Running
    } else if dynamic_g >= t.fast_walk {
        AccelMovement::FastWalk
    } else if dynamic_g >= t.walking {
        AccelMovement::Walking
    } else if dynamic_g >= t.grazing {
        AccelMovement::Grazing
    } else if dynamic_g >= t.ruminating {
        AccelMovement::Ruminating
    } else {
        AccelMovement::Stationary
    }
}

/// |‖a‖ / scale − 1 g|
pub fn dynamic_acceleration(sample: &Sample, counts_per_g: f64) -> f64 {
    (sample.magnitude / counts_per_g - 1.0).abs()
}

// ─── Fusion ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fused {
    pub behavior: Behavior,
    pub consistency: Consistency,
    pub confidence: f64,
}

/// Inputs to the fusion rule for one interval.
#[derive(Clone, Copy, Debug)]
pub struct FusionInput {
    pub gps: GpsMovement,
    pub accel: AccelMovement,
    pub posture: PostureState,
    pub raw_posture: Option<RawPosture>,
    pub posture_confidence: Option<f64>,
    pub stand_by: bool,
    /// `None` when the facility has no rest zone.
    pub in_rest_zone: Option<bool>,
}

/// Posture for a StandBy interval: stable state, then the raw tilt label, then standing.
fn standby_behavior(input: &FusionInput) -> Behavior {
    match (input.posture, input.raw_posture) {
        (PostureState::Lying, _) => Behavior::Lying,
        (PostureState::Standing, _) => Behavior::Standing,
        (PostureState::Unknown, Some(RawPosture::Lying)) => Behavior::Lying,
        _ => Behavior::Standing,
    }
}

pub fn fuse(input: &FusionInput, config: &MovementConfig) -> Fused {
    if input.stand_by {
        return Fused {
            behavior: standby_behavior(input),
            consistency: Consistency::Standby,
            confidence: config.standby_confidence,
        };
    }

    let mut fused = if input.gps.is_moving() {
        let behavior = if input.gps == GpsMovement::Grazing {
            Behavior::Grazing
        } else {
            Behavior::Walking
        };
        if input.accel.is_moving() {
            Fused {
                behavior,
                consistency: Consistency::Consistent,
                confidence: CONSISTENT_CONFIDENCE,
            }
        } else {
            Fused {
                behavior,
                consistency: Consistency::GpsOverride,
                confidence: GPS_OVERRIDE_CONFIDENCE,
            }
        }
    } else {
        let posture_confidence = input.posture_confidence.unwrap_or(POSTURE_FALLBACK_CONFIDENCE);
        match input.posture {
            PostureState::Lying if input.accel == AccelMovement::Stationary => Fused {
                behavior: Behavior::Lying,
                consistency: Consistency::Consistent,
                confidence: posture_confidence,
            },
            // Chewing or shifting while down
            PostureState::Lying => Fused {
                behavior: Behavior::LyingActive,
                consistency: Consistency::LyingActive,
                confidence: posture_confidence,
            },
            _ if input.accel.is_moving() => Fused {
                behavior: Behavior::Standing,
                consistency: Consistency::AccelDisagree,
                confidence: posture_confidence * 0.5,
            },
            _ => Fused {
                behavior: Behavior::Standing,
                consistency: Consistency::Consistent,
                confidence: posture_confidence,
            },
        }
    };

    let lying = matches!(fused.behavior, Behavior::Lying | Behavior::LyingActive);
    if config.enforce_rest_zone && lying && input.in_rest_zone == Some(false) {
        fused = Fused {
            behavior: if input.accel >= AccelMovement::Walking {
                Behavior::Walking
            } else {
                Behavior::Standing
            },
            consistency: Consistency::ZoneOverride,
            confidence: ZONE_OVERRIDE_CONFIDENCE,
        };
    }
    fused
}

// ─── Interval building ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct IntervalBuild {
    pub intervals: Vec<Interval>,
    /// Adjacent pairs left open because their gap exceeds the max fillable gap.
    pub skipped: usize,
    pub skipped_sec: i64,
}

/// Shared knobs for interval construction.
#[derive(Clone, Copy, Debug)]
pub struct IntervalContext<'a> {
    pub facility: &'a Facility,
    pub movement: &'a MovementConfig,
    pub posture: &'a PostureConfig,
    pub resample: &'a ResampleConfig,
}

/// Build one classified interval per adjacent sample pair, clipped to the day
/// window `[day_start, day_start + 86400)`. Times are seconds from `day_start`.
pub fn build_intervals(samples: &[Sample], day_start: i64, ctx: &IntervalContext) -> IntervalBuild {
    let day_end = day_start + SECONDS_PER_DAY;
    let mut build = IntervalBuild::default();

    for pair in samples.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let gap = b.epoch_second - a.epoch_second;
        if gap <= 0 {
            continue;
        }

        let start = a.epoch_second.max(day_start);
        let end = b.epoch_second.min(day_end);
        if end <= start {
            continue;
        }

        if gap > ctx.resample.max_gap_sec {
            build.skipped += 1;
            build.skipped_sec += end - start;
            continue;
        }

        let distance_m = haversine_distance(a.lat, a.lon, b.lat, b.lon);
        let speed_mps = distance_m / gap as f64;
        let stand_by = a.stand_by || b.stand_by;

        // StandBy holds the earlier fix, so its posture describes the whole gap
        let posture_source = if stand_by { a } else { b };
        let ctx_posture = posture_source.posture;

        let gps = classify_gps(speed_mps, &ctx.movement.gps);
        let accel = classify_accel(dynamic_acceleration(b, ctx.posture.counts_per_g), &ctx.movement.accel);
        let fused = fuse(
            &FusionInput {
                gps,
                accel,
                posture: posture_source.posture_state(),
                raw_posture: ctx_posture.map(|p| p.raw),
                posture_confidence: ctx_posture.map(|p| p.confidence),
                stand_by,
                in_rest_zone: ctx.facility.in_rest_zone(b.lat, b.lon),
            },
            ctx.movement,
        );

        let start_sec = start - day_start;
        build.intervals.push(Interval {
            start_sec,
            end_sec: end - day_start,
            dt: end - start,
            distance_m,
            speed_mps,
            bearing_deg: bearing_deg(a.lat, a.lon, b.lat, b.lon),
            is_day: is_day_second(start_sec as u32),
            lat: b.lat,
            lon: b.lon,
            gps_class: gps,
            accel_class: accel,
            final_behavior: fused.behavior,
            consistency: fused.consistency,
            confidence: fused.confidence,
            stand_by,
        });
    }

    log::debug!(
        "Built {} intervals, {} skipped ({}s over max gap)",
        build.intervals.len(),
        build.skipped,
        build.skipped_sec
    );
    build
}

/// `1 − inconsistent / classified` over non-StandBy time; 1.0 when nothing was classified.
pub fn consistency_score(intervals: &[Interval]) -> f64 {
    let (total, inconsistent) = intervals
        .iter()
        .filter(|iv| !iv.stand_by)
        .fold((0i64, 0i64), |(total, bad), iv| {
            let disagree = iv.gps_class.is_moving() != iv.accel_class.is_moving();
            (total + iv.dt, bad + if disagree { iv.dt } else { 0 })
        });
    if total == 0 {
        return 1.0;
    }
    1.0 - inconsistent as f64 / total as f64
}
