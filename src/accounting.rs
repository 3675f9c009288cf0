//! 24-hour time accounting, behavior segments and heat points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::facility::Facility;
use crate::types::{BehaviorTotals, Interval, Segment, SimpleBehavior, SECONDS_PER_DAY};

/// Heat grid resolution, about 1 m at mid latitudes.
const HEAT_GRID_SCALE: f64 = 1e5;

// ─── Totals ──────────────────────────────────────────────────────────────────

/// Sum interval durations per simplified behavior, plus seconds already known to be unknown
/// (gaps left open by the resampler), then reconcile to exactly one day.
pub fn account(intervals: &[Interval], open_gap_sec: i64) -> BehaviorTotals {
    let mut raw = BehaviorTotals::default();
    for iv in intervals {
        raw.add(iv.final_behavior.simplified(), iv.dt);
    }
    raw.unknown_sec += open_gap_sec;
    let totals = reconcile(raw);
    log::debug!(
        "Accounted day: lying {}s, standing {}s, walking {}s, unknown {}s (raw sum {}s)",
        totals.lying_sec,
        totals.standing_sec,
        totals.walking_sec,
        totals.unknown_sec,
        raw.total()
    );
    totals
}

/// Force `total() == 86400`.
///
/// A shortfall goes to unknown, never to lying. An excess shrinks lying,
/// standing and walking in proportion to their size (largest remainder
/// rounding); unknown is never reduced.
pub fn reconcile(raw: BehaviorTotals) -> BehaviorTotals {
    let clamp = |v: i64| v.max(0);
    let mut totals = BehaviorTotals {
        lying_sec: clamp(raw.lying_sec),
        standing_sec: clamp(raw.standing_sec),
        walking_sec: clamp(raw.walking_sec),
        unknown_sec: clamp(raw.unknown_sec),
    };

    let sum = totals.total();
    if sum <= SECONDS_PER_DAY {
        totals.unknown_sec += SECONDS_PER_DAY - sum;
        return totals;
    }

    if totals.unknown_sec >= SECONDS_PER_DAY {
        return BehaviorTotals {
            unknown_sec: SECONDS_PER_DAY,
            ..Default::default()
        };
    }

    let target = SECONDS_PER_DAY - totals.unknown_sec;
    let known = [totals.lying_sec, totals.standing_sec, totals.walking_sec];
    let known_sum: i64 = known.iter().sum();

    let mut shares = [0i64; 3];
    let mut remainders = [(0i64, 0usize); 3];
    for (i, v) in known.iter().enumerate() {
        let scaled = *v as i128 * target as i128;
        shares[i] = (scaled / known_sum as i128) as i64;
        remainders[i] = ((scaled % known_sum as i128) as i64, i);
    }
    let mut left = target - shares.iter().sum::<i64>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders {
        if left == 0 {
            break;
        }
        shares[i] += 1;
        left -= 1;
    }

    BehaviorTotals {
        lying_sec: shares[0],
        standing_sec: shares[1],
        walking_sec: shares[2],
        unknown_sec: totals.unknown_sec,
    }
}

// ─── Segments ────────────────────────────────────────────────────────────────

/// Merge touching intervals with the same behavior. The center is the mean
/// of the merged interval positions.
pub fn build_segments(intervals: &[Interval]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut count = 0usize;
    let mut sums = (0.0, 0.0);

    for iv in intervals {
        let extends = segments
            .last()
            .is_some_and(|seg| seg.behavior == iv.final_behavior && seg.end_sec == iv.start_sec);
        if extends {
            if let Some(seg) = segments.last_mut() {
                seg.end_sec = iv.end_sec;
            }
            count += 1;
            sums.0 += iv.lat;
            sums.1 += iv.lon;
        } else {
            finish_segment(&mut segments, count, sums);
            segments.push(Segment {
                behavior: iv.final_behavior,
                start_sec: iv.start_sec,
                end_sec: iv.end_sec,
                center_lat: iv.lat,
                center_lon: iv.lon,
            });
            count = 1;
            sums = (iv.lat, iv.lon);
        }
    }
    finish_segment(&mut segments, count, sums);
    segments
}

fn finish_segment(segments: &mut [Segment], count: usize, sums: (f64, f64)) {
    if let Some(seg) = segments.last_mut() {
        if count > 0 {
            seg.center_lat = sums.0 / count as f64;
            seg.center_lon = sums.1 / count as f64;
        }
    }
}

// ─── Heat points ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lon: f64,
    pub behavior: SimpleBehavior,
    pub weight_sec: i64,
}

/// Interval positions binned to a ~1 m grid and weighted by dwell seconds.
pub fn heat_points(intervals: &[Interval]) -> Vec<HeatPoint> {
    let mut bins: BTreeMap<(SimpleBehavior, i64, i64), i64> = BTreeMap::new();
    for iv in intervals {
        let behavior = iv.final_behavior.simplified();
        if behavior == SimpleBehavior::Unknown {
            continue;
        }
        let key = (
            behavior,
            (iv.lat * HEAT_GRID_SCALE).round() as i64,
            (iv.lon * HEAT_GRID_SCALE).round() as i64,
        );
        *bins.entry(key).or_insert(0) += iv.dt;
    }
    bins.into_iter()
        .map(|((behavior, lat, lon), weight_sec)| HeatPoint {
            lat: lat as f64 / HEAT_GRID_SCALE,
            lon: lon as f64 / HEAT_GRID_SCALE,
            behavior,
            weight_sec,
        })
        .collect()
}

/// Seconds spent at positions inside a red zone.
pub fn red_zone_seconds(intervals: &[Interval], facility: &Facility) -> i64 {
    intervals
        .iter()
        .filter(|iv| facility.in_red_zone(iv.lat, iv.lon))
        .map(|iv| iv.dt)
        .sum()
}

/// Seconds of stationary behavior in the intervals.
pub fn stationary_seconds(intervals: &[Interval]) -> i64 {
    intervals
        .iter()
        .filter(|iv| iv.final_behavior.is_stationary())
        .map(|iv| iv.dt)
        .sum()
}
