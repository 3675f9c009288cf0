//! Sustained isolation and perimeter-outlier detection.
//!
//! Both detectors measure each interval's distance from the facility
//! center and merge qualifying intervals into episodes:
//! - isolation: beyond a fixed distance, reported when long enough
//! - perimeter outlier: at or above `max(floor, percentile)` of the day's
//!   distances, split at day/night changes

use serde::{Deserialize, Serialize};

use crate::config::IsolationConfig;
use crate::facility::Facility;
use crate::geo_utils::{haversine_distance, percentile};
use crate::types::{Interval, Period};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    Isolation,
    PerimeterOutlier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolationEpisode {
    pub kind: EpisodeKind,
    pub start_sec: i64,
    pub end_sec: i64,
    /// Sum of member interval durations.
    pub duration_sec: i64,
    pub max_distance_m: f64,
    pub mean_distance_m: f64,
    pub period: Period,
    pub interval_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolationReport {
    pub center: Option<(f64, f64)>,
    pub perimeter_threshold_m: Option<f64>,
    pub isolation: Vec<IsolationEpisode>,
    pub perimeter_outliers: Vec<IsolationEpisode>,
}

// ─── Episode assembly ────────────────────────────────────────────────────────

struct EpisodeBuilder {
    kind: EpisodeKind,
    join_gap_sec: i64,
    split_on_period: bool,
    open: Option<IsolationEpisode>,
    distance_sum: f64,
    done: Vec<IsolationEpisode>,
}

impl EpisodeBuilder {
    fn new(kind: EpisodeKind, join_gap_sec: i64, split_on_period: bool) -> Self {
        Self {
            kind,
            join_gap_sec,
            split_on_period,
            open: None,
            distance_sum: 0.0,
            done: Vec::new(),
        }
    }

    fn push(&mut self, iv: &Interval, distance_m: f64) {
        let period = Period::from_second_of_day(iv.start_sec.rem_euclid(86_400) as u32);
        let joins = self.open.as_ref().is_some_and(|ep| {
            iv.start_sec - ep.end_sec <= self.join_gap_sec && !(self.split_on_period && ep.period != period)
        });

        if !joins {
            self.close();
            self.open = Some(IsolationEpisode {
                kind: self.kind,
                start_sec: iv.start_sec,
                end_sec: iv.end_sec,
                duration_sec: 0,
                max_distance_m: distance_m,
                mean_distance_m: 0.0,
                period,
                interval_count: 0,
            });
            self.distance_sum = 0.0;
        }

        if let Some(ep) = self.open.as_mut() {
            ep.end_sec = ep.end_sec.max(iv.end_sec);
            ep.duration_sec += iv.dt;
            ep.max_distance_m = ep.max_distance_m.max(distance_m);
            ep.interval_count += 1;
            self.distance_sum += distance_m;
        }
    }

    fn close(&mut self) {
        if let Some(mut ep) = self.open.take() {
            ep.mean_distance_m = self.distance_sum / ep.interval_count.max(1) as f64;
            self.done.push(ep);
        }
    }

    fn finish(mut self, min_duration_sec: i64) -> Vec<IsolationEpisode> {
        self.close();
        self.done.retain(|ep| ep.duration_sec >= min_duration_sec);
        self.done
    }
}

// ─── Detectors ───────────────────────────────────────────────────────────────

fn distances(intervals: &[Interval], center: (f64, f64)) -> Vec<f64> {
    intervals
        .iter()
        .map(|iv| haversine_distance(center.0, center.1, iv.lat, iv.lon))
        .collect()
}

/// Episodes spent beyond `isolation_distance_m` from the center.
pub fn detect_isolation(intervals: &[Interval], center: (f64, f64), config: &IsolationConfig) -> Vec<IsolationEpisode> {
    let mut builder = EpisodeBuilder::new(EpisodeKind::Isolation, config.join_gap_sec, false);
    for (iv, d) in intervals.iter().zip(distances(intervals, center)) {
        if d > config.isolation_distance_m {
            builder.push(iv, d);
        }
    }
    builder.finish(config.min_isolation_sec)
}

/// Episodes at or beyond the day's perimeter threshold. Returns the threshold used.
pub fn detect_perimeter_outliers(
    intervals: &[Interval],
    center: (f64, f64),
    config: &IsolationConfig,
) -> (Option<f64>, Vec<IsolationEpisode>) {
    let dists = distances(intervals, center);
    let Some(pct) = percentile(&dists, config.perimeter_percentile) else {
        return (None, Vec::new());
    };
    let threshold = pct.max(config.perimeter_floor_m);

    let mut builder = EpisodeBuilder::new(EpisodeKind::PerimeterOutlier, config.join_gap_sec, true);
    for (iv, d) in intervals.iter().zip(dists) {
        if d >= threshold {
            builder.push(iv, d);
        }
    }
    (Some(threshold), builder.finish(config.min_outlier_sec))
}

/// Run both detectors. Without a known center there is nothing to measure against.
pub fn detect(intervals: &[Interval], facility: &Facility, config: &IsolationConfig) -> IsolationReport {
    let Some(center) = facility.center() else {
        log::debug!("No facility center configured; isolation detection skipped");
        return IsolationReport::default();
    };

    let isolation = detect_isolation(intervals, center, config);
    let (perimeter_threshold_m, perimeter_outliers) = detect_perimeter_outliers(intervals, center, config);
    log::debug!(
        "Isolation: {} episodes, {} perimeter outliers (threshold {:?} m)",
        isolation.len(),
        perimeter_outliers.len(),
        perimeter_threshold_m
    );

    IsolationReport {
        center: Some(center),
        perimeter_threshold_m,
        isolation,
        perimeter_outliers,
    }
}
