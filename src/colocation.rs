//! Pairwise co-location detection.
//!
//! Both animals' cleaned tracks are interpolated onto a shared time base
//! over their overlapping window; sustained runs of close proximity become
//! [`CoLocationEvent`]s.

use serde::{Deserialize, Serialize};

use crate::config::CoLocationConfig;
use crate::error::{HerdError, HerdResult};
use crate::geo_utils::{haversine_distance, lerp};
use crate::types::{second_of_day, Period, Sample};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoLocationEvent {
    pub pair_id: String,
    pub animal_a: String,
    pub animal_b: String,
    pub start_epoch: i64,
    pub end_epoch: i64,
    pub duration_sec: i64,
    pub min_dist: f64,
    pub max_dist: f64,
    pub avg_dist: f64,
    pub center_lat: f64,
    pub center_lon: f64,
    pub period: Period,
}

/// Shared epoch range `[start, end]` of two ascending tracks.
pub fn overlap(a: &[Sample], b: &[Sample]) -> Option<(i64, i64)> {
    let start = a.first()?.epoch_second.max(b.first()?.epoch_second);
    let end = a.last()?.epoch_second.min(b.last()?.epoch_second);
    (start <= end).then_some((start, end))
}

/// Linearly interpolated (lat, lon) at `epoch`.
///
/// `None` outside the track or inside a gap wider than `max_gap_sec`.
pub fn position_at(samples: &[Sample], epoch: i64, max_gap_sec: i64) -> Option<(f64, f64)> {
    let idx = samples.partition_point(|s| s.epoch_second < epoch);
    let next = samples.get(idx)?;
    if next.epoch_second == epoch {
        return Some((next.lat, next.lon));
    }
    let prev = samples.get(idx.checked_sub(1)?)?;
    let gap = next.epoch_second - prev.epoch_second;
    if gap > max_gap_sec {
        return None;
    }
    let t = (epoch - prev.epoch_second) as f64 / gap as f64;
    Some((lerp(prev.lat, next.lat, t), lerp(prev.lon, next.lon, t)))
}

struct OpenEpisode {
    start: i64,
    end: i64,
    min_dist: f64,
    max_dist: f64,
    dist_sum: f64,
    lat_sum: f64,
    lon_sum: f64,
    steps: usize,
}

impl OpenEpisode {
    fn start(t: i64, d: f64, mid: (f64, f64)) -> Self {
        Self {
            start: t,
            end: t,
            min_dist: d,
            max_dist: d,
            dist_sum: d,
            lat_sum: mid.0,
            lon_sum: mid.1,
            steps: 1,
        }
    }

    fn extend(&mut self, t: i64, d: f64, mid: (f64, f64)) {
        self.end = t;
        self.min_dist = self.min_dist.min(d);
        self.max_dist = self.max_dist.max(d);
        self.dist_sum += d;
        self.lat_sum += mid.0;
        self.lon_sum += mid.1;
        self.steps += 1;
    }
}

/// Stable identifier for an unordered pair.
pub fn pair_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}-{}", a, b)
    } else {
        format!("{}-{}", b, a)
    }
}

fn shared_window(id_a: &str, a: &[Sample], id_b: &str, b: &[Sample]) -> HerdResult<(i64, i64)> {
    overlap(a, b).ok_or_else(|| HerdError::NoOverlap {
        first: id_a.to_string(),
        second: id_b.to_string(),
    })
}

/// Proximity events between two animals. No shared window yields no events.
pub fn detect_pair(id_a: &str, a: &[Sample], id_b: &str, b: &[Sample], config: &CoLocationConfig) -> Vec<CoLocationEvent> {
    let (start, end) = match shared_window(id_a, a, id_b, b) {
        Ok(window) => window,
        Err(err) => {
            log::debug!("{}", err);
            return Vec::new();
        }
    };

    let (first, second) = if id_a <= id_b { (id_a, id_b) } else { (id_b, id_a) };
    let pair = pair_id(id_a, id_b);
    let step = config.step_sec.max(1);
    let mut events = Vec::new();
    let mut open: Option<OpenEpisode> = None;

    let emit = |ep: OpenEpisode, events: &mut Vec<CoLocationEvent>| {
        let duration = ep.end - ep.start;
        if duration < config.min_duration_sec {
            return;
        }
        let n = ep.steps as f64;
        events.push(CoLocationEvent {
            pair_id: pair.clone(),
            animal_a: first.to_string(),
            animal_b: second.to_string(),
            start_epoch: ep.start,
            end_epoch: ep.end,
            duration_sec: duration,
            min_dist: ep.min_dist,
            max_dist: ep.max_dist,
            avg_dist: ep.dist_sum / n,
            center_lat: ep.lat_sum / n,
            center_lon: ep.lon_sum / n,
            period: Period::from_second_of_day(second_of_day(ep.start)),
        });
    };

    let mut t = start;
    while t <= end {
        let close = match (
            position_at(a, t, config.max_interp_gap_sec),
            position_at(b, t, config.max_interp_gap_sec),
        ) {
            (Some(pa), Some(pb)) => {
                let d = haversine_distance(pa.0, pa.1, pb.0, pb.1);
                (d <= config.max_distance_m).then_some((d, ((pa.0 + pb.0) / 2.0, (pa.1 + pb.1) / 2.0)))
            }
            _ => None,
        };

        match close {
            Some((d, mid)) => {
                if let Some(ep) = open.as_mut() {
                    ep.extend(t, d, mid);
                } else {
                    open = Some(OpenEpisode::start(t, d, mid));
                }
            }
            None => {
                if let Some(ep) = open.take() {
                    emit(ep, &mut events);
                }
            }
        }
        t += step;
    }
    if let Some(ep) = open.take() {
        emit(ep, &mut events);
    }

    log::debug!("Co-location {}: {} events", pair, events.len());
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Meters expressed as degrees of latitude
    fn north(m: f64) -> f64 {
        m / 111_195.0
    }

    fn track(range: std::ops::Range<i64>, lat: impl Fn(i64) -> f64) -> Vec<Sample> {
        range.map(|t| Sample::new(t, lat(t), 7.0, (0.0, 0.0, 1024.0))).collect()
    }

    #[test]
    fn test_interpolation_fails_closed() {
        let samples = vec![
            Sample::new(0, 45.0, 7.0, (0.0, 0.0, 1024.0)),
            Sample::new(10, 45.001, 7.0, (0.0, 0.0, 1024.0)),
            Sample::new(1000, 45.0, 7.0, (0.0, 0.0, 1024.0)),
        ];
        let p = position_at(&samples, 5, 300).expect("inside a short gap");
        assert!((p.0 - 45.0005).abs() < 1e-12);
        assert_eq!(position_at(&samples, 500, 300), None);
        assert_eq!(position_at(&samples, -1, 300), None);
        assert_eq!(position_at(&samples, 1001, 300), None);
        assert_eq!(position_at(&samples, 1000, 300), Some((45.0, 7.0)));
    }

    #[test]
    fn test_ninety_seconds_together_at_two_pm() {
        let base = 14 * 3600;
        let a = track(base - 600..base + 600, |_| 45.0);
        // Within 3 m between 14:00:00 and 14:01:30, 50 m apart otherwise
        let b = track(base - 600..base + 600, |t| {
            if (base..=base + 90).contains(&t) {
                45.0 + north(3.0)
            } else {
                45.0 + north(50.0)
            }
        });
        let events = detect_pair("7", &a, "3", &b, &CoLocationConfig::default());
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.period, Period::Day);
        assert_eq!(ev.pair_id, "3-7");
        assert_eq!(ev.start_epoch, base);
        assert!((ev.duration_sec - 90).abs() <= 5);
        assert!(ev.max_dist <= 5.0);
    }

    #[test]
    fn test_short_contact_is_dropped() {
        let a = track(0..600, |_| 45.0);
        let b = track(0..600, |t| if (100..130).contains(&t) { 45.0 } else { 45.0 + north(40.0) });
        assert!(detect_pair("1", &a, "2", &b, &CoLocationConfig::default()).is_empty());
    }

    #[test]
    fn test_disjoint_tracks_yield_no_events() {
        let a = track(0..100, |_| 45.0);
        let b = track(200..300, |_| 45.0);
        assert_eq!(overlap(&a, &b), None);
        assert!(matches!(shared_window("1", &a, "2", &b), Err(HerdError::NoOverlap { .. })));
        assert!(detect_pair("1", &a, "2", &b, &CoLocationConfig::default()).is_empty());
    }

    #[test]
    fn test_night_period() {
        let a = track(3600..4000, |_| 45.0);
        let b = track(3600..4000, |_| 45.0 + north(1.0));
        let events = detect_pair("1", &a, "2", &b, &CoLocationConfig::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].period, Period::Night);
        assert_eq!(events[0].duration_sec, 395);
    }
}
