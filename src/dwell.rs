//! Greedy dwell-zone clustering over stationary intervals.
//!
//! Single pass, order dependent: each point joins the nearest existing
//! centroid within the radius (first cluster wins ties) or starts a new one.

use serde::{Deserialize, Serialize};

use crate::config::DwellConfig;
use crate::geo_utils::haversine_distance;
use crate::types::{DayFilter, Interval};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DwellCluster {
    pub lat: f64,
    pub lon: f64,
    pub total_dwell_sec: i64,
    pub sample_count: usize,
    pub start_sec: i64,
    pub end_sec: i64,
}

impl DwellCluster {
    fn seed(iv: &Interval) -> Self {
        Self {
            lat: iv.lat,
            lon: iv.lon,
            total_dwell_sec: iv.dt,
            sample_count: 1,
            start_sec: iv.start_sec,
            end_sec: iv.end_sec,
        }
    }

    /// Dwell-weighted centroid update.
    fn absorb(&mut self, iv: &Interval) {
        let total = self.total_dwell_sec + iv.dt;
        if total > 0 {
            let w_old = self.total_dwell_sec as f64 / total as f64;
            let w_new = iv.dt as f64 / total as f64;
            self.lat = self.lat * w_old + iv.lat * w_new;
            self.lon = self.lon * w_old + iv.lon * w_new;
        }
        self.total_dwell_sec = total;
        self.sample_count += 1;
        self.start_sec = self.start_sec.min(iv.start_sec);
        self.end_sec = self.end_sec.max(iv.end_sec);
    }
}

/// Cluster the stationary intervals accepted by `filter`, in input order.
pub fn cluster_dwell(intervals: &[Interval], filter: DayFilter, config: &DwellConfig) -> Vec<DwellCluster> {
    let mut clusters: Vec<DwellCluster> = Vec::new();

    for iv in intervals
        .iter()
        .filter(|iv| iv.final_behavior.is_stationary() && filter.accepts(iv.is_day))
    {
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, haversine_distance(c.lat, c.lon, iv.lat, iv.lon)))
            .filter(|(_, d)| *d <= config.radius_m)
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            });

        match nearest {
            Some((i, _)) => clusters[i].absorb(iv),
            None => clusters.push(DwellCluster::seed(iv)),
        }
    }

    let formed = clusters.len();
    clusters.retain(|c| c.total_dwell_sec >= config.min_dwell_sec);
    // Stable sort keeps first-seen order among equal dwell times
    clusters.sort_by(|a, b| b.total_dwell_sec.cmp(&a.total_dwell_sec));

    log::debug!(
        "Dwell clustering ({:?}): {} formed, {} kept",
        filter,
        formed,
        clusters.len()
    );
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::stationary_seconds;
    use crate::types::{AccelMovement, Behavior, Consistency, GpsMovement};

    fn iv(start: i64, dt: i64, lat: f64, lon: f64, behavior: Behavior, is_day: bool) -> Interval {
        Interval {
            start_sec: start,
            end_sec: start + dt,
            dt,
            distance_m: 0.0,
            speed_mps: 0.0,
            bearing_deg: 0.0,
            is_day,
            lat,
            lon,
            gps_class: GpsMovement::Stationary,
            accel_class: AccelMovement::Stationary,
            final_behavior: behavior,
            consistency: Consistency::Consistent,
            confidence: 0.9,
            stand_by: false,
        }
    }

    fn sample_day() -> Vec<Interval> {
        let mut out = Vec::new();
        // 300 s lying at spot A, 200 s standing at spot B (~111 m north), 100 s at C
        for t in 0..300 {
            out.push(iv(t, 1, 45.0, 7.0, Behavior::Lying, true));
        }
        for t in 300..500 {
            out.push(iv(t, 1, 45.001, 7.0, Behavior::Standing, false));
        }
        for t in 500..600 {
            out.push(iv(t, 1, 45.002, 7.0, Behavior::Standing, true));
        }
        for t in 600..700 {
            out.push(iv(t, 1, 45.003, 7.0, Behavior::Walking, true));
        }
        out
    }

    #[test]
    fn test_clusters_sorted_and_filtered() {
        let clusters = cluster_dwell(&sample_day(), DayFilter::All, &DwellConfig::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].total_dwell_sec, 300);
        assert_eq!(clusters[1].total_dwell_sec, 200);
        assert_eq!(clusters[0].sample_count, 300);
        assert_eq!((clusters[0].start_sec, clusters[0].end_sec), (0, 300));
    }

    #[test]
    fn test_day_night_split() {
        let day = cluster_dwell(&sample_day(), DayFilter::Day, &DwellConfig::default());
        let night = cluster_dwell(&sample_day(), DayFilter::Night, &DwellConfig::default());
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].total_dwell_sec, 300);
        assert_eq!(night.len(), 1);
        assert_eq!(night[0].total_dwell_sec, 200);
    }

    #[test]
    fn test_weighted_centroid() {
        let intervals = vec![
            iv(0, 300, 45.0, 7.0, Behavior::Lying, true),
            iv(300, 100, 45.00004, 7.0, Behavior::Lying, true),
        ];
        let clusters = cluster_dwell(&intervals, DayFilter::All, &DwellConfig::default());
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].lat - 45.00001).abs() < 1e-9);
    }

    #[test]
    fn test_dwell_never_exceeds_stationary_time() {
        let intervals = sample_day();
        let clusters = cluster_dwell(&intervals, DayFilter::All, &DwellConfig::default());
        let clustered: i64 = clusters.iter().map(|c| c.total_dwell_sec).sum();
        assert!(clustered <= stationary_seconds(&intervals));
    }

    #[test]
    fn test_order_dependent_but_repeatable() {
        let intervals = sample_day();
        let a = cluster_dwell(&intervals, DayFilter::All, &DwellConfig::default());
        let b = cluster_dwell(&intervals, DayFilter::All, &DwellConfig::default());
        assert_eq!(a, b);
    }
}
