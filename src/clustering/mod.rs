//! Exploratory clustering of co-location events.
//!
//! Events are mapped to `(duration_minutes, mean_distance_m)`, min-max
//! normalized, then grouped with one of three interchangeable algorithms.
//! k-means++ and the isolation forest draw from an explicit RNG that is
//! seeded from the config when a seed is given.

pub mod dbscan;
pub mod features;
pub mod isolation_forest;
pub mod kmeans;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::colocation::CoLocationEvent;
use crate::config::{Algorithm, ClusteringConfig};
use crate::types::Period;

pub use dbscan::dbscan;
pub use features::{normalize, raw_features, Feature};
pub use isolation_forest::{detect_anomalies, AnomalyScores, IsolationForest};
pub use kmeans::{kmeans, KMeansResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub event_index: usize,
    /// Cluster id (k-means, DBSCAN); `None` for DBSCAN noise and for isolation forest.
    pub label: Option<usize>,
    /// Isolation forest anomaly score.
    pub score: Option<f64>,
    pub anomalous: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ClusterGroup {
    Cluster(usize),
    Noise,
    Normal,
    Anomalous,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub group: ClusterGroup,
    pub count: usize,
    pub mean_duration_min: f64,
    pub mean_distance_m: f64,
    pub day_count: usize,
    pub night_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub algorithm: Algorithm,
    pub seed: Option<u64>,
    pub assignments: Vec<ClusterAssignment>,
    pub summaries: Vec<ClusterSummary>,
    pub anomaly_threshold: Option<f64>,
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn group_of(a: &ClusterAssignment, algorithm: Algorithm) -> ClusterGroup {
    match (algorithm, a.label) {
        (Algorithm::IsolationForest, _) if a.anomalous => ClusterGroup::Anomalous,
        (Algorithm::IsolationForest, _) => ClusterGroup::Normal,
        (_, Some(l)) => ClusterGroup::Cluster(l),
        (_, None) => ClusterGroup::Noise,
    }
}

/// Per-group counts and means in the original (unnormalized) units.
pub fn summarize(
    events: &[CoLocationEvent],
    assignments: &[ClusterAssignment],
    algorithm: Algorithm,
) -> Vec<ClusterSummary> {
    let mut groups: BTreeMap<ClusterGroup, ClusterSummary> = BTreeMap::new();
    for a in assignments {
        let Some(event) = events.get(a.event_index) else { continue };
        let group = group_of(a, algorithm);
        let entry = groups.entry(group).or_insert(ClusterSummary {
            group,
            count: 0,
            mean_duration_min: 0.0,
            mean_distance_m: 0.0,
            day_count: 0,
            night_count: 0,
        });
        entry.count += 1;
        entry.mean_duration_min += event.duration_sec as f64 / 60.0;
        entry.mean_distance_m += event.avg_dist;
        match event.period {
            Period::Day => entry.day_count += 1,
            Period::Night => entry.night_count += 1,
        }
    }
    groups
        .into_values()
        .map(|mut s| {
            s.mean_duration_min /= s.count as f64;
            s.mean_distance_m /= s.count as f64;
            s
        })
        .collect()
}

/// Run the configured algorithm over all events.
pub fn cluster_events(events: &[CoLocationEvent], config: &ClusteringConfig) -> ClusteringResult {
    let points = normalize(&raw_features(events));
    let mut rng = make_rng(config.seed);
    let mut anomaly_threshold = None;

    let assignments: Vec<ClusterAssignment> = match config.algorithm {
        Algorithm::KMeans => {
            let result = kmeans(&points, config.k, config.max_iterations, &mut rng);
            log::debug!("k-means converged after {} iterations", result.iterations);
            result
                .labels
                .iter()
                .enumerate()
                .map(|(i, &l)| ClusterAssignment {
                    event_index: i,
                    label: Some(l),
                    score: None,
                    anomalous: false,
                })
                .collect()
        }
        Algorithm::IsolationForest => {
            let result = detect_anomalies(
                &points,
                config.n_trees,
                config.subsample_size,
                config.contamination,
                &mut rng,
            );
            anomaly_threshold = result.threshold;
            result
                .scores
                .iter()
                .zip(&result.anomalous)
                .enumerate()
                .map(|(i, (&s, &anomalous))| ClusterAssignment {
                    event_index: i,
                    label: None,
                    score: Some(s),
                    anomalous,
                })
                .collect()
        }
        Algorithm::Dbscan => dbscan(&points, config.eps, config.min_pts)
            .into_iter()
            .enumerate()
            .map(|(i, label)| ClusterAssignment {
                event_index: i,
                label,
                score: None,
                anomalous: label.is_none(),
            })
            .collect(),
    };

    let summaries = summarize(events, &assignments, config.algorithm);
    log::info!(
        "Clustered {} co-location events with {:?} into {} groups",
        events.len(),
        config.algorithm,
        summaries.len()
    );

    ClusteringResult {
        algorithm: config.algorithm,
        seed: config.seed,
        assignments,
        summaries,
        anomaly_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(duration_sec: i64, avg_dist: f64, period: Period) -> CoLocationEvent {
        CoLocationEvent {
            pair_id: "1-2".into(),
            animal_a: "1".into(),
            animal_b: "2".into(),
            start_epoch: 0,
            end_epoch: duration_sec,
            duration_sec,
            min_dist: avg_dist,
            max_dist: avg_dist,
            avg_dist,
            center_lat: 45.0,
            center_lon: 7.0,
            period,
        }
    }

    fn cohort() -> Vec<CoLocationEvent> {
        let mut events = Vec::new();
        for i in 0..8 {
            events.push(event(60 + i * 5, 1.0 + i as f64 * 0.05, Period::Day));
            events.push(event(3600 + i * 30, 4.0 + i as f64 * 0.05, Period::Night));
        }
        events
    }

    #[test]
    fn test_kmeans_summary_splits_day_and_night_groups() {
        let config = ClusteringConfig {
            k: 2,
            seed: Some(4),
            ..Default::default()
        };
        let result = cluster_events(&cohort(), &config);
        assert_eq!(result.assignments.len(), 16);
        assert_eq!(result.summaries.len(), 2);
        for s in &result.summaries {
            assert_eq!(s.count, 8);
            assert!(s.day_count == 8 || s.night_count == 8);
        }
    }

    #[test]
    fn test_dbscan_noise_is_flagged() {
        let mut events = cohort();
        events.push(event(1800, 2.5, Period::Day));
        let config = ClusteringConfig {
            algorithm: Algorithm::Dbscan,
            eps: 0.2,
            min_pts: 3,
            ..Default::default()
        };
        let result = cluster_events(&events, &config);
        assert_eq!(result.assignments[16].label, None);
        assert!(result.assignments[16].anomalous);
        assert!(result.summaries.iter().any(|s| s.group == ClusterGroup::Noise && s.count == 1));
    }

    #[test]
    fn test_isolation_forest_reports_threshold() {
        let config = ClusteringConfig {
            algorithm: Algorithm::IsolationForest,
            seed: Some(8),
            ..Default::default()
        };
        let result = cluster_events(&cohort(), &config);
        assert!(result.anomaly_threshold.is_some());
        assert!(result.assignments.iter().all(|a| a.score.is_some()));
        let groups: Vec<ClusterGroup> = result.summaries.iter().map(|s| s.group).collect();
        assert!(groups.contains(&ClusterGroup::Anomalous));
    }

    #[test]
    fn test_empty_cohort() {
        let result = cluster_events(&[], &ClusteringConfig::default());
        assert!(result.assignments.is_empty());
        assert!(result.summaries.is_empty());
    }
}
