//! Density-based clustering with an R-tree neighborhood index.

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::VecDeque;

use super::features::Feature;

/// A feature point with its index for R-tree queries
#[derive(Debug, Clone, Copy)]
struct IndexedFeature {
    idx: usize,
    point: Feature,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for IndexedFeature {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Indices within `eps` of `p` (itself included), ascending so expansion order is stable.
fn region_query(tree: &RTree<IndexedFeature>, p: &Feature, eps: f64) -> Vec<usize> {
    let mut out: Vec<usize> = tree
        .locate_within_distance(*p, eps * eps)
        .map(|f| f.idx)
        .collect();
    out.sort_unstable();
    out
}

/// Label each point with a cluster id, or `None` for noise.
///
/// `min_pts` counts the point itself. `eps <= 0` leaves every point as noise.
pub fn dbscan(points: &[Feature], eps: f64, min_pts: usize) -> Vec<Option<usize>> {
    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    if eps <= 0.0 || points.is_empty() {
        return labels;
    }

    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedFeature { idx, point: *p })
            .collect(),
    );

    let mut visited = vec![false; points.len()];
    let mut next_cluster = 0;

    for i in 0..points.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let neighbors = region_query(&tree, &points[i], eps);
        if neighbors.len() < min_pts {
            // Noise for now; may still be claimed as a border point
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut queue: VecDeque<usize> = neighbors.into_iter().collect();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;

            let expansion = region_query(&tree, &points[j], eps);
            if expansion.len() >= min_pts {
                queue.extend(expansion);
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups_and_noise() -> Vec<Feature> {
        let mut pts = Vec::new();
        for i in 0..6 {
            pts.push([0.1 + i as f64 * 0.01, 0.1]);
        }
        for i in 0..6 {
            pts.push([0.8, 0.8 + i as f64 * 0.01]);
        }
        pts.push([0.45, 0.45]);
        pts
    }

    #[test]
    fn test_two_clusters_and_noise() {
        let labels = dbscan(&two_groups_and_noise(), 0.1, 3);
        assert!(labels[..6].iter().all(|l| *l == Some(0)));
        assert!(labels[6..12].iter().all(|l| *l == Some(1)));
        assert_eq!(labels[12], None);
    }

    #[test]
    fn test_zero_eps_is_all_noise() {
        let labels = dbscan(&two_groups_and_noise(), 0.0, 1);
        assert!(labels.iter().all(|l| l.is_none()));
    }

    #[test]
    fn test_min_pts_counts_self() {
        // Two points 0.05 apart: each neighborhood has exactly 2 members
        let pts = vec![[0.0, 0.0], [0.05, 0.0]];
        assert_eq!(dbscan(&pts, 0.1, 2), vec![Some(0), Some(0)]);
        assert_eq!(dbscan(&pts, 0.1, 3), vec![None, None]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Dense core at the origin, a border point reachable only from the core
        let pts = vec![[0.0, 0.0], [0.01, 0.0], [0.0, 0.01], [0.09, 0.0]];
        let labels = dbscan(&pts, 0.085, 3);
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(0)]);
    }
}
