//! Isolation Forest anomaly scoring.
//!
//! Trees are stored as flat node arenas. Each tree is grown on a bootstrap
//! subsample by picking a random dimension and a uniform split value inside
//! that dimension's range until points are isolated or the depth cap
//! `ceil(log2(subsample))` is reached.

use rand::Rng;

use super::features::Feature;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Expected path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Split {
        dim: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Clone, Debug)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit<R: Rng>(points: &[Feature], max_depth: usize, rng: &mut R) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(points.to_vec(), 0, max_depth, rng);
        tree
    }

    /// Returns the arena index of the subtree root.
    fn grow<R: Rng>(&mut self, points: Vec<Feature>, depth: usize, max_depth: usize, rng: &mut R) -> usize {
        let idx = self.nodes.len();
        if depth >= max_depth || points.len() <= 1 {
            self.nodes.push(Node::Leaf { size: points.len() });
            return idx;
        }

        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for p in &points {
            for d in 0..2 {
                lo[d] = lo[d].min(p[d]);
                hi[d] = hi[d].max(p[d]);
            }
        }
        let splittable: Vec<usize> = (0..2).filter(|&d| hi[d] > lo[d]).collect();
        if splittable.is_empty() {
            // All points identical
            self.nodes.push(Node::Leaf { size: points.len() });
            return idx;
        }

        let dim = splittable[rng.gen_range(0..splittable.len())];
        let value = rng.gen_range(lo[dim]..hi[dim]);
        let (left_pts, right_pts): (Vec<Feature>, Vec<Feature>) = points.into_iter().partition(|p| p[dim] < value);

        // Reserve the slot, then fill in the children
        self.nodes.push(Node::Leaf { size: 0 });
        let left = self.grow(left_pts, depth + 1, max_depth, rng);
        let right = self.grow(right_pts, depth + 1, max_depth, rng);
        self.nodes[idx] = Node::Split { dim, value, left, right };
        idx
    }

    fn path_length(&self, p: &Feature) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                Node::Split { dim, value, left, right } => {
                    idx = if p[*dim] < *value { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
}

impl IsolationForest {
    /// Grow `n_trees` trees, each on `min(subsample_size, n)` points drawn with replacement.
    pub fn fit<R: Rng>(points: &[Feature], n_trees: usize, subsample_size: usize, rng: &mut R) -> Self {
        let psi = subsample_size.min(points.len());
        let max_depth = (psi.max(2) as f64).log2().ceil() as usize;

        let trees = if points.is_empty() {
            Vec::new()
        } else {
            (0..n_trees)
                .map(|_| {
                    let sample: Vec<Feature> = (0..psi).map(|_| points[rng.gen_range(0..points.len())]).collect();
                    IsolationTree::fit(&sample, max_depth, rng)
                })
                .collect()
        };

        Self {
            trees,
            subsample_size: psi,
        }
    }

    /// `2^(−E[h(x)] / c(ψ))`; higher is more anomalous. 0.5 when the forest is empty.
    pub fn score(&self, p: &Feature) -> f64 {
        let c = average_path_length(self.subsample_size);
        if self.trees.is_empty() || c <= 0.0 {
            return 0.5;
        }
        let mean = self.trees.iter().map(|t| t.path_length(p)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean / c)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnomalyScores {
    pub scores: Vec<f64>,
    pub anomalous: Vec<bool>,
    /// Score at which the contamination quota is reached; `None` when nothing is flagged.
    pub threshold: Option<f64>,
}

/// Score every point and flag the top `ceil(contamination · n)` (ties included).
pub fn detect_anomalies<R: Rng>(
    points: &[Feature],
    n_trees: usize,
    subsample_size: usize,
    contamination: f64,
    rng: &mut R,
) -> AnomalyScores {
    let forest = IsolationForest::fit(points, n_trees, subsample_size, rng);
    let scores: Vec<f64> = points.iter().map(|p| forest.score(p)).collect();

    let quota = (contamination.clamp(0.0, 1.0) * scores.len() as f64).ceil() as usize;
    let threshold = if quota == 0 {
        None
    } else {
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        sorted.get(quota - 1).copied()
    };

    let anomalous = scores
        .iter()
        .map(|s| threshold.is_some_and(|t| *s >= t))
        .collect();

    AnomalyScores {
        scores,
        anomalous,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cluster_with_outlier() -> Vec<Feature> {
        let mut pts: Vec<Feature> = (0..60)
            .map(|i| {
                let a = (i % 8) as f64 * 0.01;
                let b = (i / 8) as f64 * 0.01;
                [0.2 + a, 0.2 + b]
            })
            .collect();
        pts.push([1.0, 1.0]);
        pts
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) ≈ 10.24 is the usual reference value
        assert!((average_path_length(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_outlier_scores_highest() {
        let pts = cluster_with_outlier();
        let result = detect_anomalies(&pts, 40, 64, 0.02, &mut StdRng::seed_from_u64(11));
        let outlier = result.scores[60];
        assert!(result.scores[..60].iter().all(|s| *s < outlier));
        assert!(result.anomalous[60]);
        assert!(outlier > 0.6);
    }

    #[test]
    fn test_contamination_quota() {
        let pts = cluster_with_outlier();
        let result = detect_anomalies(&pts, 40, 64, 0.05, &mut StdRng::seed_from_u64(5));
        // ceil(0.05 * 61) = 4
        assert!(result.anomalous.iter().filter(|a| **a).count() >= 4);

        let none = detect_anomalies(&pts, 40, 64, 0.0, &mut StdRng::seed_from_u64(5));
        assert!(none.anomalous.iter().all(|a| !a));
        assert_eq!(none.threshold, None);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let pts = cluster_with_outlier();
        let a = detect_anomalies(&pts, 20, 32, 0.05, &mut StdRng::seed_from_u64(9));
        let b = detect_anomalies(&pts, 20, 32, 0.05, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input() {
        let result = detect_anomalies(&[], 10, 64, 0.05, &mut StdRng::seed_from_u64(1));
        assert!(result.scores.is_empty());
        assert_eq!(result.threshold, None);
    }
}
