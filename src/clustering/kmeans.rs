//! k-means with k-means++ seeding.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::features::{squared_distance, Feature};

#[derive(Clone, Debug, PartialEq)]
pub struct KMeansResult {
    pub labels: Vec<usize>,
    pub centroids: Vec<Feature>,
    pub iterations: usize,
}

/// Pick `k` seeds, each new one with probability proportional to its squared
/// distance from the nearest seed already chosen.
pub fn seed_centroids<R: Rng>(points: &[Feature], k: usize, rng: &mut R) -> Vec<Feature> {
    let mut centroids: Vec<Feature> = Vec::with_capacity(k);
    if points.is_empty() || k == 0 {
        return centroids;
    }
    centroids.push(points[rng.gen_range(0..points.len())]);

    while centroids.len() < k {
        let d2: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        // All points already coincide with a seed: fall back to a uniform pick
        let idx = match WeightedIndex::new(&d2) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..points.len()),
        };
        centroids.push(points[idx]);
    }
    centroids
}

fn nearest(p: &Feature, centroids: &[Feature]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(p, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Lloyd iterations until assignments stop changing or `max_iterations` is hit.
/// `k` is clamped to the number of points; an emptied cluster keeps its centroid.
pub fn kmeans<R: Rng>(points: &[Feature], k: usize, max_iterations: usize, rng: &mut R) -> KMeansResult {
    let k = k.min(points.len());
    let mut centroids = seed_centroids(points, k, rng);
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centroids)).collect();
    let mut iterations = 0;

    while iterations < max_iterations && k > 0 {
        iterations += 1;

        let mut sums = vec![[0.0f64; 2]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in points.iter().zip(&labels) {
            sums[l][0] += p[0];
            sums[l][1] += p[1];
            counts[l] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                centroids[c] = [sums[c][0] / counts[c] as f64, sums[c][1] / counts[c] as f64];
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centroids)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    KMeansResult {
        labels,
        centroids,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blobs() -> Vec<Feature> {
        let mut pts = Vec::new();
        for i in 0..10 {
            let j = i as f64 * 0.01;
            pts.push([0.1 + j, 0.1 + j]);
            pts.push([0.9 - j, 0.9 - j]);
        }
        pts
    }

    #[test]
    fn test_k1_puts_everything_in_one_cluster() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = kmeans(&blobs(), 1, 20, &mut rng);
        assert!(result.labels.iter().all(|&l| l == 0));
        assert_eq!(result.centroids.len(), 1);
        assert!((result.centroids[0][0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_separates_two_blobs() {
        let mut rng = StdRng::seed_from_u64(7);
        let pts = blobs();
        let result = kmeans(&pts, 2, 20, &mut rng);
        for pair in result.labels.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        let low = result.labels[0];
        assert!(result.labels.iter().step_by(2).all(|&l| l == low));
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let pts = blobs();
        let a = kmeans(&pts, 3, 20, &mut StdRng::seed_from_u64(42));
        let b = kmeans(&pts, 3, 20, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_k_clamped_and_duplicates_handled() {
        let pts = vec![[0.5, 0.5]; 3];
        let result = kmeans(&pts, 5, 20, &mut StdRng::seed_from_u64(3));
        assert_eq!(result.centroids.len(), 3);
        assert_eq!(result.labels, vec![0, 0, 0]);
        assert!(kmeans(&[], 3, 20, &mut StdRng::seed_from_u64(3)).labels.is_empty());
    }
}
