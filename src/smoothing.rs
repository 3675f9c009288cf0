use std::collections::VecDeque;

/// Trailing-window variance of gravity magnitude
///
/// Keeps running sums so each update is O(1). Feeds the raw posture
/// classifier (high variance = transition) and the calibration scan.
pub struct RollingVariance {
    window: VecDeque<f64>,
    window_size: usize,
    sum: f64,
    sum_sq: f64,
}

impl RollingVariance {
    /// Create a new window holding at most `window_size` values
    pub fn new(window_size: usize) -> Self {
        RollingVariance {
            window: VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Push a value and return the population variance of the current window
    pub fn push(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        while self.window.len() > self.window_size {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
                self.sum_sq -= old * old;
            }
        }

        self.variance()
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.sum / self.window.len() as f64
    }

    pub fn variance(&self) -> f64 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.sum / n as f64;
        // Running sums can drift slightly negative on flat signals
        (self.sum_sq / n as f64 - mean * mean).max(0.0)
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }

    /// Get current window size (actual, not max)
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Population mean and variance of a slice in one pass
pub fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}
