use crate::types::GravityVec;

/// Highest usable cutoff as a fraction of the sample rate (just under Nyquist)
const MAX_CUTOFF_RATIO: f64 = 0.49;

/// 2nd-order Butterworth low-pass biquad (bilinear transform, pre-warped).
///
/// State is seeded from the first input so a constant signal passes through
/// without a start-up transient.
#[derive(Clone, Debug)]
pub struct Butterworth2 {
    b: [f64; 3],
    a: [f64; 3],
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
    initialized: bool,
}

impl Butterworth2 {
    pub fn low_pass(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let ratio = (cutoff_hz / sample_rate_hz).clamp(1e-6, MAX_CUTOFF_RATIO);
        let k = (std::f64::consts::PI * ratio).tan();
        let k2 = k * k;
        let sqrt2 = std::f64::consts::SQRT_2;
        let norm = 1.0 / (1.0 + sqrt2 * k + k2);

        let b0 = k2 * norm;
        Self {
            b: [b0, 2.0 * b0, b0],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - sqrt2 * k + k2) * norm],
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            initialized: false,
        }
    }

    pub fn filter(&mut self, x: f64) -> f64 {
        if !self.initialized {
            self.x1 = x;
            self.x2 = x;
            self.y1 = x;
            self.y2 = x;
            self.initialized = true;
        }
        let y = self.b[0] * x + self.b[1] * self.x1 + self.b[2] * self.x2
            - self.a[1] * self.y1
            - self.a[2] * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }
}

/// Independent low-pass per axis, turning raw acceleration into a gravity estimate
#[derive(Clone, Debug)]
pub struct GravityFilter {
    axes: [Butterworth2; 3],
}

impl GravityFilter {
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let lp = Butterworth2::low_pass(cutoff_hz, sample_rate_hz);
        Self {
            axes: [lp.clone(), lp.clone(), lp],
        }
    }

    pub fn update(&mut self, accel: GravityVec) -> GravityVec {
        GravityVec::new(
            self.axes[0].filter(accel.x),
            self.axes[1].filter(accel.y),
            self.axes[2].filter(accel.z),
        )
    }

    /// Forget history, e.g. across an unfilled data gap.
    pub fn reset(&mut self) {
        self.axes.iter_mut().for_each(Butterworth2::reset);
    }
}
