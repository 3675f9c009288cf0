/// Signal filters used by the gravity/posture stage

pub mod butterworth;

pub use butterworth::{Butterworth2, GravityFilter};
