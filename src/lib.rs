//! Livestock GPS + accelerometer behavior analysis.
//!
//! Raw tracker records for one animal-day flow through cleaning, 1 Hz
//! resampling, gravity/posture extraction, movement fusion and 24 h
//! accounting, then into spatial analyses (dwell zones, isolation). Across
//! animals, co-location events are detected per date and clustered.

pub mod accounting;
pub mod cleaner;
pub mod clustering;
pub mod colocation;
pub mod config;
pub mod dwell;
pub mod error;
pub mod facility;
pub mod filters;
pub mod geo_utils;
pub mod isolation;
pub mod movement;
pub mod pipeline;
pub mod posture;
pub mod registry;
pub mod report;
pub mod resample;
pub mod smoothing;
pub mod types;

pub use config::PipelineConfig;
pub use error::{HerdError, HerdResult};
pub use facility::{Facility, FacilityConfig};
pub use pipeline::{analyze_day, BatchRunner, DayAnalysis};
pub use registry::{DatasetId, DatasetRegistry};
pub use report::{BatchReport, DayReport};
