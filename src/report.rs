//! Serializable per-day and per-batch results.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::accounting::HeatPoint;
use crate::cleaner::CleaningDiagnostics;
use crate::clustering::ClusteringResult;
use crate::colocation::CoLocationEvent;
use crate::dwell::DwellCluster;
use crate::error::HerdResult;
use crate::isolation::IsolationReport;
use crate::posture::PostureTimeline;
use crate::registry::DatasetId;
use crate::types::{BehaviorTotals, Segment};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalDiagnostics {
    pub intervals_built: usize,
    pub intervals_skipped: usize,
    pub gaps_unfilled: usize,
    pub standby_gaps: usize,
    pub samples_interpolated: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DwellSplit {
    pub all: Vec<DwellCluster>,
    pub day: Vec<DwellCluster>,
    pub night: Vec<DwellCluster>,
}

/// Everything the pipeline derives for one animal-day
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    pub id: DatasetId,
    pub cleaning: CleaningDiagnostics,
    pub intervals: IntervalDiagnostics,
    pub totals: BehaviorTotals,
    pub consistency_score: f64,
    pub segments: Vec<Segment>,
    pub heat_points: Vec<HeatPoint>,
    pub red_zone_sec: i64,
    pub dwell: DwellSplit,
    pub isolation: IsolationReport,
    pub posture: PostureTimeline,
}

impl DayReport {
    /// `ID{animal}_{ddmmyy}.json`
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }

    pub fn save(&self, path: &Path) -> HerdResult<()> {
        write_json(self, path)
    }
}

/// A day that could not be analyzed, with whatever counters were gathered
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DayFailure {
    pub id: DatasetId,
    pub reason: String,
    pub diagnostics: Option<CleaningDiagnostics>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub days: Vec<DayReport>,
    pub failures: Vec<DayFailure>,
    pub colocation: Vec<CoLocationEvent>,
    pub clustering: ClusteringResult,
}

impl BatchReport {
    /// Write one file per day plus `colocation.json` and `clusters.json`
    /// (and `failures.json` when any day failed). Returns the paths written.
    pub fn save_all(&self, dir: &Path) -> HerdResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.days.len() + 3);

        for day in &self.days {
            let path = dir.join(day.file_name());
            day.save(&path)?;
            written.push(path);
        }

        let path = dir.join("colocation.json");
        write_json(&self.colocation, &path)?;
        written.push(path);

        let path = dir.join("clusters.json");
        write_json(&self.clustering, &path)?;
        written.push(path);

        if !self.failures.is_empty() {
            let path = dir.join("failures.json");
            write_json(&self.failures, &path)?;
            written.push(path);
        }

        Ok(written)
    }
}

pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> HerdResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
