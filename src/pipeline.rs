//! Orchestration: one animal-day end to end, and the parallel batch runner.
//!
//! Each day is an independent, single-threaded run that owns its samples.
//! `BatchRunner` fans days (and then animal pairs) out over a fixed pool of
//! scoped worker threads fed through a crossbeam channel.

use crossbeam::channel;
use std::collections::BTreeMap;

use crate::accounting::{account, build_segments, heat_points, red_zone_seconds};
use crate::cleaner::{clean_records, day_start_epoch};
use crate::clustering::cluster_events;
use crate::colocation::{detect_pair, CoLocationEvent};
use crate::config::PipelineConfig;
use crate::dwell::cluster_dwell;
use crate::error::{HerdError, HerdResult};
use crate::facility::Facility;
use crate::isolation;
use crate::movement::{build_intervals, consistency_score, IntervalContext};
use crate::posture::extract_posture;
use crate::registry::{DatasetId, DatasetRegistry};
use crate::report::{BatchReport, DayFailure, DayReport, DwellSplit, IntervalDiagnostics};
use crate::resample::resample;
use crate::types::{DayFilter, RawRecord, Sample};

/// A finished day plus the cleaned track that co-location runs on
#[derive(Clone, Debug)]
pub struct DayAnalysis {
    pub report: DayReport,
    pub samples: Vec<Sample>,
}

/// Run every per-animal stage for one day.
///
/// Fails only when cleaning leaves fewer than two samples.
pub fn analyze_day(
    id: &DatasetId,
    records: &[RawRecord],
    facility: &Facility,
    config: &PipelineConfig,
) -> HerdResult<DayAnalysis> {
    let cleaned = clean_records(records, id.date, facility, &config.cleaner)?;

    let resampled = resample(&cleaned.samples, &config.resample);
    let mut samples = resampled.samples;
    let posture = extract_posture(&mut samples, &config.posture, config.resample.max_gap_sec);

    let ctx = IntervalContext {
        facility,
        movement: &config.movement,
        posture: &config.posture,
        resample: &config.resample,
    };
    let build = build_intervals(&samples, day_start_epoch(id.date), &ctx);
    let intervals = build.intervals;

    let totals = account(&intervals, build.skipped_sec);
    let dwell = DwellSplit {
        all: cluster_dwell(&intervals, DayFilter::All, &config.dwell),
        day: cluster_dwell(&intervals, DayFilter::Day, &config.dwell),
        night: cluster_dwell(&intervals, DayFilter::Night, &config.dwell),
    };

    let report = DayReport {
        id: id.clone(),
        intervals: IntervalDiagnostics {
            intervals_built: intervals.len(),
            intervals_skipped: build.skipped,
            gaps_unfilled: resampled.stats.gaps_unfilled,
            standby_gaps: resampled.stats.standby_gaps,
            samples_interpolated: resampled.stats.samples_interpolated,
        },
        cleaning: cleaned.diagnostics,
        totals,
        consistency_score: consistency_score(&intervals),
        segments: build_segments(&intervals),
        heat_points: heat_points(&intervals),
        red_zone_sec: red_zone_seconds(&intervals, facility),
        dwell,
        isolation: isolation::detect(&intervals, facility, &config.isolation),
        posture,
    };

    log::info!(
        "{}: lying {}s, standing {}s, walking {}s, unknown {}s, {} dwell zones, {} isolation episodes",
        id,
        totals.lying_sec,
        totals.standing_sec,
        totals.walking_sec,
        totals.unknown_sec,
        report.dwell.all.len(),
        report.isolation.isolation.len()
    );

    Ok(DayAnalysis {
        report,
        samples: cleaned.samples,
    })
}

// ─── Worker pool ─────────────────────────────────────────────────────────────

/// Apply `job` to every item on `workers` scoped threads.
/// Output order matches input; `None` marks an item whose worker panicked.
fn run_pool<T, R, F>(items: &[T], workers: usize, job: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let (job_tx, job_rx) = channel::unbounded::<(usize, &T)>();
    let (result_tx, result_rx) = channel::unbounded::<(usize, R)>();
    for item in items.iter().enumerate() {
        // Receiver is alive until the scope below ends
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    let workers = workers.clamp(1, items.len().max(1));
    let job = &job;
    let outcome = crossbeam::scope(|scope| {
        for _ in 0..workers {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            scope.spawn(move |_| {
                for (i, item) in rx.iter() {
                    if tx.send((i, job(item))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);
    if outcome.is_err() {
        log::error!("A batch worker panicked; its remaining jobs are dropped");
    }

    let mut out: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    for (i, result) in result_rx.iter() {
        out[i] = Some(result);
    }
    out
}

// ─── Batch runner ────────────────────────────────────────────────────────────

pub struct BatchRunner<'a> {
    facility: &'a Facility,
    config: &'a PipelineConfig,
    workers: usize,
}

impl<'a> BatchRunner<'a> {
    pub fn new(facility: &'a Facility, config: &'a PipelineConfig) -> Self {
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            facility,
            config,
            workers,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Analyze every registered day, then co-location for each pair of
    /// animals sharing a date, then clustering over all events.
    pub fn run(&self, registry: &DatasetRegistry) -> BatchReport {
        let entries: Vec<(&DatasetId, &[RawRecord])> = registry.iter().collect();
        log::info!("Analyzing {} animal-days on {} workers", entries.len(), self.workers);

        let outcomes = run_pool(&entries, self.workers, |(id, records)| {
            analyze_day(id, records, self.facility, self.config)
        });

        let mut days = Vec::new();
        let mut failures = Vec::new();
        let mut tracks: BTreeMap<DatasetId, Vec<Sample>> = BTreeMap::new();

        for ((id, _), outcome) in entries.iter().zip(outcomes) {
            match outcome {
                Some(Ok(analysis)) => {
                    tracks.insert((*id).clone(), analysis.samples);
                    days.push(analysis.report);
                }
                Some(Err(err)) => {
                    log::warn!("{} failed: {}", id, err);
                    failures.push(day_failure(id, err));
                }
                None => failures.push(DayFailure {
                    id: (*id).clone(),
                    reason: "worker panicked".to_string(),
                    diagnostics: None,
                }),
            }
        }

        let colocation = self.colocate(&tracks);
        let clustering = cluster_events(&colocation, &self.config.clustering);

        log::info!(
            "Batch done: {} days ok, {} failed, {} co-location events",
            days.len(),
            failures.len(),
            colocation.len()
        );

        BatchReport {
            days,
            failures,
            colocation,
            clustering,
        }
    }

    fn colocate(&self, tracks: &BTreeMap<DatasetId, Vec<Sample>>) -> Vec<CoLocationEvent> {
        // BTreeMap order groups ids by animal, so collect per date first
        let mut by_date: BTreeMap<_, Vec<(&DatasetId, &[Sample])>> = BTreeMap::new();
        for (id, samples) in tracks {
            by_date.entry(id.date).or_default().push((id, samples.as_slice()));
        }

        let mut pairs = Vec::new();
        for animals in by_date.values() {
            for (i, a) in animals.iter().enumerate() {
                for b in &animals[i + 1..] {
                    pairs.push((*a, *b));
                }
            }
        }
        log::debug!("Running co-location over {} animal pairs", pairs.len());

        let config = &self.config.colocation;
        let mut events: Vec<CoLocationEvent> = run_pool(&pairs, self.workers, |((id_a, a), (id_b, b))| {
            detect_pair(&id_a.animal_id, a, &id_b.animal_id, b, config)
        })
        .into_iter()
        .flatten()
        .flatten()
        .collect();

        events.sort_by(|x, y| (x.start_epoch, &x.pair_id).cmp(&(y.start_epoch, &y.pair_id)));
        events
    }
}

fn day_failure(id: &DatasetId, err: HerdError) -> DayFailure {
    let reason = err.to_string();
    let diagnostics = match err {
        HerdError::InsufficientData { diagnostics, .. } => Some(diagnostics),
        _ => None,
    };
    DayFailure {
        id: id.clone(),
        reason,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn hms(sec: u32) -> String {
        format!("{:02}:{:02}:{:02}", sec / 3600, (sec / 60) % 60, sec % 60)
    }

    /// A standing animal parked at one spot, one fix every 10 s for an hour from 10:00.
    fn standing_records(lat: f64, lon: f64) -> Vec<RawRecord> {
        (0..360)
            .map(|i| RawRecord::new(&hms(36_000 + i * 10), "15/03/2024", lat, lon, (0, 0, 1024)))
            .collect()
    }

    #[test]
    fn test_run_pool_preserves_order() {
        let items: Vec<u32> = (0..50).collect();
        let out = run_pool(&items, 4, |x| x * 2);
        let values: Vec<u32> = out.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(values, (0..50).map(|x| x * 2).collect::<Vec<_>>());
        assert!(run_pool(&Vec::<u32>::new(), 4, |x| *x).is_empty());
    }

    #[test]
    fn test_analyze_day_accounts_whole_day() {
        let id = DatasetId::new("7", date());
        let analysis = analyze_day(
            &id,
            &standing_records(45.0, 7.0),
            &Facility::default(),
            &PipelineConfig::default(),
        )
        .unwrap();
        let report = &analysis.report;
        assert_eq!(report.totals.total(), 86_400);
        assert!(report.totals.standing_sec >= 3500);
        assert_eq!(report.cleaning.records_total, 360);
        assert_eq!(analysis.samples.len(), 360);
        assert_eq!(report.intervals.intervals_built, 3590);
        assert_eq!(report.dwell.all.len(), 1);
        assert!(report.dwell.night.is_empty());
    }

    #[test]
    fn test_batch_reports_failures_and_colocation() {
        let mut registry = DatasetRegistry::new();
        registry.insert(DatasetId::new("1", date()), standing_records(45.0, 7.0));
        registry.insert(DatasetId::new("2", date()), standing_records(45.00001, 7.0));
        registry.insert(DatasetId::new("3", date()), vec![RawRecord::new("10:00:00", "", 45.0, 7.0, (0, 0, 1024))]);

        let facility = Facility::default();
        let config = PipelineConfig::default();
        let report = BatchRunner::new(&facility, &config).with_workers(2).run(&registry);

        assert_eq!(report.days.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id.animal_id, "3");
        assert!(report.failures[0].diagnostics.is_some());

        assert_eq!(report.colocation.len(), 1);
        let event = &report.colocation[0];
        assert_eq!(event.pair_id, "1-2");
        assert_eq!(event.duration_sec, 3590);
        assert_eq!(report.clustering.assignments.len(), 1);
    }
}
