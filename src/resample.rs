//! Gap-aware 1 Hz resampling.
//!
//! Every gap up to `max_gap_sec` is filled with one synthetic sample per second.
//! Gaps inside the StandBy band are held at the earlier fix (device asleep,
//! animal still); other gaps are linearly interpolated. Longer gaps stay open
//! and are accounted as unknown time downstream.

use serde::{Deserialize, Serialize};

use crate::config::ResampleConfig;
use crate::geo_utils::lerp;
use crate::types::Sample;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResampleStats {
    pub samples_interpolated: usize,
    pub standby_gaps: usize,
    pub gaps_unfilled: usize,
    pub unfilled_sec: i64,
}

#[derive(Clone, Debug)]
pub struct Resampled {
    pub samples: Vec<Sample>,
    pub stats: ResampleStats,
}

/// True when a gap of `gap_sec` seconds looks like device sleep
pub fn is_standby_gap(gap_sec: i64, config: &ResampleConfig) -> bool {
    gap_sec >= config.standby_min_sec && gap_sec <= config.standby_max_sec
}

/// Resample an ascending-epoch sequence onto a 1 s grid. Deterministic.
pub fn resample(samples: &[Sample], config: &ResampleConfig) -> Resampled {
    let mut stats = ResampleStats::default();
    let mut out: Vec<Sample> = Vec::with_capacity(samples.len());

    for pair in samples.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        out.push(a.clone());

        let gap = b.epoch_second - a.epoch_second;
        if gap <= 1 {
            continue;
        }
        if gap > config.max_gap_sec {
            stats.gaps_unfilled += 1;
            stats.unfilled_sec += gap;
            continue;
        }

        let standby = is_standby_gap(gap, config);
        if standby {
            stats.standby_gaps += 1;
        }

        for k in 1..gap {
            let mut filled = if standby {
                Sample::new(a.epoch_second + k, a.lat, a.lon, (a.acc_x, a.acc_y, a.acc_z))
            } else {
                let t = k as f64 / gap as f64;
                Sample::new(
                    a.epoch_second + k,
                    lerp(a.lat, b.lat, t),
                    lerp(a.lon, b.lon, t),
                    (
                        lerp(a.acc_x, b.acc_x, t),
                        lerp(a.acc_y, b.acc_y, t),
                        lerp(a.acc_z, b.acc_z, t),
                    ),
                )
            };
            filled.interpolated = true;
            filled.stand_by = standby;
            out.push(filled);
        }
        stats.samples_interpolated += (gap - 1) as usize;
    }

    if let Some(last) = samples.last() {
        out.push(last.clone());
    }

    log::debug!(
        "Resampled {} -> {} samples ({} StandBy gaps, {} unfilled gaps, {}s unfilled)",
        samples.len(),
        out.len(),
        stats.standby_gaps,
        stats.gaps_unfilled,
        stats.unfilled_sec
    );

    Resampled { samples: out, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(t: i64, lat: f64, lon: f64) -> Sample {
        Sample::new(t, lat, lon, (0.0, 0.0, 1024.0))
    }

    #[test]
    fn test_short_gap_is_interpolated() {
        let samples = vec![s(100, 45.0, 7.0), s(104, 45.0004, 7.0)];
        let out = resample(&samples, &ResampleConfig::default());
        assert_eq!(out.samples.len(), 5);
        assert!(!out.samples[2].stand_by);
        assert!(out.samples[2].interpolated);
        assert!((out.samples[2].lat - 45.0002).abs() < 1e-12);
        assert!(!out.samples[4].interpolated);
    }

    #[test]
    fn test_standby_gap_holds_position() {
        let samples = vec![s(0, 45.0, 7.0), s(200, 45.001, 7.001)];
        let out = resample(&samples, &ResampleConfig::default());
        assert_eq!(out.samples.len(), 201);
        assert_eq!(out.stats.standby_gaps, 1);
        assert!(out.samples[1..200].iter().all(|x| x.stand_by && x.lat == 45.0 && x.lon == 7.0));
    }

    #[test]
    fn test_epoch_steps_and_unfilled_gaps() {
        let samples = vec![s(0, 45.0, 7.0), s(30, 45.0, 7.0), s(10_000, 45.0, 7.0), s(10_002, 45.0, 7.0)];
        let config = ResampleConfig::default();
        let out = resample(&samples, &config);
        let originals: Vec<i64> = samples.iter().map(|x| x.epoch_second).collect();
        for w in out.samples.windows(2) {
            let step = w[1].epoch_second - w[0].epoch_second;
            if step != 1 {
                assert!(originals.contains(&w[0].epoch_second) && originals.contains(&w[1].epoch_second));
                assert!(step > config.max_gap_sec);
            }
        }
        assert_eq!(out.stats.gaps_unfilled, 1);
        assert_eq!(out.stats.unfilled_sec, 9_970);
    }

    #[test]
    fn test_deterministic() {
        let samples = vec![s(0, 45.0, 7.0), s(45, 45.0003, 7.0002), s(500, 45.0, 7.0)];
        let a = resample(&samples, &ResampleConfig::default());
        let b = resample(&samples, &ResampleConfig::default());
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn test_epoch_continues_across_midnight() {
        let samples = vec![s(86_398, 45.0, 7.0), s(86_402, 45.0, 7.0)];
        let out = resample(&samples, &ResampleConfig::default());
        let sods: Vec<u32> = out.samples.iter().map(|x| x.second_of_day).collect();
        assert_eq!(sods, vec![86_398, 86_399, 0, 1, 2]);
    }
}
