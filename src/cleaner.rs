//! Sample cleaning: parsing, geofencing, midnight-rollover repair and retry filtering.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::CleanerConfig;
use crate::error::{HerdError, HerdResult, ParseError};
use crate::facility::Facility;
use crate::types::{RawRecord, Sample, SECONDS_PER_DAY};

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
/// `%Y` also accepts two digits (year 0024), so short years get their own formats
const SHORT_YEAR_FORMATS: [&str; 2] = ["%d/%m/%y", "%d.%m.%y"];

/// Per-day counters describing what the cleaner kept and why it dropped the rest
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningDiagnostics {
    pub records_total: usize,
    pub records_parsed: usize,
    pub parse_errors: usize,
    pub fake_gps_records: usize,
    pub midnight_rollovers: usize,
    pub midnight_shifted: usize,
    pub retry_removed: usize,
    pub retry_kept: usize,
    pub duplicates_removed: usize,
}

/// A record after parsing, before it becomes a `Sample`
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRecord {
    pub nominal_date: NaiveDate,
    pub second_of_day: u32,
    pub epoch_second: i64,
    pub lat: f64,
    pub lon: f64,
    pub acc: (i32, i32, i32),
}

impl ParsedRecord {
    fn into_sample(self) -> Sample {
        let (x, y, z) = self.acc;
        Sample::new(self.epoch_second, self.lat, self.lon, (x as f64, y as f64, z as f64))
    }
}

#[derive(Clone, Debug)]
pub struct CleanedDay {
    pub samples: Vec<Sample>,
    pub diagnostics: CleaningDiagnostics,
}

/// Epoch second of 00:00:00 on `date`, treating the naive date as UTC
pub fn day_start_epoch(date: NaiveDate) -> i64 {
    (date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE) * SECONDS_PER_DAY
}

/// Parse `HH:MM[:SS[.fff]]` into seconds since midnight
pub fn parse_time_of_day(text: &str) -> Result<u32, ParseError> {
    let trimmed = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .map(|t| t.num_seconds_from_midnight())
        .ok_or_else(|| ParseError::Time(text.to_string()))
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let short_year = !trimmed.contains('-')
        && trimmed
            .rsplit(|c: char| c == '/' || c == '.')
            .next()
            .is_some_and(|year| year.len() == 2);
    let formats: &[&str] = if short_year { &SHORT_YEAR_FORMATS } else { &DATE_FORMATS };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

fn parse_coordinate(text: &str, limit: f64) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

/// Parse one raw record. An unreadable date falls back to `fallback_date`.
pub fn parse_record(record: &RawRecord, fallback_date: NaiveDate) -> Result<ParsedRecord, ParseError> {
    let second_of_day = parse_time_of_day(&record.time)?;
    let lat = parse_coordinate(&record.latitude, 90.0)
        .ok_or_else(|| ParseError::Latitude(record.latitude.clone()))?;
    let lon = parse_coordinate(&record.longitude, 180.0)
        .ok_or_else(|| ParseError::Longitude(record.longitude.clone()))?;
    let nominal_date = parse_date(&record.date).unwrap_or(fallback_date);

    Ok(ParsedRecord {
        nominal_date,
        second_of_day,
        epoch_second: day_start_epoch(nominal_date) + second_of_day as i64,
        lat,
        lon,
        acc: (record.acc_x, record.acc_y, record.acc_z),
    })
}

/// Repair dates that failed to roll over at midnight.
///
/// Works in arrival order. A late-evening record followed, on the same nominal
/// date, by an early-morning one at most `midnight_max_jump_sec` later across
/// midnight marks a missed rollover; from there on every
/// record of that nominal date is moved forward one day. Late records arriving
/// after the rollover are pre-midnight stragglers and keep their epoch.
///
/// Returns `(rollovers_detected, records_shifted)`.
pub fn repair_midnight(records: &mut [ParsedRecord], config: &CleanerConfig) -> (usize, usize) {
    let mut rolled_date: Option<NaiveDate> = None;
    let mut prev: Option<(NaiveDate, u32)> = None;
    let mut rollovers = 0;
    let mut shifted = 0;

    for record in records.iter_mut() {
        if let Some((prev_date, prev_sod)) = prev {
            if prev_date == record.nominal_date
                && prev_sod > config.midnight_late_sec
                && record.second_of_day < config.midnight_early_sec
                && SECONDS_PER_DAY - prev_sod as i64 + record.second_of_day as i64 <= config.midnight_max_jump_sec
                && rolled_date != Some(record.nominal_date)
            {
                rolled_date = Some(record.nominal_date);
                rollovers += 1;
            }
        }
        prev = Some((record.nominal_date, record.second_of_day));

        if rolled_date == Some(record.nominal_date) && record.second_of_day <= config.midnight_late_sec {
            record.epoch_second += SECONDS_PER_DAY;
            shifted += 1;
        }
    }

    (rollovers, shifted)
}

/// Drop stale retransmissions, then order by epoch.
///
/// Walks samples in arrival order; a sample more than `threshold_sec` behind the
/// newest epoch seen so far is a retry from a reconnecting device. Survivors are
/// stably sorted and duplicate epochs collapsed (first arrival wins).
///
/// Returns `(samples, retries_removed, duplicates_removed)`.
pub fn filter_retries(samples: Vec<Sample>, threshold_sec: i64) -> (Vec<Sample>, usize, usize) {
    let mut max_seen = i64::MIN;
    let mut removed = 0;
    let mut kept: Vec<Sample> = Vec::with_capacity(samples.len());

    for sample in samples {
        if max_seen != i64::MIN && sample.epoch_second < max_seen - threshold_sec {
            removed += 1;
            continue;
        }
        max_seen = max_seen.max(sample.epoch_second);
        kept.push(sample);
    }

    kept.sort_by_key(|s| s.epoch_second);
    let before = kept.len();
    kept.dedup_by_key(|s| s.epoch_second);
    let duplicates = before - kept.len();

    (kept, removed, duplicates)
}

/// Run the whole cleaning stage for one animal-day
pub fn clean_records(
    records: &[RawRecord],
    day: NaiveDate,
    facility: &Facility,
    config: &CleanerConfig,
) -> HerdResult<CleanedDay> {
    let mut diagnostics = CleaningDiagnostics {
        records_total: records.len(),
        ..Default::default()
    };

    let mut parsed = Vec::with_capacity(records.len());
    for record in records {
        match parse_record(record, day) {
            Ok(p) => {
                diagnostics.records_parsed += 1;
                if facility.in_fence(p.lat, p.lon) {
                    parsed.push(p);
                } else {
                    diagnostics.fake_gps_records += 1;
                }
            }
            Err(err) => {
                log::trace!("Dropping record: {}", err);
                diagnostics.parse_errors += 1;
            }
        }
    }

    let (rollovers, shifted) = repair_midnight(&mut parsed, config);
    diagnostics.midnight_rollovers = rollovers;
    diagnostics.midnight_shifted = shifted;

    let samples: Vec<Sample> = parsed.into_iter().map(ParsedRecord::into_sample).collect();
    let (samples, removed, duplicates) = filter_retries(samples, config.retry_backward_threshold_sec);
    diagnostics.retry_removed = removed;
    diagnostics.retry_kept = samples.len() + duplicates;
    diagnostics.duplicates_removed = duplicates;

    log::debug!(
        "Cleaned {}: {} parsed, {} parse errors, {} fake GPS, {} shifted, {} retries removed",
        day,
        diagnostics.records_parsed,
        diagnostics.parse_errors,
        diagnostics.fake_gps_records,
        diagnostics.midnight_shifted,
        diagnostics.retry_removed
    );

    if samples.len() < 2 {
        return Err(HerdError::InsufficientData {
            valid_samples: samples.len(),
            diagnostics,
        });
    }

    Ok(CleanedDay { samples, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::FacilityConfig;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn rec(time: &str, date: &str) -> RawRecord {
        RawRecord::new(time, date, 45.0, 7.0, (0, 0, 1024))
    }

    #[test]
    fn test_parse_time_variants() {
        assert_eq!(parse_time_of_day("06:30"), Ok(6 * 3600 + 30 * 60));
        assert_eq!(parse_time_of_day("23:59:59"), Ok(86_399));
        assert_eq!(parse_time_of_day(" 00:00:01.500 "), Ok(1));
        assert!(parse_time_of_day("24:00:00").is_err());
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Some(day());
        assert_eq!(parse_date("2024-03-15"), expected);
        assert_eq!(parse_date("15/03/2024"), expected);
        assert_eq!(parse_date("15.03.2024"), expected);
        assert_eq!(parse_date("15/03/24"), expected);
        assert_eq!(parse_date(" 15.03.24 "), expected);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_short_year_records_stay_on_their_day() {
        let records: Vec<RawRecord> = ["10:00:00", "10:00:01", "10:00:02"]
            .iter()
            .map(|t| rec(t, "15/03/24"))
            .collect();
        let cleaned = clean_records(&records, day(), &Facility::default(), &CleanerConfig::default()).unwrap();
        let start = day_start_epoch(day());
        let epochs: Vec<i64> = cleaned.samples.iter().map(|s| s.epoch_second).collect();
        assert_eq!(epochs, vec![start + 36_000, start + 36_001, start + 36_002]);
    }

    #[test]
    fn test_day_start_epoch() {
        assert_eq!(day_start_epoch(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
        assert_eq!(day_start_epoch(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 86_400);
    }

    #[test]
    fn test_parse_record_rejects_bad_coordinates() {
        let mut r = rec("10:00:00", "2024-03-15");
        r.latitude = "north".to_string();
        assert!(matches!(parse_record(&r, day()), Err(ParseError::Latitude(_))));
        let mut r = rec("10:00:00", "2024-03-15");
        r.longitude = "190.0".to_string();
        assert!(matches!(parse_record(&r, day()), Err(ParseError::Longitude(_))));
    }

    #[test]
    fn test_midnight_rollover_shifts_following_records() {
        let mut records: Vec<ParsedRecord> = ["23:59:50", "23:59:58", "00:00:03", "00:00:10"]
            .iter()
            .map(|t| parse_record(&rec(t, "2024-03-15"), day()).unwrap())
            .collect();
        let (rollovers, shifted) = repair_midnight(&mut records, &CleanerConfig::default());
        assert_eq!((rollovers, shifted), (1, 2));
        let epochs: Vec<i64> = records.iter().map(|r| r.epoch_second).collect();
        assert!(epochs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(epochs[2] - epochs[1], 5);
    }

    #[test]
    fn test_midnight_repair_noop_without_backward_jump() {
        let mut records: Vec<ParsedRecord> = ["05:00:00", "12:00:00", "19:00:00", "23:00:00"]
            .iter()
            .map(|t| parse_record(&rec(t, "2024-03-15"), day()).unwrap())
            .collect();
        let before = records.clone();
        let (rollovers, shifted) = repair_midnight(&mut records, &CleanerConfig::default());
        assert_eq!((rollovers, shifted), (0, 0));
        assert_eq!(records, before);
    }

    #[test]
    fn test_proper_date_rollover_is_untouched() {
        let mut records = vec![
            parse_record(&rec("23:59:58", "2024-03-15"), day()).unwrap(),
            parse_record(&rec("00:00:02", "2024-03-16"), day()).unwrap(),
        ];
        let (rollovers, _) = repair_midnight(&mut records, &CleanerConfig::default());
        assert_eq!(rollovers, 0);
        assert_eq!(records[1].epoch_second - records[0].epoch_second, 4);
    }

    #[test]
    fn test_retry_filter_drops_stale_records() {
        let samples: Vec<Sample> = [1000, 1001, 1600, 1002, 1601, 1350]
            .iter()
            .map(|&t| Sample::new(t, 45.0, 7.0, (0.0, 0.0, 1024.0)))
            .collect();
        let (kept, removed, duplicates) = filter_retries(samples, 300);
        // 1350 sits exactly 300 s behind the newest epoch and survives
        assert_eq!(removed, 1);
        assert_eq!(duplicates, 0);
        let epochs: Vec<i64> = kept.iter().map(|s| s.epoch_second).collect();
        assert_eq!(epochs, vec![1000, 1001, 1350, 1600, 1601]);
    }

    #[test]
    fn test_retry_threshold_boundary() {
        let samples: Vec<Sample> = [2000, 1700, 1699]
            .iter()
            .map(|&t| Sample::new(t, 45.0, 7.0, (0.0, 0.0, 1024.0)))
            .collect();
        let (kept, removed, _) = filter_retries(samples, 300);
        assert_eq!(removed, 1);
        let epochs: Vec<i64> = kept.iter().map(|s| s.epoch_second).collect();
        assert_eq!(epochs, vec![1700, 2000]);
    }

    #[test]
    fn test_stale_early_record_is_not_a_rollover() {
        // A 05:00 retransmission after a 20:00 fix: nine hours back, not a midnight crossing
        let mut records: Vec<ParsedRecord> = ["20:00:00", "05:00:00", "20:00:01", "20:00:02"]
            .iter()
            .map(|t| parse_record(&rec(t, "2024-03-15"), day()).unwrap())
            .collect();
        let before = records.clone();
        assert_eq!(repair_midnight(&mut records, &CleanerConfig::default()), (0, 0));
        assert_eq!(records, before);

        let samples: Vec<Sample> = records.into_iter().map(ParsedRecord::into_sample).collect();
        let (kept, removed, _) = filter_retries(samples, 300);
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_retry_filter_is_idempotent() {
        let samples: Vec<Sample> = [50, 10, 900, 20, 905, 700, 700]
            .iter()
            .map(|&t| Sample::new(t, 45.0, 7.0, (0.0, 0.0, 1024.0)))
            .collect();
        let (once, _, _) = filter_retries(samples, 300);
        let (twice, removed, duplicates) = filter_retries(once.clone(), 300);
        assert_eq!(removed, 0);
        assert_eq!(duplicates, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_all_records_outside_fence_is_insufficient() {
        let facility = Facility::new(&FacilityConfig {
            fences: vec![vec![[46.0, 8.0], [46.0, 8.01], [46.01, 8.01], [46.01, 8.0]]],
            ..Default::default()
        })
        .unwrap();
        let records: Vec<RawRecord> = (0..5)
            .map(|i| rec(&format!("10:00:0{}", i), "2024-03-15"))
            .collect();
        match clean_records(&records, day(), &facility, &CleanerConfig::default()) {
            Err(HerdError::InsufficientData { valid_samples, diagnostics }) => {
                assert_eq!(valid_samples, 0);
                assert_eq!(diagnostics.fake_gps_records, records.len());
            }
            other => panic!("expected InsufficientData, got {:?}", other.map(|d| d.samples.len())),
        }
    }

    #[test]
    fn test_parse_errors_are_counted_not_fatal() {
        let mut records = vec![
            rec("10:00:00", "2024-03-15"),
            rec("10:00:05", "2024-03-15"),
            rec("garbage", "2024-03-15"),
        ];
        records.push(rec("10:00:05", "2024-03-15"));
        let cleaned = clean_records(&records, day(), &Facility::default(), &CleanerConfig::default())
            .expect("two valid samples");
        assert_eq!(cleaned.samples.len(), 2);
        assert_eq!(cleaned.diagnostics.parse_errors, 1);
        assert_eq!(cleaned.diagnostics.duplicates_removed, 1);
    }
}
