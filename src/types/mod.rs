pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Deserializer, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;
pub const DAY_START_SEC: u32 = 6 * 3600;
pub const DAY_END_SEC: u32 = 18 * 3600;

/// Wraps an epoch second into [0, 86399].
pub fn second_of_day(epoch_second: i64) -> u32 {
    epoch_second.rem_euclid(SECONDS_PER_DAY) as u32
}

/// Daylight is [06:00, 18:00).
pub fn is_day_second(second_of_day: u32) -> bool {
    (DAY_START_SEC..DAY_END_SEC).contains(&second_of_day)
}

// ─── Raw input ───────────────────────────────────────────────────────────────

/// One telemetry record exactly as delivered by a tracker.
///
/// Coordinates stay textual until the cleaner parses them; files in the
/// wild carry them both as JSON strings and as numbers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawRecord {
    pub time: String,
    #[serde(default)]
    pub date: String,
    #[serde(deserialize_with = "string_or_number")]
    pub latitude: String,
    #[serde(deserialize_with = "string_or_number")]
    pub longitude: String,
    pub acc_x: i32,
    pub acc_y: i32,
    pub acc_z: i32,
}

impl RawRecord {
    pub fn new(time: &str, date: &str, latitude: f64, longitude: f64, acc: (i32, i32, i32)) -> Self {
        Self {
            time: time.to_string(),
            date: date.to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            acc_x: acc.0,
            acc_y: acc.1,
            acc_z: acc.2,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        Text(String),
        Number(f64),
    }

    Ok(match Field::deserialize(deserializer)? {
        Field::Text(s) => s,
        Field::Number(n) => n.to_string(),
    })
}

// ─── Posture ─────────────────────────────────────────────────────────────────

/// Per-sample label from the tilt/variance classifier, before hysteresis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawPosture {
    Standing,
    Lying,
    Transition,
}

/// Stable posture after hysteresis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    Standing,
    Lying,
    Unknown,
}

/// Posture annotation written onto each resampled sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostureContext {
    pub tilt_deg: Option<f64>,
    pub variance: f64,
    pub raw: RawPosture,
    pub state: PostureState,
    pub confidence: f64,
}

// ─── Samples ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub second_of_day: u32,
    pub epoch_second: i64,
    pub lat: f64,
    pub lon: f64,
    /// Raw accelerometer counts (fractional once interpolated).
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    /// Euclidean norm of the raw counts.
    pub magnitude: f64,
    pub interpolated: bool,
    pub stand_by: bool,
    pub posture: Option<PostureContext>,
}

impl Sample {
    pub fn new(epoch_second: i64, lat: f64, lon: f64, acc: (f64, f64, f64)) -> Self {
        let (acc_x, acc_y, acc_z) = acc;
        Self {
            second_of_day: second_of_day(epoch_second),
            epoch_second,
            lat,
            lon,
            acc_x,
            acc_y,
            acc_z,
            magnitude: (acc_x * acc_x + acc_y * acc_y + acc_z * acc_z).sqrt(),
            interpolated: false,
            stand_by: false,
            posture: None,
        }
    }

    /// Acceleration in g-units.
    pub fn accel_g(&self, counts_per_g: f64) -> GravityVec {
        GravityVec::new(self.acc_x, self.acc_y, self.acc_z) / counts_per_g
    }

    pub fn posture_state(&self) -> PostureState {
        self.posture.map(|p| p.state).unwrap_or(PostureState::Unknown)
    }
}

// ─── Movement and behavior ───────────────────────────────────────────────────

/// Movement class from GPS speed, ordered slowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsMovement {
    Stationary,
    Grazing,
    SlowWalk,
    NormalWalk,
    FastWalk,
    Running,
}

impl GpsMovement {
    pub fn is_moving(self) -> bool {
        self != GpsMovement::Stationary
    }
}

/// Movement class from dynamic acceleration, ordered calmest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelMovement {
    Stationary,
    Ruminating,
    Grazing,
    Walking,
    FastWalk,
    Running,
}

impl AccelMovement {
    /// Ruminating is jaw activity, not locomotion.
    pub fn is_moving(self) -> bool {
        self >= AccelMovement::Grazing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Lying,
    LyingActive,
    Standing,
    Grazing,
    Walking,
    Unknown,
}

/// The four buckets a day is accounted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleBehavior {
    Lying,
    Standing,
    Walking,
    Unknown,
}

impl Behavior {
    pub fn simplified(self) -> SimpleBehavior {
        match self {
            Behavior::Lying | Behavior::LyingActive => SimpleBehavior::Lying,
            Behavior::Standing => SimpleBehavior::Standing,
            Behavior::Grazing | Behavior::Walking => SimpleBehavior::Walking,
            Behavior::Unknown => SimpleBehavior::Unknown,
        }
    }

    pub fn is_stationary(self) -> bool {
        matches!(self, Behavior::Lying | Behavior::LyingActive | Behavior::Standing)
    }
}

/// How the final behavior of an interval was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Consistent,
    GpsOverride,
    AccelDisagree,
    LyingActive,
    ZoneOverride,
    Standby,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Night,
}

impl Period {
    pub fn from_second_of_day(second_of_day: u32) -> Self {
        if is_day_second(second_of_day) {
            Period::Day
        } else {
            Period::Night
        }
    }
}

/// Which stationary points feed a dwell clustering pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayFilter {
    All,
    Day,
    Night,
}

impl DayFilter {
    pub fn accepts(self, is_day: bool) -> bool {
        match self {
            DayFilter::All => true,
            DayFilter::Day => is_day,
            DayFilter::Night => !is_day,
        }
    }
}

// ─── Intervals and segments ──────────────────────────────────────────────────

/// Motion between two adjacent resampled samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start_sec: i64,
    pub end_sec: i64,
    pub dt: i64,
    pub distance_m: f64,
    pub speed_mps: f64,
    pub bearing_deg: f64,
    pub is_day: bool,
    /// Position the interval is attributed to (its end sample).
    pub lat: f64,
    pub lon: f64,
    pub gps_class: GpsMovement,
    pub accel_class: AccelMovement,
    pub final_behavior: Behavior,
    pub consistency: Consistency,
    pub confidence: f64,
    pub stand_by: bool,
}

/// Maximal run of intervals sharing one behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub behavior: Behavior,
    pub start_sec: i64,
    pub end_sec: i64,
    pub center_lat: f64,
    pub center_lon: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorTotals {
    pub lying_sec: i64,
    pub standing_sec: i64,
    pub walking_sec: i64,
    pub unknown_sec: i64,
}

impl BehaviorTotals {
    pub fn total(&self) -> i64 {
        self.lying_sec + self.standing_sec + self.walking_sec + self.unknown_sec
    }

    pub fn add(&mut self, behavior: SimpleBehavior, seconds: i64) {
        match behavior {
            SimpleBehavior::Lying => self.lying_sec += seconds,
            SimpleBehavior::Standing => self.standing_sec += seconds,
            SimpleBehavior::Walking => self.walking_sec += seconds,
            SimpleBehavior::Unknown => self.unknown_sec += seconds,
        }
    }
}
