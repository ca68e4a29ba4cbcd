//! Raw lap table loading and column resolution
//!
//! Timing exports name their columns inconsistently between sources
//! (`LapTime` vs `lapTime` vs `Lap_Time`). Every logical field is resolved
//! against a priority-ordered list of candidate names; the first column
//! present in the table wins. A field with no matching column is missing
//! for the whole session, never an error.

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::path::Path;

/// Candidate columns for the driver code
pub const DRIVER_COLUMNS: &[&str] = &["Driver", "driver", "DriverNumber"];
/// Candidate columns for the lap number
pub const LAP_NUMBER_COLUMNS: &[&str] = &["LapNumber", "Lap", "lap_number"];
/// Candidate columns for the lap time
pub const LAP_TIME_COLUMNS: &[&str] = &["LapTime", "lapTime", "Lap_Time", "Time"];
/// Candidate columns for sector times
pub const SECTOR1_COLUMNS: &[&str] = &["Sector1Time", "S1", "Sector1"];
pub const SECTOR2_COLUMNS: &[&str] = &["Sector2Time", "S2", "Sector2"];
pub const SECTOR3_COLUMNS: &[&str] = &["Sector3Time", "S3", "Sector3"];
/// Candidate columns for the tyre compound
pub const COMPOUND_COLUMNS: &[&str] = &["Compound", "TyreCompound", "compound"];
/// Candidate columns for the stint number
pub const STINT_COLUMNS: &[&str] = &["Stint", "stint"];
/// Candidate columns for tyre life (laps on the current set)
pub const TYRE_LIFE_COLUMNS: &[&str] = &["TyreLife", "TyreLifeLaps", "TyreLifeLap"];
/// Candidate columns for the running race position
pub const POSITION_COLUMNS: &[&str] = &["Position", "Pos", "position"];
/// Candidate columns for the gap to the leader
pub const GAP_COLUMNS: &[&str] = &["GapToLeader", "Interval", "Gap"];
/// Candidate columns for the session-relative timestamp
pub const SESSION_TIME_COLUMNS: &[&str] = &["Time", "Timestamp", "SessionTime", "LapStartTime"];
/// Candidate columns for pit entry / exit timestamps
pub const PIT_IN_COLUMNS: &[&str] = &["PitInTime", "PitIn"];
pub const PIT_OUT_COLUMNS: &[&str] = &["PitOutTime", "PitOut"];
/// Candidate columns for an explicit pit-stop duration
pub const PIT_STOP_COLUMNS: &[&str] = &["PitStopTime", "PitStopDuration"];

/// Raw lap table for a whole session, all drivers included
pub struct LapTable {
    df: DataFrame,
}

impl LapTable {
    /// Load a lap table from CSV
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self, PolarsError> {
        let df = CsvReadOptions::default()
            .try_into_reader_with_file_path(Some(csv_path.as_ref().to_path_buf()))?
            .finish()?;
        Ok(Self { df })
    }

    /// Wrap an already loaded DataFrame
    pub fn from_dataframe(df: DataFrame) -> Self {
        Self { df }
    }

    /// Resolve a logical field to the first candidate column present in the table
    pub fn resolve<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .copied()
            .find(|name| self.df.column(name).is_ok())
    }

    /// Raw cell value for a resolved column, `Null` when the field is unresolved
    pub fn value(&self, column: Option<&str>, row: usize) -> AnyValue<'_> {
        column
            .and_then(|name| self.df.column(name).ok())
            .and_then(|series| series.get(row).ok())
            .unwrap_or(AnyValue::Null)
    }

    /// Number of rows in the session
    pub fn height(&self) -> usize {
        self.df.height()
    }
}

// Textual duration: "[D days ]HH:MM:SS[.fraction]" or "MM:SS[.fraction]"
static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)\s+days?\s+)?(?:(\d+):)?(\d{1,2}):(\d{1,2}(?:\.\d+)?)$")
        .expect("duration pattern is valid")
});

/// Normalize a raw duration value to seconds.
///
/// Accepts native durations, numeric values (already seconds) and textual
/// durations. Any null, unparseable or non-finite value yields `None`.
pub fn to_seconds(value: &AnyValue) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Float64(v) => finite(*v),
        AnyValue::Float32(v) => finite(*v as f64),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::Int32(v) => Some(*v as f64),
        AnyValue::Int16(v) => Some(*v as f64),
        AnyValue::Int8(v) => Some(*v as f64),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::UInt32(v) => Some(*v as f64),
        AnyValue::UInt16(v) => Some(*v as f64),
        AnyValue::UInt8(v) => Some(*v as f64),
        AnyValue::Duration(v, unit) => Some(duration_seconds(*v, *unit)),
        AnyValue::String(s) => parse_seconds_text(s),
        AnyValue::StringOwned(s) => parse_seconds_text(s),
        _ => None,
    }
}

fn duration_seconds(value: i64, unit: TimeUnit) -> f64 {
    match unit {
        TimeUnit::Nanoseconds => value as f64 / 1e9,
        TimeUnit::Microseconds => value as f64 / 1e6,
        TimeUnit::Milliseconds => value as f64 / 1e3,
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Parse a textual duration into seconds
fn parse_seconds_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(v) = text.parse::<f64>() {
        return finite(v);
    }
    let caps = DURATION_RE.captures(text)?;
    let days: f64 = caps.get(1).map_or(0.0, |m| m.as_str().parse().unwrap_or(0.0));
    let hours: f64 = caps.get(2).map_or(0.0, |m| m.as_str().parse().unwrap_or(0.0));
    let minutes: f64 = caps.get(3)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(4)?.as_str().parse().ok()?;
    Some(days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds)
}

/// Coerce a raw value to a float, without duration parsing
pub fn as_f64(value: &AnyValue) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Float64(v) => finite(*v),
        AnyValue::Float32(v) => finite(*v as f64),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::Int32(v) => Some(*v as f64),
        AnyValue::Int16(v) => Some(*v as f64),
        AnyValue::Int8(v) => Some(*v as f64),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::UInt32(v) => Some(*v as f64),
        AnyValue::UInt16(v) => Some(*v as f64),
        AnyValue::UInt8(v) => Some(*v as f64),
        AnyValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        AnyValue::String(s) => s.trim().parse().ok().and_then(finite),
        AnyValue::StringOwned(s) => s.trim().parse().ok().and_then(finite),
        _ => None,
    }
}

/// Coerce a raw value to an unsigned integer (lap numbers, positions)
pub fn as_u32(value: &AnyValue) -> Option<u32> {
    let v = as_f64(value)?;
    (v >= 0.0).then_some(v as u32)
}

/// Coerce a raw value to an identifier string.
///
/// Numeric driver identifiers (`DriverNumber`) are formatted without a
/// fractional part so `16.0` and `"16"` key the same.
pub fn as_code(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => non_empty(s),
        AnyValue::StringOwned(s) => non_empty(s),
        AnyValue::Float64(v) if v.fract() == 0.0 => Some(format!("{}", *v as i64)),
        AnyValue::Float32(v) if v.fract() == 0.0 => Some(format!("{}", *v as i64)),
        other => as_f64(other).map(|v| {
            if v.fract() == 0.0 {
                format!("{}", v as i64)
            } else {
                v.to_string()
            }
        }),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Whether a raw cell holds a usable value.
///
/// Pit detection keys off timestamp presence, so an empty string from a CSV
/// export counts as absent just like a real null.
pub fn is_present(value: &AnyValue) -> bool {
    match value {
        AnyValue::Null => false,
        AnyValue::String(s) => !s.trim().is_empty(),
        AnyValue::StringOwned(s) => !s.trim().is_empty(),
        _ => true,
    }
}
