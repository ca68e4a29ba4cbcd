//! Per-lap telemetry channels and aggregation
//!
//! Telemetry is optional: a lap with no usable samples degrades to missing
//! aggregates and never aborts extraction. Channel names are tolerant of
//! case variants, and tyre-temperature channels are matched by substring
//! since sensors report per-corner columns (`TyreTempFL`, `TireTempRear`).

use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::laps;

/// Candidate columns for the speed channel
pub const SPEED_CHANNELS: &[&str] = &["Speed", "speed"];
/// Candidate columns for the throttle channel
pub const THROTTLE_CHANNELS: &[&str] = &["Throttle", "throttle"];
/// Candidate columns for the brake channel
pub const BRAKE_CHANNELS: &[&str] = &["Brake", "brake"];

/// Telemetry fetch errors, always isolated to a single lap
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("no telemetry recorded for {driver} lap {lap}")]
    NotFound { driver: String, lap: u32 },

    #[error("failed to read telemetry: {0}")]
    Read(#[from] PolarsError),
}

/// Per-lap telemetry source keyed by `(driver_code, lap_number)`
pub trait TelemetryFetcher {
    fn fetch_lap(&self, driver: &str, lap: u32) -> Result<DataFrame, TelemetryError>;
}

/// Directory-backed telemetry store, one CSV per `(driver, lap)`
pub struct TelemetryStore {
    dir: PathBuf,
}

impl TelemetryStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn lap_path(&self, driver: &str, lap: u32) -> PathBuf {
        self.dir.join(format!("{}_lap_{}.csv", driver, lap))
    }
}

impl TelemetryFetcher for TelemetryStore {
    fn fetch_lap(&self, driver: &str, lap: u32) -> Result<DataFrame, TelemetryError> {
        let path = self.lap_path(driver, lap);
        if !path.exists() {
            return Err(TelemetryError::NotFound {
                driver: driver.to_string(),
                lap,
            });
        }
        let df = CsvReadOptions::default()
            .try_into_reader_with_file_path(Some(path))?
            .finish()?;
        Ok(df)
    }
}

/// Aggregates over one lap's telemetry samples, all missing when the
/// fetch failed or the channel was absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryAggregates {
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub std_speed: Option<f64>,
    pub avg_throttle: Option<f64>,
    pub avg_brake: Option<f64>,
    pub avg_tyre_temp: Option<f64>,
}

impl TelemetryAggregates {
    /// The all-missing bundle used when no telemetry is available
    pub fn missing() -> Self {
        Self::default()
    }

    /// Aggregate one lap's samples channel by channel
    pub fn from_samples(samples: &DataFrame) -> Self {
        let mut aggregates = Self::default();

        if let Some(speed) = channel_values(samples, SPEED_CHANNELS) {
            aggregates.avg_speed = mean(&speed);
            aggregates.max_speed = speed.iter().copied().reduce(f64::max);
            aggregates.std_speed = sample_std(&speed);
        }
        if let Some(throttle) = channel_values(samples, THROTTLE_CHANNELS) {
            aggregates.avg_throttle = mean(&throttle);
        }
        if let Some(brake) = channel_values(samples, BRAKE_CHANNELS) {
            aggregates.avg_brake = mean(&brake);
        }

        // Mean of per-channel means across every tyre temperature sensor
        let tyre_means: Vec<f64> = samples
            .get_column_names()
            .iter()
            .copied()
            .filter(|name| name.contains("Tyre") || name.contains("Tire"))
            .filter_map(|name| channel_values(samples, &[name]).as_deref().and_then(mean))
            .collect();
        if !tyre_means.is_empty() {
            aggregates.avg_tyre_temp = mean(&tyre_means);
        }

        aggregates
    }
}

/// Numeric values of the first present channel, nulls and non-numerics
/// skipped; `None` when no candidate column exists
fn channel_values(samples: &DataFrame, candidates: &[&str]) -> Option<Vec<f64>> {
    let series = candidates
        .iter()
        .find_map(|name| samples.column(name).ok())?;
    let values = (0..series.len())
        .filter_map(|i| series.get(i).ok())
        .filter_map(|v| laps::as_f64(&v))
        .collect();
    Some(values)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n-1 denominator), missing below two samples
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
