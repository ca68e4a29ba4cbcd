//! Per-lap feature derivation
//!
//! Turns the heterogeneous raw lap table into one normalized feature row
//! per lap for a target driver. Column resolution happens once per session,
//! the position index is built in a pre-pass over all drivers, and every
//! per-lap telemetry failure is isolated to its own row.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::data::laps::{self, LapTable};
use crate::data::positions::PositionIndex;
use crate::data::telemetry::{TelemetryAggregates, TelemetryFetcher};

/// One derived feature row for a single lap of the target driver
#[derive(Debug, Clone, PartialEq)]
pub struct LapFeatures {
    pub lap_number: u32,
    pub lap_time_s: Option<f64>,
    pub s1_s: Option<f64>,
    pub s2_s: Option<f64>,
    pub s3_s: Option<f64>,
    pub stint: Option<f64>,
    pub compound: Option<String>,
    pub tyre_life: Option<f64>,
    pub position: Option<u32>,
    pub prev_position: Option<u32>,
    pub overtakes: u32,
    pub gap_to_leader_s: Option<f64>,
    pub session_time_sec: Option<f64>,
    pub pit_in: bool,
    pub pit_out: bool,
    pub pit_duration_s: Option<f64>,
    pub telemetry: TelemetryAggregates,
}

/// Columns resolved once per session
struct ResolvedColumns<'a> {
    driver: Option<&'a str>,
    lap_number: Option<&'a str>,
    lap_time: Option<&'a str>,
    s1: Option<&'a str>,
    s2: Option<&'a str>,
    s3: Option<&'a str>,
    compound: Option<&'a str>,
    stint: Option<&'a str>,
    tyre_life: Option<&'a str>,
    gap: Option<&'a str>,
    session_time: Option<&'a str>,
    pit_in: Option<&'a str>,
    pit_out: Option<&'a str>,
    pit_stop: Option<&'a str>,
}

impl ResolvedColumns<'_> {
    fn resolve(table: &LapTable) -> Self {
        Self {
            driver: table.resolve(laps::DRIVER_COLUMNS),
            lap_number: table.resolve(laps::LAP_NUMBER_COLUMNS),
            lap_time: table.resolve(laps::LAP_TIME_COLUMNS),
            s1: table.resolve(laps::SECTOR1_COLUMNS),
            s2: table.resolve(laps::SECTOR2_COLUMNS),
            s3: table.resolve(laps::SECTOR3_COLUMNS),
            compound: table.resolve(laps::COMPOUND_COLUMNS),
            stint: table.resolve(laps::STINT_COLUMNS),
            tyre_life: table.resolve(laps::TYRE_LIFE_COLUMNS),
            gap: table.resolve(laps::GAP_COLUMNS),
            session_time: table.resolve(laps::SESSION_TIME_COLUMNS),
            pit_in: table.resolve(laps::PIT_IN_COLUMNS),
            pit_out: table.resolve(laps::PIT_OUT_COLUMNS),
            pit_stop: table.resolve(laps::PIT_STOP_COLUMNS),
        }
    }
}

/// Feature extraction for one session's lap table
pub struct LapFeatureExtractor<'a> {
    table: &'a LapTable,
    columns: ResolvedColumns<'a>,
    positions: PositionIndex,
}

impl<'a> LapFeatureExtractor<'a> {
    /// Resolve columns and build the position index over all drivers
    pub fn new(table: &'a LapTable) -> Self {
        Self {
            table,
            columns: ResolvedColumns::resolve(table),
            positions: PositionIndex::build(table),
        }
    }

    /// The session-wide position index
    pub fn positions(&self) -> &PositionIndex {
        &self.positions
    }

    /// Lap numbers completed by a driver, ascending
    pub fn driver_laps(&self, driver: &str) -> Vec<u32> {
        self.driver_rows(driver)
            .into_iter()
            .map(|(lap, _)| lap)
            .collect()
    }

    /// Derive every feature row for a driver, sorted by lap number.
    ///
    /// A driver with no laps yields an empty vector, not an error.
    pub fn extract(
        &self,
        driver: &str,
        telemetry: Option<&dyn TelemetryFetcher>,
    ) -> Vec<LapFeatures> {
        self.driver_rows(driver)
            .into_iter()
            .map(|(lap, row)| self.derive_row(driver, lap, row, telemetry))
            .collect()
    }

    /// Derive the feature row for one lap, `None` if the driver never ran it
    pub fn derive_lap(
        &self,
        driver: &str,
        lap: u32,
        telemetry: Option<&dyn TelemetryFetcher>,
    ) -> Option<LapFeatures> {
        let (_, row) = self
            .driver_rows(driver)
            .into_iter()
            .find(|(l, _)| *l == lap)?;
        Some(self.derive_row(driver, lap, row, telemetry))
    }

    /// Row indices of a driver's laps, sorted by lap number
    fn driver_rows(&self, driver: &str) -> Vec<(u32, usize)> {
        let mut rows: Vec<(u32, usize)> = (0..self.table.height())
            .filter(|&row| {
                laps::as_code(&self.table.value(self.columns.driver, row)).as_deref()
                    == Some(driver)
            })
            .filter_map(|row| {
                laps::as_u32(&self.table.value(self.columns.lap_number, row)).map(|lap| (lap, row))
            })
            .collect();
        rows.sort_by_key(|(lap, _)| *lap);
        rows
    }

    fn derive_row(
        &self,
        driver: &str,
        lap: u32,
        row: usize,
        telemetry: Option<&dyn TelemetryFetcher>,
    ) -> LapFeatures {
        // Both current and previous position come from the global index
        let position = self.positions.position(driver, lap);
        let prev_position = if lap > 0 {
            self.positions.position(driver, lap - 1)
        } else {
            None
        };
        // Only gained places count, lost places are not penalized
        let overtakes = match (prev_position, position) {
            (Some(prev), Some(curr)) if curr < prev => prev - curr,
            _ => 0,
        };

        // Timestamp presence is the sole truth source for pit flags
        let pit_in_value = self.table.value(self.columns.pit_in, row);
        let pit_out_value = self.table.value(self.columns.pit_out, row);
        let pit_in = laps::is_present(&pit_in_value);
        let pit_out = laps::is_present(&pit_out_value);

        let pit_duration_s = laps::to_seconds(&self.table.value(self.columns.pit_stop, row))
            .or_else(|| {
                if pit_in && pit_out {
                    let entered = laps::to_seconds(&pit_in_value)?;
                    let left = laps::to_seconds(&pit_out_value)?;
                    Some(left - entered)
                } else {
                    None
                }
            });

        let telemetry_aggregates = match telemetry {
            Some(fetcher) => match fetcher.fetch_lap(driver, lap) {
                Ok(samples) => TelemetryAggregates::from_samples(&samples),
                Err(e) => {
                    debug!("telemetry unavailable for {} lap {}: {}", driver, lap, e);
                    TelemetryAggregates::missing()
                }
            },
            None => TelemetryAggregates::missing(),
        };

        LapFeatures {
            lap_number: lap,
            lap_time_s: laps::to_seconds(&self.table.value(self.columns.lap_time, row)),
            s1_s: laps::to_seconds(&self.table.value(self.columns.s1, row)),
            s2_s: laps::to_seconds(&self.table.value(self.columns.s2, row)),
            s3_s: laps::to_seconds(&self.table.value(self.columns.s3, row)),
            stint: laps::as_f64(&self.table.value(self.columns.stint, row)),
            compound: laps::as_code(&self.table.value(self.columns.compound, row)),
            tyre_life: laps::as_f64(&self.table.value(self.columns.tyre_life, row)),
            position,
            prev_position,
            overtakes,
            gap_to_leader_s: laps::to_seconds(&self.table.value(self.columns.gap, row)),
            session_time_sec: laps::to_seconds(&self.table.value(self.columns.session_time, row)),
            pit_in,
            pit_out,
            pit_duration_s,
            telemetry: telemetry_aggregates,
        }
    }
}

/// Write derived rows as a flat CSV dataset, one row per lap
pub fn write_dataset<P: AsRef<Path>>(rows: &[LapFeatures], path: P) -> Result<(), PolarsError> {
    let mut df = DataFrame::new(vec![
        Series::new(
            "lap_number",
            rows.iter().map(|r| r.lap_number).collect::<Vec<_>>(),
        ),
        Series::new(
            "lap_time_s",
            rows.iter().map(|r| r.lap_time_s).collect::<Vec<_>>(),
        ),
        Series::new("s1_s", rows.iter().map(|r| r.s1_s).collect::<Vec<_>>()),
        Series::new("s2_s", rows.iter().map(|r| r.s2_s).collect::<Vec<_>>()),
        Series::new("s3_s", rows.iter().map(|r| r.s3_s).collect::<Vec<_>>()),
        Series::new("stint", rows.iter().map(|r| r.stint).collect::<Vec<_>>()),
        Series::new(
            "compound",
            rows.iter().map(|r| r.compound.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "tyre_life",
            rows.iter().map(|r| r.tyre_life).collect::<Vec<_>>(),
        ),
        Series::new(
            "position",
            rows.iter().map(|r| r.position).collect::<Vec<_>>(),
        ),
        Series::new(
            "prev_position",
            rows.iter().map(|r| r.prev_position).collect::<Vec<_>>(),
        ),
        Series::new(
            "overtakes",
            rows.iter().map(|r| r.overtakes).collect::<Vec<_>>(),
        ),
        Series::new(
            "gap_to_leader_s",
            rows.iter().map(|r| r.gap_to_leader_s).collect::<Vec<_>>(),
        ),
        Series::new(
            "session_time_sec",
            rows.iter().map(|r| r.session_time_sec).collect::<Vec<_>>(),
        ),
        Series::new("pit_in", rows.iter().map(|r| r.pit_in).collect::<Vec<_>>()),
        Series::new(
            "pit_out",
            rows.iter().map(|r| r.pit_out).collect::<Vec<_>>(),
        ),
        Series::new(
            "pit_duration_s",
            rows.iter().map(|r| r.pit_duration_s).collect::<Vec<_>>(),
        ),
        Series::new(
            "avg_speed",
            rows.iter().map(|r| r.telemetry.avg_speed).collect::<Vec<_>>(),
        ),
        Series::new(
            "max_speed",
            rows.iter().map(|r| r.telemetry.max_speed).collect::<Vec<_>>(),
        ),
        Series::new(
            "std_speed",
            rows.iter().map(|r| r.telemetry.std_speed).collect::<Vec<_>>(),
        ),
        Series::new(
            "avg_throttle",
            rows.iter()
                .map(|r| r.telemetry.avg_throttle)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "avg_brake",
            rows.iter().map(|r| r.telemetry.avg_brake).collect::<Vec<_>>(),
        ),
        Series::new(
            "avg_tyre_temp",
            rows.iter()
                .map(|r| r.telemetry.avg_tyre_temp)
                .collect::<Vec<_>>(),
        ),
    ])?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}
