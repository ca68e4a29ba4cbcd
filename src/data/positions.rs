//! Session position index
//!
//! Provides O(1) lookup of the running race position for any driver on any
//! lap. Built in a single pre-pass over the complete multi-driver lap table
//! before per-lap derivation starts; `prev_position` and overtake counts are
//! computed against this index, not against the target driver's rows alone.

use std::collections::HashMap;

use crate::data::laps::{self, LapTable};

/// Race position indexed by `(driver_code, lap_number)`.
///
/// Laps whose raw position is null are simply absent from the index.
pub struct PositionIndex {
    positions: HashMap<(String, u32), u32>,
}

impl PositionIndex {
    /// Build the index from every row of the session table
    pub fn build(table: &LapTable) -> Self {
        let driver_col = table.resolve(laps::DRIVER_COLUMNS);
        let lap_col = table.resolve(laps::LAP_NUMBER_COLUMNS);
        let position_col = table.resolve(laps::POSITION_COLUMNS);

        let mut positions = HashMap::new();
        for row in 0..table.height() {
            let driver = laps::as_code(&table.value(driver_col, row));
            let lap = laps::as_u32(&table.value(lap_col, row));
            if let (Some(driver), Some(lap)) = (driver, lap) {
                if let Some(position) = laps::as_u32(&table.value(position_col, row)) {
                    positions.insert((driver, lap), position);
                }
            }
        }

        Self { positions }
    }

    /// Race position of a driver on a given lap, if known
    pub fn position(&self, driver: &str, lap: u32) -> Option<u32> {
        self.positions.get(&(driver.to_string(), lap)).copied()
    }

    /// Number of indexed `(driver, lap)` pairs
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
