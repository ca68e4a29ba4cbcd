//! Tyrecast - Tyre compound prediction for race strategy
//!
//! This library provides:
//! - Per-lap feature derivation from heterogeneous raw timing tables
//! - Telemetry aggregation with per-lap failure isolation
//! - Training-aligned feature assembly for the compound classifier
//! - Frozen scaler/encoder/model artifact loading
//!
//! # Example
//!
//! ```no_run
//! use tyrecast::data::{LapFeatureExtractor, LapTable};
//!
//! // Load a session's lap table and derive one row per lap
//! let table = LapTable::load("bahrain_2024_R.csv").unwrap();
//! let extractor = LapFeatureExtractor::new(&table);
//! let rows = extractor.extract("LEC", None);
//! println!("derived {} laps", rows.len());
//! ```

pub mod assets;
pub mod data;
pub mod models;
pub mod predictor;

// API-specific modules (only available with api feature)
#[cfg(feature = "api")]
pub mod error;

// Re-export commonly used types
pub use assets::{AssetConfig, LabelEncoder, ModelAssets, Preprocessors, StandardScaler};
pub use data::{LapFeatureExtractor, LapFeatures, LapTable, PositionIndex, TelemetryFetcher};
pub use predictor::{Prediction, COL_TO_SCALE, NUM_FEATURES};
