//! Data loading and feature derivation modules

pub mod features;
pub mod laps;
pub mod positions;
pub mod telemetry;

// Re-export commonly used types
pub use features::{write_dataset, LapFeatureExtractor, LapFeatures};
pub use laps::{to_seconds, LapTable};
pub use positions::PositionIndex;
pub use telemetry::{TelemetryAggregates, TelemetryError, TelemetryFetcher, TelemetryStore};
