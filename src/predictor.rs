//! Request-time feature assembly and compound prediction
//!
//! This is the inference half of the pipeline: it must reproduce the exact
//! transformation the model was trained with. The 15 continuous columns are
//! scaled in declared order and concatenated with the two encoded pit flags;
//! that order is part of the model contract and is never permuted.

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::assets::{AssetError, LabelEncoder, ModelAssets, Preprocessors};

/// Continuous model columns, in the order the scaler was fitted
pub const COL_TO_SCALE: [&str; 15] = [
    "lap_time_s",
    "s1_s",
    "s2_s",
    "s3_s",
    "tyre_life",
    "position",
    "prev_position",
    "avg_speed",
    "max_speed",
    "std_speed",
    "avg_throttle",
    "avg_brake",
    "session_time_sec",
    "stint",
    "overtakes",
];

/// Total model input width: scaled columns plus the two pit flags
pub const NUM_FEATURES: usize = COL_TO_SCALE.len() + 2;

/// Raw tokens accepted as "true" by the categorical fallback
const TRUTHY_TOKENS: [&str; 4] = ["yes", "y", "true", "1"];

/// Inference-side errors, always reported back to the caller
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Missing value for {0}")]
    MissingField(String),

    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: String, value: String },

    #[error("{0}")]
    Model(#[from] AssetError),
}

/// A classified lap
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub compound: &'static str,
    pub probability: f64,
}

/// Encode a raw pit-flag value against a fitted encoder, falling back
/// gracefully when the label was never seen at training time.
///
/// The four steps run in this exact order:
/// 1. an all-digit string is already encoded, returned as-is;
/// 2. an exact class match returns its fitted code;
/// 3. a truthy token maps to the `yes` class, then the `Y` class, then
///    the literal `1`;
/// 4. anything else is `0`.
pub fn encode_with_fallback(encoder: &LabelEncoder, raw: &str) -> i64 {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(code) = raw.parse::<i64>() {
            return code;
        }
    }

    if let Some(code) = encoder.transform(raw) {
        return code;
    }

    if TRUTHY_TOKENS.contains(&raw.to_lowercase().as_str()) {
        if let Some(code) = encoder.transform("yes") {
            debug!("pit flag {:?} mapped to class \"yes\"", raw);
            return code;
        }
        if let Some(code) = encoder.transform("Y") {
            debug!("pit flag {:?} mapped to class \"Y\"", raw);
            return code;
        }
        return 1;
    }

    debug!("pit flag {:?} not recognized, encoded as 0", raw);
    0
}

/// Parse the 15 continuous fields in declared order.
///
/// Every field must be present and numeric; nothing is defaulted.
pub fn numeric_fields(fields: &HashMap<String, String>) -> Result<Vec<f64>, PredictError> {
    let mut values = Vec::with_capacity(COL_TO_SCALE.len());
    for col in COL_TO_SCALE {
        let raw = fields
            .get(col)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PredictError::MissingField(col.to_string()))?;
        let value: f64 = raw.parse().map_err(|_| PredictError::InvalidNumber {
            field: col.to_string(),
            value: raw.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Assemble the length-17 model input: scaled continuous fields followed by
/// the encoded `pit_in` and `pit_out` flags
pub fn assemble_vector(
    preprocessors: &Preprocessors,
    fields: &HashMap<String, String>,
) -> Result<Vec<f64>, PredictError> {
    let values = numeric_fields(fields)?;

    let pit_in = encode_with_fallback(&preprocessors.pit_in, raw_flag(fields, "pit_in"));
    let pit_out = encode_with_fallback(&preprocessors.pit_out, raw_flag(fields, "pit_out"));

    let mut vector = preprocessors.scaler.transform(&values);
    vector.push(pit_in as f64);
    vector.push(pit_out as f64);
    Ok(vector)
}

/// Classify one raw field set.
///
/// The label is decided on the raw model output; only the reported
/// probability is rounded.
pub fn predict(
    assets: &ModelAssets,
    fields: &HashMap<String, String>,
) -> Result<Prediction, PredictError> {
    let vector = assemble_vector(&assets.preprocessors, fields)?;
    let probability = assets.infer(&vector)?;

    let compound = if probability >= 0.5 { "soft" } else { "hard" };
    Ok(Prediction {
        compound,
        probability: round_probability(probability),
    })
}

/// Probability as reported to callers, rounded to 4 decimal places
pub fn round_probability(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

// The pit flags, unlike the numeric fields, default to "no" when absent
fn raw_flag<'a>(fields: &'a HashMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(|v| v.trim()).unwrap_or("no")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StandardScaler;
    use crate::data::{LapFeatureExtractor, LapFeatures, LapTable};
    use polars::prelude::*;

    fn encoder(classes: &[&str]) -> LabelEncoder {
        LabelEncoder {
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn test_scaler() -> StandardScaler {
        StandardScaler {
            columns: COL_TO_SCALE.iter().map(|c| c.to_string()).collect(),
            mean: (0..15).map(|i| i as f64).collect(),
            scale: vec![2.0; 15],
        }
    }

    fn test_preprocessors() -> Preprocessors {
        Preprocessors {
            scaler: test_scaler(),
            pit_in: encoder(&["no", "yes"]),
            pit_out: encoder(&["no", "yes"]),
        }
    }

    fn complete_fields() -> HashMap<String, String> {
        let mut fields = HashMap::new();
        for (i, col) in COL_TO_SCALE.iter().enumerate() {
            fields.insert(col.to_string(), format!("{}", (i + 1) as f64));
        }
        fields.insert("pit_in".to_string(), "yes".to_string());
        fields.insert("pit_out".to_string(), "no".to_string());
        fields
    }

    #[test]
    fn test_encode_digit_string_bypasses_encoder() {
        let enc = encoder(&["no", "yes"]);
        assert_eq!(encode_with_fallback(&enc, "7"), 7);
        assert_eq!(encode_with_fallback(&enc, "0"), 0);
    }

    #[test]
    fn test_encode_exact_match() {
        let enc = encoder(&["no", "yes"]);
        assert_eq!(encode_with_fallback(&enc, "no"), 0);
        assert_eq!(encode_with_fallback(&enc, "yes"), 1);
    }

    #[test]
    fn test_encode_truthy_maps_to_known_class() {
        let enc = encoder(&["no", "yes"]);
        // "YES" is not a known class but is truthy, and "yes" is known
        assert_eq!(encode_with_fallback(&enc, "YES"), 1);
        assert_eq!(encode_with_fallback(&enc, "True"), 1);

        let enc = encoder(&["N", "Y"]);
        assert_eq!(encode_with_fallback(&enc, "TRUE"), 1);
    }

    #[test]
    fn test_encode_truthy_without_canonical_class() {
        let enc = encoder(&["off", "on"]);
        assert_eq!(encode_with_fallback(&enc, "YES"), 1);
    }

    #[test]
    fn test_encode_unrecognized_is_zero() {
        let enc = encoder(&["no", "yes"]);
        assert_eq!(encode_with_fallback(&enc, "maybe"), 0);
        assert_eq!(encode_with_fallback(&enc, ""), 0);
    }

    #[test]
    fn test_numeric_fields_in_declared_order() {
        let fields = complete_fields();
        let values = numeric_fields(&fields).unwrap();

        assert_eq!(values.len(), 15);
        for (i, v) in values.iter().enumerate() {
            assert!((v - (i + 1) as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut fields = complete_fields();
        fields.remove("lap_time_s");

        let err = numeric_fields(&fields).unwrap_err();
        assert!(matches!(err, PredictError::MissingField(ref f) if f == "lap_time_s"));
        assert_eq!(err.to_string(), "Missing value for lap_time_s");
    }

    #[test]
    fn test_blank_field_counts_as_missing() {
        let mut fields = complete_fields();
        fields.insert("std_speed".to_string(), "   ".to_string());

        let err = numeric_fields(&fields).unwrap_err();
        assert!(matches!(err, PredictError::MissingField(ref f) if f == "std_speed"));
    }

    #[test]
    fn test_unparseable_field_is_an_error() {
        let mut fields = complete_fields();
        fields.insert("overtakes".to_string(), "two".to_string());

        let err = numeric_fields(&fields).unwrap_err();
        assert!(
            matches!(err, PredictError::InvalidNumber { ref field, .. } if field == "overtakes")
        );
    }

    #[test]
    fn test_assembled_vector_layout() {
        let preprocessors = test_preprocessors();
        let fields = complete_fields();

        let vector = assemble_vector(&preprocessors, &fields).unwrap();
        assert_eq!(vector.len(), NUM_FEATURES);

        // First 15 entries are the scaler transform of the declared order
        let scaled = preprocessors
            .scaler
            .transform(&numeric_fields(&fields).unwrap());
        assert_eq!(&vector[..15], scaled.as_slice());
        // Trailing entries are the encoded pit flags
        assert_eq!(vector[15], 1.0);
        assert_eq!(vector[16], 0.0);
    }

    #[test]
    fn test_absent_pit_flags_default_to_no() {
        let preprocessors = test_preprocessors();
        let mut fields = complete_fields();
        fields.remove("pit_in");
        fields.remove("pit_out");

        let vector = assemble_vector(&preprocessors, &fields).unwrap();
        assert_eq!(vector[15], 0.0);
        assert_eq!(vector[16], 0.0);
    }

    #[test]
    fn test_round_probability() {
        assert_eq!(round_probability(0.123456), 0.1235);
        assert_eq!(round_probability(0.5), 0.5);
        assert_eq!(round_probability(1.0), 1.0);
    }

    #[test]
    fn test_extractor_row_scales_like_direct_submission() {
        // A derived row fed back through the assembler must scale exactly
        // like scaling the row's values directly
        let df = DataFrame::new(vec![
            Series::new("Driver", &["LEC", "LEC"]),
            Series::new("LapNumber", &[1i64, 2]),
            Series::new("LapTime", &[91.5f64, 90.25]),
            Series::new("Sector1Time", &[28.3f64, 28.1]),
            Series::new("Sector2Time", &[35.0f64, 34.8]),
            Series::new("Sector3Time", &[28.2f64, 27.9]),
            Series::new("Stint", &[1i64, 1]),
            Series::new("TyreLife", &[3i64, 4]),
            Series::new("Position", &[5i64, 3]),
            Series::new("Time", &[300.0f64, 391.5]),
        ])
        .unwrap();
        let table = LapTable::from_dataframe(df);
        let extractor = LapFeatureExtractor::new(&table);
        let row = extractor.extract("LEC", None).pop().unwrap();

        // Telemetry is absent for this session, so stand in fixed values
        // the way a form submission would
        let fields = row_to_fields(&row);
        let scaler = test_scaler();

        let submitted = scaler.transform(&numeric_fields(&fields).unwrap());
        let direct = scaler.transform(&[
            90.25, 28.1, 34.8, 27.9, 4.0, 3.0, 5.0, 210.0, 290.0, 40.0, 70.0, 0.2, 391.5, 1.0, 2.0,
        ]);

        assert_eq!(submitted.len(), direct.len());
        for (a, b) in submitted.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    fn row_to_fields(row: &LapFeatures) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        {
            let mut put = |name: &str, value: Option<f64>| {
                if let Some(v) = value {
                    fields.insert(name.to_string(), v.to_string());
                }
            };
            put("lap_time_s", row.lap_time_s);
            put("s1_s", row.s1_s);
            put("s2_s", row.s2_s);
            put("s3_s", row.s3_s);
            put("tyre_life", row.tyre_life);
            put("position", row.position.map(f64::from));
            put("prev_position", row.prev_position.map(f64::from));
            put("avg_speed", row.telemetry.avg_speed.or(Some(210.0)));
            put("max_speed", row.telemetry.max_speed.or(Some(290.0)));
            put("std_speed", row.telemetry.std_speed.or(Some(40.0)));
            put("avg_throttle", row.telemetry.avg_throttle.or(Some(70.0)));
            put("avg_brake", row.telemetry.avg_brake.or(Some(0.2)));
            put("session_time_sec", row.session_time_sec);
            put("stint", row.stint);
            put("overtakes", Some(f64::from(row.overtakes)));
        }
        fields.insert("pit_in".to_string(), row.pit_in.to_string());
        fields.insert("pit_out".to_string(), row.pit_out.to_string());
        fields
    }
}
