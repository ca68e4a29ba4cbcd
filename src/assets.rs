//! Frozen training artifacts: scaler, label encoders and the classifier
//!
//! All four artifacts are fitted offline and consumed here as read-only
//! configuration. They are loaded lazily exactly once per process through a
//! once-initialized holder; a failed load is reported to the caller and
//! retried on the next request instead of being cached.

use once_cell::sync::OnceCell;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::predictor::COL_TO_SCALE;

/// Artifact loading and inference errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load model {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    #[error("model inference failed: {0}")]
    Inference(#[from] ort::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Where the frozen artifacts live
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub dir: PathBuf,
}

impl AssetConfig {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Read the artifact directory from `ASSET_DIR`, defaulting to `assets`
    pub fn from_env() -> Self {
        let dir = std::env::var("ASSET_DIR").unwrap_or_else(|_| "assets".to_string());
        Self::new(dir)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.dir.join("scaler.json")
    }

    pub fn pit_in_path(&self) -> PathBuf {
        self.dir.join("pit_in_encoder.json")
    }

    pub fn pit_out_path(&self) -> PathBuf {
        self.dir.join("pit_out_encoder.json")
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join("model.onnx")
    }
}

/// Fitted standard scaler over the continuous model columns
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let scaler: Self = read_json(path.as_ref())?;
        scaler.validate()?;
        Ok(scaler)
    }

    /// The column list is part of the model contract: it must equal
    /// `COL_TO_SCALE` exactly, order included.
    fn validate(&self) -> Result<(), AssetError> {
        if self.columns != COL_TO_SCALE {
            return Err(AssetError::Invalid(format!(
                "scaler columns do not match the model feature order: {:?}",
                self.columns
            )));
        }
        if self.mean.len() != self.columns.len() || self.scale.len() != self.columns.len() {
            return Err(AssetError::Invalid(format!(
                "scaler has {} columns but {} means and {} scales",
                self.columns.len(),
                self.mean.len(),
                self.scale.len()
            )));
        }
        Ok(())
    }

    /// Per-field linear transform, output order matches input order
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        debug_assert_eq!(values.len(), self.mean.len());
        values
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (mean, scale))| (v - mean) / scale)
            .collect()
    }
}

/// Fitted label encoder: a label's code is its index in `classes`
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        read_json(path.as_ref())
    }

    /// Encode a label known to the encoder
    pub fn transform(&self, label: &str) -> Option<i64> {
        self.classes
            .iter()
            .position(|c| c == label)
            .map(|i| i as i64)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AssetError> {
    let text = fs::read_to_string(path).map_err(|source| AssetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| AssetError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// The fitted scaler and encoders, frozen at training time
pub struct Preprocessors {
    pub scaler: StandardScaler,
    pub pit_in: LabelEncoder,
    pub pit_out: LabelEncoder,
}

impl Preprocessors {
    pub fn load(config: &AssetConfig) -> Result<Self, AssetError> {
        Ok(Self {
            scaler: StandardScaler::load(config.scaler_path())?,
            pit_in: LabelEncoder::load(config.pit_in_path())?,
            pit_out: LabelEncoder::load(config.pit_out_path())?,
        })
    }
}

/// The complete frozen bundle shared by all inference requests
pub struct ModelAssets {
    pub preprocessors: Preprocessors,
    session: Mutex<Session>,
}

impl ModelAssets {
    /// Load every artifact from the configured directory
    pub fn load(config: &AssetConfig) -> Result<Self, AssetError> {
        let preprocessors = Preprocessors::load(config)?;

        let model_path = config.model_path();
        info!("Loading model: {:?}", model_path);
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|source| AssetError::Model {
                path: model_path,
                source,
            })?;

        Ok(Self {
            preprocessors,
            session: Mutex::new(session),
        })
    }

    /// Run the classifier on one assembled feature vector, returning the
    /// scalar soft-compound probability
    pub fn infer(&self, features: &[f64]) -> Result<f64, AssetError> {
        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let input_tensor = Tensor::from_array(([1usize, features.len()], input))?;

        let mut session = self.session.lock().unwrap();
        let outputs = session.run(ort::inputs!["input" => input_tensor])?;
        let (_, output_data) = outputs[0].try_extract_tensor::<f32>()?;

        output_data
            .first()
            .map(|&p| p as f64)
            .ok_or_else(|| AssetError::Invalid("model returned an empty output".to_string()))
    }
}

static ASSETS: OnceCell<ModelAssets> = OnceCell::new();

/// The process-wide asset bundle, loaded on first use.
///
/// Concurrent first calls are serialized by the cell: exactly one load runs
/// and every caller observes the fully loaded state.
pub fn shared(config: &AssetConfig) -> Result<&'static ModelAssets, AssetError> {
    ASSETS.get_or_try_init(|| ModelAssets::load(config))
}

/// Whether the bundle has been loaded successfully
pub fn is_loaded() -> bool {
    ASSETS.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_scaler() -> StandardScaler {
        StandardScaler {
            columns: COL_TO_SCALE.iter().map(|c| c.to_string()).collect(),
            mean: vec![1.0; COL_TO_SCALE.len()],
            scale: vec![2.0; COL_TO_SCALE.len()],
        }
    }

    #[test]
    fn test_scaler_transform() {
        let scaler = test_scaler();
        let values = vec![3.0; COL_TO_SCALE.len()];
        let scaled = scaler.transform(&values);

        assert_eq!(scaled.len(), COL_TO_SCALE.len());
        for v in scaled {
            assert!((v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scaler_validate_column_order() {
        let mut scaler = test_scaler();
        assert!(scaler.validate().is_ok());

        scaler.columns.swap(0, 1);
        assert!(scaler.validate().is_err());
    }

    #[test]
    fn test_scaler_validate_lengths() {
        let mut scaler = test_scaler();
        scaler.mean.pop();
        assert!(scaler.validate().is_err());
    }

    #[test]
    fn test_scaler_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");

        let columns: Vec<String> = COL_TO_SCALE.iter().map(|c| c.to_string()).collect();
        let body = serde_json::json!({
            "columns": columns,
            "mean": vec![0.0; COL_TO_SCALE.len()],
            "scale": vec![1.0; COL_TO_SCALE.len()],
        });
        std::fs::write(&path, body.to_string()).unwrap();

        let scaler = StandardScaler::load(&path).unwrap();
        assert_eq!(scaler.columns.len(), 15);
    }

    #[test]
    fn test_scaler_load_missing_file() {
        let err = StandardScaler::load("/nonexistent/scaler.json").unwrap_err();
        assert!(matches!(err, AssetError::Read { .. }));
    }

    #[test]
    fn test_label_encoder_transform() {
        let encoder = LabelEncoder {
            classes: vec!["no".to_string(), "yes".to_string()],
        };

        assert_eq!(encoder.transform("no"), Some(0));
        assert_eq!(encoder.transform("yes"), Some(1));
        assert_eq!(encoder.transform("maybe"), None);
        // Exact matching is case-sensitive
        assert_eq!(encoder.transform("YES"), None);
    }

    #[test]
    fn test_label_encoder_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pit_in_encoder.json");
        std::fs::write(&path, r#"{"classes": ["no", "yes"]}"#).unwrap();

        let encoder = LabelEncoder::load(&path).unwrap();
        assert_eq!(encoder.transform("yes"), Some(1));
    }

    #[test]
    fn test_asset_config_paths() {
        let config = AssetConfig::new("artifacts");
        assert!(config.scaler_path().ends_with("scaler.json"));
        assert!(config.pit_in_path().ends_with("pit_in_encoder.json"));
        assert!(config.pit_out_path().ends_with("pit_out_encoder.json"));
        assert!(config.model_path().ends_with("model.onnx"));
    }
}
