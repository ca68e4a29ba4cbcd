use serde::{Deserialize, Serialize};

/// Compound prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub compound: String,
    pub probability: f64,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
