use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

use crate::assets::AssetError;
use crate::models::ErrorResponse;
use crate::predictor::PredictError;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Invalid request data
    ValidationError(String),
    /// Trained artifacts could not be loaded
    AssetError(String),
    /// Model or prediction error
    PredictionError(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::AssetError(msg) => write!(f, "Asset error: {}", msg),
            AppError::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<PredictError> for AppError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::MissingField(_) | PredictError::InvalidNumber { .. } => {
                AppError::ValidationError(err.to_string())
            }
            PredictError::Model(inner) => AppError::PredictionError(inner.to_string()),
        }
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        AppError::AssetError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AssetError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PredictionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_code, message) = match self {
            AppError::ValidationError(msg) => ("validation_error", msg.clone()),
            AppError::AssetError(msg) => ("asset_error", msg.clone()),
            AppError::PredictionError(msg) => ("prediction_error", msg.clone()),
            AppError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_code.to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert!(err.to_string().contains("Validation error"));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::ValidationError("".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::AssetError("".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::PredictionError("".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::InternalError("".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_missing_field_maps_to_validation() {
        let err = AppError::from(PredictError::MissingField("lap_time_s".to_string()));
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(err.to_string().contains("lap_time_s"));
    }

    #[test]
    fn test_asset_failure_maps_to_asset_error() {
        let err = AppError::from(AssetError::Invalid("bad scaler".to_string()));
        assert!(matches!(err, AppError::AssetError(_)));
    }
}
