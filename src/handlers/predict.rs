use actix_web::{web, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;

use crate::AppState;
use tyrecast::error::AppError;
use tyrecast::models::PredictResponse;
use tyrecast::{assets, predictor};

/// Predict the tyre compound for one submitted lap.
///
/// The form carries the 15 continuous fields as strings plus the raw
/// `pit_in`/`pit_out` values. Every failure along the way renders as a
/// single error response; a request never crashes the server.
pub async fn predict_compound(
    state: web::Data<Arc<AppState>>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, AppError> {
    let assets = assets::shared(&state.asset_config)?;
    let prediction = predictor::predict(assets, &form)?;

    Ok(HttpResponse::Ok().json(PredictResponse {
        compound: prediction.compound.to_string(),
        probability: prediction.probability,
    }))
}
