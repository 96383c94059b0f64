use crate::{
    classifier::ClassifierError,
    model_service::ModelService,
    object_store::{LocatorError, ObjectStore},
    prediction::PredictionError,
    preprocessing::PreprocessError,
    routes::PREDICTION_ROUTE,
    server::SharedState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PredictionResponse {
    pub prediction: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl PredictionError {
    pub fn code(&self) -> &'static str {
        match self {
            PredictionError::Locator(LocatorError::Unauthenticated(_)) => "unauthenticated",
            PredictionError::Locator(LocatorError::EmptyBucket(_)) => "empty_bucket",
            PredictionError::Locator(LocatorError::Storage(_))
            | PredictionError::Locator(LocatorError::Presign(_)) => "storage_error",
            PredictionError::Preprocess(PreprocessError::Fetch(_))
            | PredictionError::Preprocess(PreprocessError::TooLarge(_)) => "fetch_error",
            PredictionError::Preprocess(PreprocessError::Decode(_)) => "invalid_image",
            PredictionError::Classifier(ClassifierError::Model(_))
            | PredictionError::Classifier(ClassifierError::Integrity(_)) => "model_error",
            PredictionError::Task(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::Locator(LocatorError::Unauthenticated(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PredictionError::Locator(LocatorError::EmptyBucket(_)) => StatusCode::NOT_FOUND,
            PredictionError::Locator(_) => StatusCode::BAD_GATEWAY,
            PredictionError::Preprocess(PreprocessError::Decode(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PredictionError::Preprocess(_) => StatusCode::BAD_GATEWAY,
            PredictionError::Classifier(_) | PredictionError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[instrument(skip(state))]
pub async fn get_prediction<S: ObjectStore, M: ModelService>(
    State(state): State<SharedState<S, M>>,
) -> Result<Json<PredictionResponse>, PredictionError> {
    state.metrics.record_request(PREDICTION_ROUTE);
    let started = Instant::now();

    let result = state.prediction_service.predict_latest().await;
    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, PREDICTION_ROUTE);

    match result {
        Ok(prediction) => {
            state.metrics.record_outcome(&prediction.label, true);
            Ok(Json(PredictionResponse {
                prediction: prediction.label,
            }))
        }
        Err(err) => {
            tracing::error!(code = err.code(), "Prediction failed: {}", err);
            state.metrics.record_outcome(err.code(), false);
            Err(err)
        }
    }
}
