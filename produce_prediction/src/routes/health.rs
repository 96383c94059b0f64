use crate::{model_service::ModelService, object_store::ObjectStore, server::SharedState};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub bucket: String,
    pub labels: usize,
}

pub async fn healthcheck<S: ObjectStore, M: ModelService>(
    State(state): State<SharedState<S, M>>,
) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "Available".into(),
        bucket: state.prediction_service.bucket().to_string(),
        labels: state.prediction_service.label_count(),
    })
}
