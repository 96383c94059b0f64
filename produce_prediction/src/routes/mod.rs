mod health;
mod metrics;
mod prediction;

use crate::{model_service::ModelService, object_store::ObjectStore, server::SharedState};
use axum::{routing::get, Router};

pub use health::healthcheck;
pub use metrics::metrics_handler;
pub use prediction::get_prediction;

pub const PREDICTION_ROUTE: &str = "/get-prediction";

pub fn api_routes<S: ObjectStore, M: ModelService>() -> Router<SharedState<S, M>> {
    Router::new()
        .route(PREDICTION_ROUTE, get(get_prediction::<S, M>))
        .route("/health", get(healthcheck::<S, M>))
        .route("/metrics", get(metrics_handler::<S, M>))
}
