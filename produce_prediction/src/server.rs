use crate::{
    config::ServerConfig, model_service::ModelService, object_store::ObjectStore,
    prediction::PredictionService, routes::api_routes, telemetry::Metrics,
};
use axum::Router;
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::cors::{Any, CorsLayer};

pub struct SharedState<S: ObjectStore, M: ModelService> {
    pub prediction_service: Arc<PredictionService<S, M>>,
    pub metrics: Arc<Metrics>,
}

impl<S: ObjectStore, M: ModelService> SharedState<S, M> {
    pub fn new(prediction_service: Arc<PredictionService<S, M>>, metrics: Arc<Metrics>) -> Self {
        Self {
            prediction_service,
            metrics,
        }
    }
}

// `S` and `M` sit behind `Arc` and need not be `Clone`.
impl<S: ObjectStore, M: ModelService> Clone for SharedState<S, M> {
    fn clone(&self) -> Self {
        Self {
            prediction_service: self.prediction_service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router<S: ObjectStore, M: ModelService>(state: SharedState<S, M>) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(metrics_layer)
        .layer(cors_layer())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<S: ObjectStore, M: ModelService>(
        state: SharedState<S, M>,
        server_config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = server_config.get_address();
        let router = build_router(state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
